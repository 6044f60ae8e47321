/// Single-threaded logic loop
///
/// All DHT, lookup and session state is owned by one context `T` and only
/// mutated by jobs run here. Timers fire from [`Logic::take_ready`]; work
/// finished on the worker pool comes back through a [`LogicHandle`].
use hiddenmesh_common::{time_now_ms, TimeMs};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// A job run against the logic-thread context
pub type LogicJob<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> TimeMs;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimeMs {
        time_now_ms()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: TimeMs) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: TimeMs) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimeMs {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sends jobs back to the logic thread from anywhere
pub struct LogicHandle<T> {
    tx: UnboundedSender<LogicJob<T>>,
}

impl<T> Clone for LogicHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> LogicHandle<T> {
    /// Queue `job` for the next logic tick
    ///
    /// Returns false if the logic loop is gone.
    pub fn call(&self, job: impl FnOnce(&mut T) + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

/// Timers and marshalled jobs waiting to run on the logic thread
pub struct Logic<T> {
    /// Keyed by (deadline, id) so equal deadlines fire in scheduling order
    timers: BTreeMap<(TimeMs, u64), LogicJob<T>>,
    next_timer: u64,
    tx: UnboundedSender<LogicJob<T>>,
    rx: UnboundedReceiver<LogicJob<T>>,
}

impl<T> Default for Logic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Logic<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            timers: BTreeMap::new(),
            next_timer: 0,
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> LogicHandle<T> {
        LogicHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run `job` on the first tick at or after `now + delay_ms`
    ///
    /// Returns an id for [`Logic::cancel`].
    pub fn call_later(
        &mut self,
        now: TimeMs,
        delay_ms: u64,
        job: impl FnOnce(&mut T) + Send + 'static,
    ) -> u64 {
        let id = self.next_timer;
        self.next_timer += 1;
        self.timers
            .insert((now.saturating_add(delay_ms), id), Box::new(job));
        id
    }

    pub fn cancel(&mut self, id: u64) -> bool {
        let key = self.timers.keys().find(|(_, timer)| *timer == id).copied();
        match key {
            Some(key) => self.timers.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Remove every job that is due: expired timers first, then marshalled
    /// jobs in arrival order
    pub fn take_ready(&mut self, now: TimeMs) -> Vec<LogicJob<T>> {
        let mut ready = Vec::new();
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 > now {
                break;
            }
            ready.push(entry.remove());
        }

        loop {
            match self.rx.try_recv() {
                Ok(job) => ready.push(job),
                Err(TryRecvError::Empty) => break,
                // we hold a sender ourselves, so this cannot happen
                Err(TryRecvError::Disconnected) => break,
            }
        }
        if !ready.is_empty() {
            debug!("{} logic jobs ready", ready.len());
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_fire_in_order() {
        let mut logic: Logic<Vec<u32>> = Logic::new();
        logic.call_later(0, 200, |v| v.push(2));
        logic.call_later(0, 100, |v| v.push(1));
        logic.call_later(0, 200, |v| v.push(3));

        let mut out = Vec::new();
        for job in logic.take_ready(99) {
            job(&mut out);
        }
        assert!(out.is_empty());

        for job in logic.take_ready(200) {
            job(&mut out);
        }
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(logic.pending_timers(), 0);
    }

    #[test]
    fn test_cancel() {
        let mut logic: Logic<Vec<u32>> = Logic::new();
        let id = logic.call_later(0, 10, |v| v.push(1));
        assert!(logic.cancel(id));
        assert!(!logic.cancel(id));
        assert!(logic.take_ready(100).is_empty());
    }

    #[test]
    fn test_marshalled_jobs_from_other_threads() {
        let mut logic: Logic<Vec<u32>> = Logic::new();
        let handle = logic.handle();
        std::thread::spawn(move || {
            assert!(handle.call(|v| v.push(7)));
        })
        .join()
        .unwrap();

        let mut out = Vec::new();
        for job in logic.take_ready(0) {
            job(&mut out);
        }
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now_ms(), 15);
        clock.set(1);
        assert_eq!(clock.now_ms(), 1);
    }
}
