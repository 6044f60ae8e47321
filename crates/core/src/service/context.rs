use super::{Endpoint, EndpointError, LookupResult, ServiceSection, VerifiedReply};
use crate::crypto::Crypto;
use crate::path::PathId;
use hiddenmesh_common::TimeMs;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// All hidden services hosted on this router, by name
pub struct Context {
    crypto: Arc<dyn Crypto>,
    endpoints: HashMap<String, Endpoint>,
    lookup_timeout: u64,
}

impl Context {
    pub fn new(crypto: Arc<dyn Crypto>, lookup_timeout: u64) -> Self {
        Self {
            crypto,
            endpoints: HashMap::new(),
            lookup_timeout,
        }
    }

    /// Create, configure and start an endpoint from its services-file section
    ///
    /// Nothing is registered if the name is taken, an option is rejected or
    /// the keys cannot be loaded.
    pub fn add_endpoint(&mut self, section: &ServiceSection) -> Result<(), EndpointError> {
        if self.endpoints.contains_key(&section.name) {
            return Err(EndpointError::DuplicateName(section.name.clone()));
        }

        let mut endpoint = Endpoint::new(section.name.clone(), self.crypto.clone());
        endpoint.set_lookup_timeout(self.lookup_timeout);
        for (key, value) in &section.options {
            endpoint.set_option(key, value)?;
        }
        endpoint.start()?;

        info!("Added hidden service {}", section.name);
        self.endpoints.insert(section.name.clone(), endpoint);
        Ok(())
    }

    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Names of all endpoints, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn endpoint_mut(&mut self, name: &str) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(name)
    }

    /// Endpoint that owns `path`, if any
    pub fn endpoint_for_path(&mut self, path: &PathId) -> Option<&mut Endpoint> {
        self.endpoints.values_mut().find(|ep| ep.owns_path(path))
    }

    /// Route a verified reply that arrived on `path` to its endpoint
    pub fn handle_got_intro(
        &mut self,
        path: &PathId,
        reply: VerifiedReply,
        now: TimeMs,
    ) -> Option<LookupResult> {
        match self.endpoint_for_path(path) {
            Some(endpoint) => endpoint.handle_got_intro(reply, now),
            None => {
                debug!("No endpoint owns path {}, dropping reply", path);
                None
            }
        }
    }

    /// Drop a torn-down path from whichever endpoint owned it
    pub fn remove_path(&mut self, path: &PathId) -> bool {
        self.endpoint_for_path(path)
            .map(|ep| ep.remove_path(path))
            .unwrap_or(false)
    }

    /// Tick every endpoint, collecting finished lookups by endpoint name
    pub fn tick(&mut self, now: TimeMs) -> Vec<(String, LookupResult)> {
        let mut finished = Vec::new();
        for (name, endpoint) in self.endpoints.iter_mut() {
            finished.extend(endpoint.tick(now).into_iter().map(|r| (name.clone(), r)));
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
