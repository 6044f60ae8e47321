use super::DecodeError;

/// Cursor over an immutable bencoded buffer
///
/// Every read either advances the cursor past a complete value or returns an
/// error; a failed read leaves the caller free to drop the whole frame.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek().ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, token: u8) -> Result<(), DecodeError> {
        let found = self.next_byte()?;
        if found != token {
            return Err(DecodeError::UnexpectedToken {
                expected: token as char,
                found: found as char,
            });
        }
        Ok(())
    }

    /// Read decimal digits up to `terminator`
    fn read_decimal(&mut self, terminator: u8) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        loop {
            let byte = self.next_byte()?;
            if byte == terminator {
                break;
            }
            if !byte.is_ascii_digit() {
                return Err(DecodeError::InvalidInteger);
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((byte - b'0') as u64))
                .ok_or(DecodeError::InvalidInteger)?;
        }
        let digits = self.pos - start - 1;
        if digits == 0 {
            return Err(DecodeError::InvalidInteger);
        }
        // canonical form has no leading zeros
        if digits > 1 && self.buf[start] == b'0' {
            return Err(DecodeError::InvalidInteger);
        }
        Ok(value)
    }

    /// Read a `<len>:<bytes>` string, borrowing from the buffer
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        match self.peek() {
            Some(b) if b.is_ascii_digit() => {}
            Some(_) => return Err(DecodeError::InvalidLength),
            None => return Err(DecodeError::UnexpectedEof),
        }
        let len = self
            .read_decimal(b':')
            .map_err(|_| DecodeError::InvalidLength)?;
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(DecodeError::LengthExceedsBuffer {
                declared: len,
                remaining,
            });
        }
        let buf: &'a [u8] = self.buf;
        let start = self.pos;
        self.pos += len as usize;
        Ok(&buf[start..self.pos])
    }

    /// Read a byte string that must be exactly `N` bytes long
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes()?;
        if bytes.len() != N {
            return Err(DecodeError::InvalidFieldSize {
                expected: N,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read an unsigned `i<N>e` integer
    pub fn read_int(&mut self) -> Result<u64, DecodeError> {
        self.expect(b'i')?;
        self.read_decimal(b'e')
    }

    /// Read a list, invoking `on_item` once per element
    ///
    /// `on_item` must consume exactly one value.
    pub fn read_list<F>(&mut self, mut on_item: F) -> Result<(), DecodeError>
    where
        F: FnMut(&mut Reader<'a>) -> Result<(), DecodeError>,
    {
        self.expect(b'l')?;
        loop {
            match self.peek() {
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => on_item(self)?,
                None => return Err(DecodeError::UnexpectedEof),
            }
        }
    }

    /// Read a dictionary, invoking `on_key` for every key in order
    ///
    /// `on_key` returns `Ok(true)` after consuming the value of a key it
    /// recognizes and `Ok(false)` for an unknown key, which aborts the read.
    /// Keys must be strictly increasing and at least one key must be present.
    pub fn read_dict<F>(&mut self, mut on_key: F) -> Result<(), DecodeError>
    where
        F: FnMut(&'a [u8], &mut Reader<'a>) -> Result<bool, DecodeError>,
    {
        self.expect(b'd')?;
        let mut last: Option<&'a [u8]> = None;
        loop {
            match self.peek() {
                Some(b'e') => {
                    self.pos += 1;
                    if last.is_none() {
                        return Err(DecodeError::EmptyDict);
                    }
                    return Ok(());
                }
                Some(_) => {
                    let key = self.read_bytes()?;
                    if let Some(prev) = last {
                        if key <= prev {
                            return Err(DecodeError::KeysOutOfOrder);
                        }
                    }
                    if !on_key(key, self)? {
                        return Err(DecodeError::UnknownKey(
                            String::from_utf8_lossy(key).into_owned(),
                        ));
                    }
                    last = Some(key);
                }
                None => return Err(DecodeError::UnexpectedEof),
            }
        }
    }

    /// Fail if anything is left after the last value
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(self.remaining()))
        }
    }
}
