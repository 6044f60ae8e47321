use super::{Encode, EncodeError};

/// Growable bencode output buffer with a hard size limit
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    limit: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Create a writer that refuses to grow past `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.buf.len() + data.len() > self.limit {
            return Err(EncodeError::Overflow { limit: self.limit });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.put(data.len().to_string().as_bytes())?;
        self.put(b":")?;
        self.put(data)
    }

    pub fn write_int(&mut self, value: u64) -> Result<(), EncodeError> {
        self.put(b"i")?;
        self.put(value.to_string().as_bytes())?;
        self.put(b"e")
    }

    pub fn start_dict(&mut self) -> Result<(), EncodeError> {
        self.put(b"d")
    }

    pub fn start_list(&mut self) -> Result<(), EncodeError> {
        self.put(b"l")
    }

    /// Close the innermost dict or list
    pub fn end(&mut self) -> Result<(), EncodeError> {
        self.put(b"e")
    }

    /// Write `key` followed by a byte string value
    pub fn write_key_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), EncodeError> {
        self.write_bytes(key.as_bytes())?;
        self.write_bytes(value)
    }

    /// Write `key` followed by an integer value
    pub fn write_key_int(&mut self, key: &str, value: u64) -> Result<(), EncodeError> {
        self.write_bytes(key.as_bytes())?;
        self.write_int(value)
    }

    /// Write `key` followed by an encodable value
    pub fn write_key<T: Encode + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), EncodeError> {
        self.write_bytes(key.as_bytes())?;
        value.encode(self)
    }

    /// Write `key` followed by a list of encodable values
    pub fn write_key_list<'a, T, I>(&mut self, key: &str, items: I) -> Result<(), EncodeError>
    where
        T: Encode + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        self.write_bytes(key.as_bytes())?;
        self.start_list()?;
        for item in items {
            item.encode(self)?;
        }
        self.end()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_canonical_values() {
        let mut w = Writer::new();
        w.start_dict().unwrap();
        w.write_key_bytes("a", b"spam").unwrap();
        w.write_key_int("b", 7).unwrap();
        w.end().unwrap();
        assert_eq!(w.as_bytes(), b"d1:a4:spam1:bi7ee");
    }

    #[test]
    fn limit_is_enforced() {
        let mut w = Writer::with_limit(4);
        assert!(w.write_bytes(b"ab").is_ok());
        assert!(matches!(
            w.write_bytes(b"c"),
            Err(EncodeError::Overflow { limit: 4 })
        ));
        assert_eq!(w.len(), 4);
    }
}
