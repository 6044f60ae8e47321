/// Canonical bencode wire codec
///
/// Byte strings are `<len>:<bytes>`, integers `i<N>e`, lists `l...e` and
/// dictionaries `d...e` with strictly increasing byte-string keys. Decoding is
/// a single pass over an immutable buffer; structures decode themselves one
/// key at a time through [`DecodeDict`].

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Errors produced while decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unexpected end of buffer")]
    UnexpectedEof,

    #[error("Malformed length prefix")]
    InvalidLength,

    #[error("Declared length {declared} exceeds remaining {remaining} bytes")]
    LengthExceedsBuffer { declared: u64, remaining: usize },

    #[error("Malformed integer")]
    InvalidInteger,

    #[error("Expected '{expected}', found '{found}'")]
    UnexpectedToken { expected: char, found: char },

    #[error("Dictionary keys out of order")]
    KeysOutOfOrder,

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Empty dictionary")]
    EmptyDict,

    #[error("Invalid field size: expected {expected}, got {actual}")]
    InvalidFieldSize { expected: usize, actual: usize },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value: {0}")]
    Invalid(String),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Errors produced while encoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Encoded value exceeds {limit} bytes")]
    Overflow { limit: usize },
}

/// A value with a canonical bencoding
pub trait Encode {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>;

    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Encode into a buffer that may not grow past `limit` bytes
    fn to_bytes_bounded(&self, limit: usize) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::with_limit(limit);
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }
}

/// A value that can be read back from its bencoding
pub trait Decode: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode a whole buffer, rejecting trailing bytes
    fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let value = Self::decode(&mut r)?;
        r.finish()?;
        Ok(value)
    }
}

/// A dictionary structure that consumes its own keys
pub trait DecodeDict: Default {
    /// Consume the value for `key`; `Ok(false)` means the key is not ours
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError>;

    /// Validate the assembled structure once the dictionary is exhausted
    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Decode a [`DecodeDict`] structure from the cursor
pub fn decode_dict<T: DecodeDict>(r: &mut Reader<'_>) -> Result<T, DecodeError> {
    let mut value = T::default();
    r.read_dict(|key, r| value.decode_key(key, r))?;
    value.finish_decode()?;
    Ok(value)
}

/// Decode a list of values
pub fn decode_list<T: Decode>(r: &mut Reader<'_>) -> Result<Vec<T>, DecodeError> {
    let mut items = Vec::new();
    r.read_list(|r| {
        items.push(T::decode(r)?);
        Ok(())
    })?;
    Ok(items)
}

/// Read a version field and reject anything other than `expected`
pub fn decode_version(r: &mut Reader<'_>, expected: u64) -> Result<u64, DecodeError> {
    let version = r.read_int()?;
    if version != expected {
        return Err(DecodeError::Invalid(format!(
            "unsupported version {} (expected {})",
            version, expected
        )));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        name: Vec<u8>,
        count: u64,
    }

    impl Encode for Sample {
        fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
            w.start_dict()?;
            w.write_key_int("c", self.count)?;
            w.write_key_bytes("n", &self.name)?;
            w.end()
        }
    }

    impl DecodeDict for Sample {
        fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
            match key {
                b"c" => self.count = r.read_int()?,
                b"n" => self.name = r.read_bytes()?.to_vec(),
                _ => return Ok(false),
            }
            Ok(true)
        }
    }

    impl Decode for Sample {
        fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
            decode_dict(r)
        }
    }

    #[test]
    fn dict_structures_roundtrip() {
        let sample = Sample {
            name: b"intro".to_vec(),
            count: 3,
        };
        let bytes = sample.to_bytes().unwrap();
        assert_eq!(bytes, b"d1:ci3e1:n5:introe");
        assert_eq!(Sample::from_bytes(&bytes).unwrap(), sample);
    }

    #[test]
    fn bounded_encoding_fails_cleanly() {
        let sample = Sample {
            name: vec![0u8; 64],
            count: 1,
        };
        assert!(matches!(
            sample.to_bytes_bounded(16),
            Err(EncodeError::Overflow { limit: 16 })
        ));
    }

    #[test]
    fn one_bad_frame_does_not_poison_the_next() {
        assert!(Sample::from_bytes(b"d1:ci3e1:n9:introe").is_err());
        assert!(Sample::from_bytes(b"d1:ci3e1:n5:introe").is_ok());
    }

    #[test]
    fn decodes_lists_of_structures() {
        let mut r = Reader::new(b"ld1:ci1e1:n1:aed1:ci2e1:n1:bee");
        let items: Vec<Sample> = decode_list(&mut r).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].count, 2);
    }
}
