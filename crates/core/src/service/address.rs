/// .mesh service address system
///
/// A service address is the 32-byte hash of the service's encoded public
/// ServiceInfo, printed as lowercase base32 with a `.mesh` suffix.
use crate::crypto::fixed_bytes;
use crate::identity::RouterId;
use hiddenmesh_common::service::ADDRESS_SUFFIX;
use std::fmt;

fixed_bytes!(
    /// A hidden service address (e.g., "mfrgg...xyz.mesh")
    ServiceAddress,
    32
);

impl ServiceAddress {
    /// Convert to .mesh hostname
    pub fn to_hostname(&self) -> String {
        format!("{}{}", self.to_base32(), ADDRESS_SUFFIX)
    }

    /// Convert to base32 string (without .mesh suffix)
    pub fn to_base32(&self) -> String {
        data_encoding::BASE32_NOPAD.encode(&self.0).to_lowercase()
    }

    /// Parse from hostname (with or without .mesh suffix)
    pub fn from_hostname(hostname: &str) -> Result<Self, ServiceAddressError> {
        let hostname = hostname.trim().to_lowercase();

        let base32_part = hostname
            .strip_suffix(ADDRESS_SUFFIX)
            .unwrap_or(hostname.as_str());

        let bytes = data_encoding::BASE32_NOPAD
            .decode(base32_part.to_uppercase().as_bytes())
            .map_err(|_| ServiceAddressError::InvalidEncoding)?;

        if bytes.len() != 32 {
            return Err(ServiceAddressError::InvalidLength(bytes.len()));
        }

        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }

    /// Check if a hostname is a .mesh address
    pub fn is_mesh_address(hostname: &str) -> bool {
        hostname.trim().to_lowercase().ends_with(ADDRESS_SUFFIX)
    }

    /// Addresses are already uniformly distributed, so they are used as DHT
    /// keys directly
    pub fn dht_key(&self) -> RouterId {
        RouterId::from_bytes(self.0)
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hostname())
    }
}

impl fmt::Debug for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceAddress({})", self.to_hostname())
    }
}

impl std::str::FromStr for ServiceAddress {
    type Err = ServiceAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hostname(s)
    }
}

/// Service address errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceAddressError {
    #[error("Invalid base32 encoding")]
    InvalidEncoding,

    #[error("Invalid address length: {0} (expected 32)")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_address_roundtrip() {
        let address = ServiceAddress::from_bytes([0x42; 32]);

        let hostname = address.to_hostname();
        assert!(hostname.ends_with(".mesh"));
        assert_eq!(hostname.len(), 52 + 5);

        let parsed = ServiceAddress::from_hostname(&hostname).unwrap();
        assert_eq!(address, parsed);
    }

    #[test]
    fn test_parse_with_and_without_suffix() {
        let address = ServiceAddress::from_bytes([7; 32]);

        let parsed1 = ServiceAddress::from_hostname(&address.to_base32()).unwrap();
        let parsed2: ServiceAddress = address.to_hostname().to_uppercase().parse().unwrap();

        assert_eq!(address, parsed1);
        assert_eq!(address, parsed2);
    }

    #[test]
    fn test_invalid_hostnames() {
        assert!(matches!(
            ServiceAddress::from_hostname("not base32!.mesh"),
            Err(ServiceAddressError::InvalidEncoding)
        ));
        assert!(matches!(
            ServiceAddress::from_hostname("mfrgg.mesh"),
            Err(ServiceAddressError::InvalidLength(3))
        ));
    }

    #[test]
    fn test_is_mesh_address() {
        assert!(ServiceAddress::is_mesh_address("test.mesh"));
        assert!(ServiceAddress::is_mesh_address("ABC123.MESH"));

        assert!(!ServiceAddress::is_mesh_address("example.com"));
        assert!(!ServiceAddress::is_mesh_address("test.onion"));
    }
}
