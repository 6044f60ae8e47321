use std::collections::BTreeMap;
use std::path::Path;

/// One `[name]` table from the services file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSection {
    pub name: String,
    pub options: BTreeMap<String, String>,
}

/// Hidden services to bring up at startup
///
/// ```toml
/// [web]
/// keyfile = "web.key"
/// tag = "blog"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicesConfig {
    pub services: Vec<ServiceSection>,
}

impl ServicesConfig {
    /// Parse a services file; a file with no services is an error
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let tables: BTreeMap<String, BTreeMap<String, String>> =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if tables.is_empty() {
            return Err(ConfigError::NoServices);
        }
        Ok(Self {
            services: tables
                .into_iter()
                .map(|(name, options)| ServiceSection { name, options })
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }
}

/// Services file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read services file: {0}")]
    Read(String),

    #[error("Failed to parse services file: {0}")]
    Parse(String),

    #[error("Services file defines no services")]
    NoServices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let config = ServicesConfig::parse(
            "[web]\nkeyfile = \"web.key\"\ntag = \"blog\"\n\n[chat]\ntag = \"irc\"\n",
        )
        .unwrap();

        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].name, "chat");
        assert_eq!(config.services[1].name, "web");
        assert_eq!(
            config.services[1].options.get("keyfile").map(String::as_str),
            Some("web.key")
        );
    }

    #[test]
    fn test_empty_file_is_an_error() {
        assert!(matches!(
            ServicesConfig::parse(""),
            Err(ConfigError::NoServices)
        ));
    }

    #[test]
    fn test_non_string_option_is_rejected() {
        assert!(matches!(
            ServicesConfig::parse("[web]\nport = 80\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ServicesConfig::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Read(_))
        ));
    }
}
