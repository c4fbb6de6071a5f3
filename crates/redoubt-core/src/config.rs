use serde::{Deserialize, Serialize};

/// Environment variable consulted for the escrow server URL; it takes
/// precedence over the config file.
pub const SERVER_URL_ENV: &str = "REDOUBT_SERVER";

/// Top-level configuration (loaded from redoubt.toml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedoubtConfig {
    pub vault: VaultConfig,
    pub kdf: KdfTuning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Cipher for newly created vaults: aes256-cbc (default), chacha20,
    /// aes256-gcm or chacha20-poly1305.  Existing vaults carry their
    /// cipher in the metadata record.
    pub cipher: Option<String>,
    /// Escrow server base URL, e.g. "https://api.example.org".
    pub server_url: Option<String>,
}

/// scrypt cost parameters used when initializing a vault.  Stored in the
/// metadata record afterwards, so changing these never affects vaults
/// that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfTuning {
    /// log2 of the scrypt CPU/memory cost (N = 2^log_n).
    pub log_n: u8,
    /// Block size parameter.
    pub r: u32,
    /// Parallelization parameter.
    pub p: u32,
}

impl Default for KdfTuning {
    fn default() -> Self {
        Self { log_n: 15, r: 8, p: 1 }
    }
}

impl KdfTuning {
    /// Deliberately weak parameters for tests, where derivation time
    /// matters more than brute-force resistance.
    pub fn fast() -> Self {
        Self { log_n: 10, r: 8, p: 1 }
    }
}

impl RedoubtConfig {
    /// Effective server URL: the environment variable wins over the
    /// config file so a URL can be injected per-invocation.
    pub fn server_url(&self) -> Option<String> {
        std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.vault.server_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[vault]
cipher = "chacha20-poly1305"
server_url = "https://escrow.example.org"

[kdf]
log_n = 16
r = 8
p = 2
"#;
        let config: RedoubtConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.vault.cipher.as_deref(), Some("chacha20-poly1305"));
        assert_eq!(
            config.vault.server_url.as_deref(),
            Some("https://escrow.example.org")
        );
        assert_eq!(config.kdf.log_n, 16);
        assert_eq!(config.kdf.p, 2);
    }

    #[test]
    fn test_parse_defaults() {
        let config: RedoubtConfig = toml::from_str("").unwrap();

        assert_eq!(config.vault.cipher, None);
        assert_eq!(config.vault.server_url, None);
        assert_eq!(config.kdf, KdfTuning::default());
        assert_eq!(config.kdf.log_n, 15);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
log_n = 14
"#;
        let config: RedoubtConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.log_n, 14);
        // Defaults
        assert_eq!(config.kdf.r, 8);
        assert_eq!(config.vault.cipher, None);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = RedoubtConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RedoubtConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.kdf, config.kdf);
        assert_eq!(parsed.vault.cipher, config.vault.cipher);
    }
}
