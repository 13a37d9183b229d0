//! Optional YAML settings file for `spacesink`.
//!
//! ```yaml
//! database_url: sqlite:./spaces.db
//! ipfs_gateway: https://ipfs.io/ipfs/
//! stream:
//!   endpoint: https://mainnet.substreams.example.io:443
//!   api_token: ...
//!   package: ./spaces-v1.0.0.spkg
//!   module: map_sink_output
//! log:
//!   level: info
//!   json: true
//! sink:
//!   network: GEO
//!   start_block: 36472424
//!   content_concurrency: 16
//! ```
//!
//! Command-line flags and `SPACESINK_*` variables override file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spacesink_core::config::SinkConfig;

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub database_url: Option<String>,
    pub ipfs_gateway: Option<String>,
    pub stream: StreamSettings,
    pub log: LogConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    /// Substreams package for gRPC endpoints.
    pub package: Option<PathBuf>,
    pub module: Option<String>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let settings = FileSettings::parse(
            r#"
database_url: sqlite:./spaces.db
stream:
  endpoint: wss://stream.example/sink
  package: ./spaces.spkg
log:
  level: debug
sink:
  network: TESTNET
  start_block: 100
  retry:
    max_retries: 3
"#,
        )
        .unwrap();

        assert_eq!(settings.database_url.as_deref(), Some("sqlite:./spaces.db"));
        assert_eq!(settings.stream.endpoint.as_deref(), Some("wss://stream.example/sink"));
        assert_eq!(settings.stream.api_token, None);
        assert_eq!(settings.stream.package, Some(PathBuf::from("./spaces.spkg")));
        assert_eq!(settings.stream.module, None);
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.sink.network, "TESTNET");
        assert_eq!(settings.sink.start_block, Some(100));
        assert_eq!(settings.sink.retry.max_retries, 3);
        // untouched fields keep their defaults
        assert_eq!(settings.sink.content_concurrency, 8);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(FileSettings::parse("\n").unwrap(), FileSettings::default());
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(FileSettings::parse("sink: [1, 2]").is_err());
    }
}
