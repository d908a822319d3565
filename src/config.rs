//! Service configuration.
//!
//! Two sources, neither of which may fail the process:
//!
//! - `PORT` from the environment, `8080` when unset or empty;
//! - `service.yaml` in the working directory, from which only the top-level
//!   `version:` and `name:` lines are read. A missing or unreadable file just
//!   means the defaults apply.

use std::path::Path;

use tracing::debug;

/// Port used when `PORT` is unset or empty.
pub const DEFAULT_PORT: &str = "8080";

/// Metadata file looked up in the working directory.
pub const METADATA_FILE: &str = "service.yaml";

/// Resolved service configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: String,
    pub app_name: String,
    pub version: String,
}

/// Fields read from `service.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub version: Option<String>,
    pub name: Option<String>,
}

impl ServiceMetadata {
    /// Reads and parses `path`.
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::read_to_string(path).map(|text| Self::parse(&text))
    }

    /// Line-oriented scan: the last `version:` and `name:` lines win, quotes
    /// around the value are stripped, everything else is ignored.
    pub fn parse(text: &str) -> Self {
        let mut meta = Self::default();
        for line in text.lines().map(str::trim) {
            if let Some(v) = field(line, "version:") {
                meta.version = Some(v);
            } else if let Some(v) = field(line, "name:") {
                meta.name = Some(v);
            }
        }
        meta
    }
}

fn field(line: &str, key: &str) -> Option<String> {
    let value = line.strip_prefix(key)?.trim();
    let value = value.trim_matches(|c| c == '"' || c == '\'');
    (!value.is_empty()).then(|| value.to_owned())
}

impl Config {
    /// Loads configuration from the environment and `service.yaml`.
    ///
    /// The file's version overrides `default_version`; the file's name is
    /// only used when `app_name` is empty.
    pub fn load(app_name: &str, default_version: &str) -> Self {
        let metadata = match ServiceMetadata::read(METADATA_FILE) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(file = METADATA_FILE, error = %e, "service metadata unavailable, using defaults");
                ServiceMetadata::default()
            }
        };
        Self::resolve(app_name, default_version, std::env::var("PORT").ok(), metadata)
    }

    /// Merges explicit inputs with the same precedence rules as [`load`](Self::load).
    pub fn resolve(
        app_name: &str,
        default_version: &str,
        port: Option<String>,
        metadata: ServiceMetadata,
    ) -> Self {
        let version = metadata.version.unwrap_or_else(|| default_version.to_owned());
        let app_name = match metadata.name {
            Some(name) if app_name.is_empty() => name,
            _ => app_name.to_owned(),
        };
        let port = port
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PORT.to_owned());

        Self { port, app_name, version }
    }

    /// `0.0.0.0:<port>`
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_bare_values() {
        let meta = ServiceMetadata::parse(
            "# service descriptor\nname: \"billing\"\n  version: '1.4.2'\nowner: team-a\n",
        );
        assert_eq!(meta.name.as_deref(), Some("billing"));
        assert_eq!(meta.version.as_deref(), Some("1.4.2"));
    }

    #[test]
    fn empty_values_are_absent() {
        let meta = ServiceMetadata::parse("version:\nname: \"\"\n");
        assert_eq!(meta, ServiceMetadata::default());
    }

    #[test]
    fn file_version_wins_and_name_is_fallback_only() {
        let meta = ServiceMetadata {
            version: Some("2.0.0".into()),
            name: Some("from-file".into()),
        };

        let cfg = Config::resolve("explicit", "0.0.1", None, meta.clone());
        assert_eq!(cfg.version, "2.0.0");
        assert_eq!(cfg.app_name, "explicit");

        let cfg = Config::resolve("", "0.0.1", None, meta);
        assert_eq!(cfg.app_name, "from-file");
    }

    #[test]
    fn port_defaults_when_unset_or_empty() {
        let meta = ServiceMetadata::default;
        assert_eq!(Config::resolve("a", "1", None, meta()).port, "8080");
        assert_eq!(Config::resolve("a", "1", Some(String::new()), meta()).port, "8080");

        let cfg = Config::resolve("a", "1", Some("9090".into()), meta());
        assert_eq!(cfg.port, "9090");
        assert_eq!(cfg.version, "1");
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn missing_file_is_an_error_for_read_only() {
        assert!(ServiceMetadata::read("/definitely/not/here/service.yaml").is_err());
    }
}
