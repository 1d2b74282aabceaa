//! TOML settings for the CLI: backend endpoints, identity bindings, and
//! logging. Every field has a default so a missing file still yields a
//! working local setup.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backends: BackendSettings,
    pub identity: IdentitySettings,
    pub logging: LoggingSettings,
}

/// How classification requests are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMode {
    /// HTTP service when `classify_url` is set, LLM adapter otherwise.
    #[default]
    Auto,
    Http,
    Llm,
    Lexical,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub generate_url: String,
    pub classify_url: String,
    pub classify_mode: ClassifyMode,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            generate_url: "http://127.0.0.1:8080".to_string(),
            classify_url: String::new(),
            classify_mode: ClassifyMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub user: String,
    pub persona: String,
    #[serde(rename = "char")]
    pub char_name: String,
    pub personality: String,
    pub scenario: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            user: "User".to_string(),
            persona: String::new(),
            char_name: "Assistant".to_string(),
            personality: String::new(),
            scenario: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridable via `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.backends.generate_url, "http://127.0.0.1:8080");
        assert_eq!(settings.backends.classify_mode, ClassifyMode::Auto);
        assert_eq!(settings.identity.user, "User");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backends]\nclassify_url = \"http://inference.local\"\nclassify_mode = \"http\"\n\n[identity]\nchar = \"Nova\"\n"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.backends.classify_url, "http://inference.local");
        assert_eq!(settings.backends.classify_mode, ClassifyMode::Http);
        assert_eq!(settings.identity.char_name, "Nova");
        assert_eq!(settings.identity.user, "User");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [[[").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
