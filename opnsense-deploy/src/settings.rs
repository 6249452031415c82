//! Settings file and override handling.
//!
//! A TOML settings file supplies defaults; command-line flags and environment
//! variables override individual keys. Backend selection happens once, here.

use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOCKER_URL: &str = "http://localhost:2375";
pub const DEFAULT_STATE_DIR: &str = ".opnsense-deploy";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub document: DocumentSection,
    pub remote: RemoteSection,
    pub runtime: RuntimeSection,
    pub store: StoreSection,
    pub deploy: DeploySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentSection {
    pub path: Option<PathBuf>,
    /// Copy the previous document to `<path>.bak` before each save.
    pub backup: bool,
}

impl Default for DocumentSection {
    fn default() -> Self {
        Self {
            path: None,
            backup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    pub url: Option<String>,
    pub key: Option<String>,
    pub secret: Option<SecretString>,
    pub verify_ssl: bool,
    pub timeout_secs: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            secret: None,
            verify_ssl: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Which workload runtime deployments drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEngine {
    #[default]
    Docker,
    /// Process-local; nothing survives the invocation.
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    pub engine: RuntimeEngine,
    /// Docker Engine API base URL, `DEFAULT_DOCKER_URL` when unset.
    pub docker_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// Directory for the workload and deployment-log files.
    pub dir: Option<PathBuf>,
}

impl StoreSection {
    pub fn dir_or_default(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySection {
    /// Interface port forwards are attached to.
    pub wan_interface: String,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            wan_interface: "wan".to_string(),
        }
    }
}

/// Fully populated remote connection settings.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub url: String,
    pub key: String,
    pub secret: SecretString,
    pub verify_ssl: bool,
    pub timeout_secs: u64,
}

impl RemoteSettings {
    pub fn new(url: impl Into<String>, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            secret: SecretString::from(secret.into()),
            verify_ssl: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Which backend the settings select.
#[derive(Debug, Clone)]
pub enum BackendChoice {
    Remote(RemoteSettings),
    Document { path: PathBuf, backup: bool },
    None,
}

/// Per-key overrides collected from flags and environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub verify_ssl: Option<bool>,
    pub runtime: Option<RuntimeEngine>,
    pub docker_url: Option<String>,
    pub state_dir: Option<PathBuf>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, path.display().to_string())
    }

    pub fn parse(raw: &str, origin: String) -> Result<Self, SettingsError> {
        toml::from_str(raw).map_err(|source| SettingsError::Parse {
            path: origin,
            source,
        })
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.config_path {
            self.document.path = Some(path);
        }
        if let Some(url) = overrides.api_url {
            self.remote.url = Some(url);
        }
        if let Some(key) = overrides.api_key {
            self.remote.key = Some(key);
        }
        if let Some(secret) = overrides.api_secret {
            self.remote.secret = Some(SecretString::from(secret));
        }
        if let Some(verify) = overrides.verify_ssl {
            self.remote.verify_ssl = verify;
        }
        if let Some(engine) = overrides.runtime {
            self.runtime.engine = engine;
        }
        if let Some(url) = overrides.docker_url {
            self.runtime.docker_url = Some(url);
        }
        if let Some(dir) = overrides.state_dir {
            self.store.dir = Some(dir);
        }
    }

    /// Remote wins when URL, key and secret are all set; else the document path; else none.
    pub fn backend_choice(&self) -> BackendChoice {
        let secret = self
            .remote
            .secret
            .as_ref()
            .filter(|s| !s.expose_secret().trim().is_empty());
        if let (Some(url), Some(key), Some(secret)) =
            (non_blank(&self.remote.url), non_blank(&self.remote.key), secret)
        {
            return BackendChoice::Remote(RemoteSettings {
                url: url.to_string(),
                key: key.to_string(),
                secret: secret.clone(),
                verify_ssl: self.remote.verify_ssl,
                timeout_secs: self.remote.timeout_secs,
            });
        }
        match &self.document.path {
            Some(path) => BackendChoice::Document {
                path: path.clone(),
                backup: self.document.backup,
            },
            None => BackendChoice::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{BackendChoice, Overrides, RuntimeEngine, Settings};

    #[test]
    fn remote_requires_all_three_credentials() {
        let mut settings = Settings::parse(
            r#"
            [document]
            path = "/conf/config.xml"

            [remote]
            url = "https://fw.example/api"
            key = "k"
            "#,
            "inline".into(),
        )
        .expect("parse");
        assert!(matches!(
            settings.backend_choice(),
            BackendChoice::Document { .. }
        ));

        settings.apply(Overrides {
            api_secret: Some("s".into()),
            ..Overrides::default()
        });
        match settings.backend_choice() {
            BackendChoice::Remote(remote) => {
                assert_eq!(remote.url, "https://fw.example/api");
                assert!(remote.verify_ssl);
                assert_eq!(remote.timeout_secs, 30);
            }
            other => panic!("expected remote, got {other:?}"),
        }
    }

    #[test]
    fn empty_settings_select_nothing() {
        let settings = Settings::default();
        assert!(matches!(settings.backend_choice(), BackendChoice::None));
        assert_eq!(settings.deploy.wan_interface, "wan");
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::parse(
            "[document]\npath = \"a.xml\"\nbackup = false\n",
            "inline".into(),
        )
        .expect("parse");
        settings.apply(Overrides {
            config_path: Some(PathBuf::from("b.xml")),
            ..Overrides::default()
        });
        match settings.backend_choice() {
            BackendChoice::Document { path, backup } => {
                assert_eq!(path, PathBuf::from("b.xml"));
                assert!(!backup);
            }
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[test]
    fn runtime_engine_parses_lowercase() {
        let settings = Settings::parse(
            "[runtime]\nengine = \"memory\"\n\n[store]\ndir = \"/var/lib/od\"\n",
            "inline".into(),
        )
        .expect("parse");
        assert_eq!(settings.runtime.engine, RuntimeEngine::Memory);
        assert_eq!(settings.store.dir_or_default(), PathBuf::from("/var/lib/od"));
        assert_eq!(
            Settings::default().store.dir_or_default(),
            PathBuf::from(".opnsense-deploy")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::parse("[remote]\nsecert = \"x\"\n", "inline".into()).is_err());
    }
}
