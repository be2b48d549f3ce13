//! Process-wide server configuration.
//!
//! Built once at startup, from a TOML file or the built-in defaults, and then shared read-only
//! by every connection.

use joblib::Launcher;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fmt, io};
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8500";
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_TIMEOUT: i64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid launcher for language {language}: {source}")]
    Launcher {
        language: String,
        #[source]
        source: joblib::errors::JobError,
    },
    #[error("max_timeout must be at least 1 second")]
    MaxTimeout,
    #[error("max_message_size must not be zero")]
    MaxMessageSize,
    #[error("no languages configured")]
    NoLanguages,
}

/// A language jobs can be run in.
#[derive(Clone, Debug)]
pub struct Language {
    pub name: String,
    pub version: Option<String>,
    pub url: Option<String>,
    pub launcher: Arc<Launcher>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Largest request accepted, in bytes.
    pub max_message_size: usize,
    /// Largest job timeout accepted, in seconds. Also the default timeout.
    pub max_timeout: i64,
    /// Keyed by the identifier clients put in a request's `language` field.
    pub languages: BTreeMap<String, Language>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    listen: Option<SocketAddr>,
    max_message_size: Option<usize>,
    max_timeout: Option<i64>,
    #[serde(default)]
    languages: BTreeMap<String, LanguageEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LanguageEntry {
    name: Option<String>,
    version: Option<String>,
    url: Option<String>,
    command: Vec<String>,
}

/// (id, display name, interpreter)
const BUILTIN_LANGUAGES: &[(&str, &str, &str)] = &[
    ("bash", "Bash", "bash"),
    ("node", "Node.js", "node"),
    ("perl", "Perl", "perl"),
    ("python", "Python", "python3"),
    ("ruby", "Ruby", "ruby"),
    ("sh", "POSIX sh", "sh"),
    ("zsh", "Zsh", "zsh"),
];

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse a configuration file. Omitted settings take their defaults; omitting the
    /// `languages` table selects the built-in languages.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let defaults = Self::default();
        let languages = if file.languages.is_empty() {
            defaults.languages
        } else {
            file.languages
                .into_iter()
                .map(|(id, entry)| {
                    let launcher =
                        Launcher::parse(&entry.command).map_err(|source| ConfigError::Launcher {
                            language: id.clone(),
                            source,
                        })?;
                    let language = Language {
                        name: entry.name.unwrap_or_else(|| id.clone()),
                        version: entry.version,
                        url: entry.url,
                        launcher: Arc::new(launcher),
                    };
                    Ok((id, language))
                })
                .collect::<Result<_, ConfigError>>()?
        };
        let config = Self {
            listen: file.listen.unwrap_or(defaults.listen),
            max_message_size: file.max_message_size.unwrap_or(defaults.max_message_size),
            max_timeout: file.max_timeout.unwrap_or(defaults.max_timeout),
            languages,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_timeout < 1 {
            return Err(ConfigError::MaxTimeout);
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::MaxMessageSize);
        }
        if self.languages.is_empty() {
            return Err(ConfigError::NoLanguages);
        }
        Ok(())
    }

    pub fn language(&self, id: &str) -> Option<&Language> {
        self.languages.get(id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let languages = BUILTIN_LANGUAGES
            .iter()
            .map(|&(id, name, program)| {
                let template = [program, "{options}", "{code}", "{arguments}"];
                let launcher =
                    Launcher::parse(&template).expect("built-in launcher templates are valid");
                let language = Language {
                    name: name.to_string(),
                    version: None,
                    url: None,
                    launcher: Arc::new(launcher),
                };
                (id.to_string(), language)
            })
            .collect();
        Self {
            listen: DEFAULT_LISTEN
                .parse()
                .expect("default listen address is valid"),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            languages,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, " {}", version)?;
        }
        write!(f, " ({})", self.launcher.program())?;
        if let Some(url) = &self.url {
            write!(f, " <{}>", url)?;
        }
        Ok(())
    }
}
