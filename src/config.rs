//! Runtime settings for the verifier, their defaults and the TOML overlay.

mod file;

pub use file::ConfigFile;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::gate::Quota;
use crate::probe::{DEFAULT_SENDER, ProbeOptions, TlsPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub sender: String,
    pub helo_domain: String,
    pub smtp_port: u16,
    pub dns_timeout: Duration,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub tls_policy: TlsPolicy,
    pub tls_verify: bool,
    /// `None` runs every address of a batch at once.
    pub max_concurrency: Option<usize>,
    pub quota: Quota,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            sender: DEFAULT_SENDER.to_string(),
            helo_domain: "localhost".to_string(),
            smtp_port: 25,
            dns_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            tls_policy: TlsPolicy::Opportunistic,
            tls_verify: false,
            max_concurrency: None,
            quota: Quota::default(),
        }
    }
}

impl VerifierConfig {
    /// Defaults overlaid with `path`, then validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        let mut config = Self::default();
        config.apply_file(file);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        let ConfigFile {
            smtp,
            dns,
            batch,
            quota,
        } = file;

        if let Some(sender) = smtp.sender {
            self.sender = sender;
        }
        if let Some(helo) = smtp.helo_domain {
            self.helo_domain = helo;
        }
        if let Some(port) = smtp.port {
            self.smtp_port = port;
        }
        if let Some(ms) = smtp.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = smtp.command_timeout_ms {
            self.command_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = smtp.tls_policy {
            self.tls_policy = policy;
        }
        if let Some(verify) = smtp.tls_verify {
            self.tls_verify = verify;
        }
        if let Some(ms) = dns.timeout_ms {
            self.dns_timeout = Duration::from_millis(ms);
        }
        if batch.max_concurrency.is_some() {
            self.max_concurrency = batch.max_concurrency;
        }
        if let Some(max) = quota.max_batches {
            self.quota.max_batches = max;
        }
        if let Some(secs) = quota.window_secs {
            self.quota.window = Duration::from_secs(secs);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sender = self.sender.trim();
        if sender.is_empty() {
            return Err(ConfigError::invalid("sender", "must not be empty"));
        }
        if !sender.contains('@') {
            return Err(ConfigError::invalid("sender", format!("'{sender}' has no '@'")));
        }
        if self.helo_domain.trim().is_empty() {
            return Err(ConfigError::invalid("helo_domain", "must not be empty"));
        }
        for (field, value) in [
            ("dns_timeout", self.dns_timeout),
            ("connect_timeout", self.connect_timeout),
            ("command_timeout", self.command_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }
        if self.quota.max_batches == 0 {
            return Err(ConfigError::invalid("quota.max_batches", "must be at least 1"));
        }
        if self.quota.window.is_zero() {
            return Err(ConfigError::invalid("quota.window", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            port: self.smtp_port,
            sender: self.sender.trim().to_string(),
            helo_domain: self.helo_domain.clone(),
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            tls_policy: self.tls_policy,
            tls_verify: self.tls_verify,
        }
    }
}
