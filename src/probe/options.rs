use std::time::Duration;

use super::types::TlsPolicy;

pub const DEFAULT_SENDER: &str = "test@example.com";

/// Controls how [`SmtpProber`](super::SmtpProber) talks to a mail exchanger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub port: u16,
    pub sender: String,
    pub helo_domain: String,
    /// Bounds the TCP connect and the server greeting.
    pub connect_timeout: Duration,
    /// Bounds each command/reply round trip after the greeting.
    pub command_timeout: Duration,
    pub tls_policy: TlsPolicy,
    pub tls_verify: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            port: 25,
            sender: DEFAULT_SENDER.to_string(),
            helo_domain: "localhost".to_string(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            tls_policy: TlsPolicy::Opportunistic,
            tls_verify: false,
        }
    }
}

impl ProbeOptions {
    /// Returns the envelope sender used in `MAIL FROM`; an empty sender is
    /// sent as the null reverse-path `<>`.
    pub fn mail_from_command(&self) -> String {
        format!("MAIL FROM:<{}>", self.sender.trim())
    }
}
