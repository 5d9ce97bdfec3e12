//! Shape of the TOML configuration file. Every key is optional; missing keys
//! keep the built-in default.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) smtp: SmtpSection,
    #[serde(default)]
    pub(crate) dns: DnsSection,
    #[serde(default)]
    pub(crate) batch: BatchSection,
    #[serde(default)]
    pub(crate) quota: QuotaSection,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpSection {
    pub(crate) sender: Option<String>,
    pub(crate) helo_domain: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) connect_timeout_ms: Option<u64>,
    pub(crate) command_timeout_ms: Option<u64>,
    pub(crate) tls_policy: Option<crate::probe::TlsPolicy>,
    pub(crate) tls_verify: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsSection {
    pub(crate) timeout_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct BatchSection {
    pub(crate) max_concurrency: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct QuotaSection {
    pub(crate) max_batches: Option<u32>,
    pub(crate) window_secs: Option<u64>,
}
