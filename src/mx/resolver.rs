use std::future::Future;
use std::time::Duration;

use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

use super::{Error, MxRecord};

/// Source of MX answers. Implemented by [`DnsResolver`] and by test doubles.
///
/// An empty `Vec` means the name exists but publishes no MX records; only
/// transport or server failures are reported as errors.
pub trait LookupMx: Send + Sync {
    fn lookup_mx(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<MxRecord>, ResolveError>> + Send;
}

/// Asynchronous system resolver with a per-query timeout.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf(timeout: Duration) -> Result<Self, Error> {
        let (config, opts) =
            trust_dns_resolver::system_conf::read_system_conf().map_err(Error::resolver_init)?;
        Ok(Self::with_config(config, opts, timeout))
    }

    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts, timeout: Duration) -> Self {
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl LookupMx for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = match self.inner.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => return Ok(Vec::new()),
                _ => return Err(err),
            },
        };
        let records = lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(mx.exchange().to_utf8())))
            .collect();
        Ok(records)
    }
}

/// Resolve the most preferred exchange for `domain`, bounded by `timeout`.
///
/// The answer is sorted here rather than trusting the resolver's order.
pub async fn resolve_primary<R>(
    resolver: &R,
    domain: &str,
    timeout: Duration,
) -> Result<MxRecord, Error>
where
    R: LookupMx,
{
    let ascii = normalize_domain(domain)?;
    let records = match tokio::time::timeout(timeout, resolver.lookup_mx(&ascii)).await {
        Ok(answer) => answer.map_err(Error::lookup)?,
        Err(_) => {
            return Err(Error::Timeout {
                domain: ascii,
                timeout,
            });
        }
    };
    debug!(domain = %ascii, count = records.len(), "MX answer received");
    select_primary(&ascii, records)
}

pub(crate) fn select_primary(ascii_domain: &str, mut records: Vec<MxRecord>) -> Result<MxRecord, Error> {
    // RFC 7505 null MX ("0 .") normalises to an empty exchange.
    records.retain(|record| !record.exchange.is_empty());
    records.sort();
    records.into_iter().next().ok_or_else(|| Error::NoRecords {
        domain: ascii_domain.to_string(),
    })
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, Error> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(Error::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(Error::idna)
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}
