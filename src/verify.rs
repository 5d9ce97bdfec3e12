//! Single-address pipeline: parse, resolve the primary MX, probe, classify.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::parse_address;
use crate::config::{ConfigError, VerifierConfig};
use crate::mx::{self, DnsResolver, LookupMx, resolve_primary};
use crate::probe::{SmtpProbe, SmtpProber};
use crate::verdict::{VerificationResult, classify_probe};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resolver(#[from] mx::Error),
}

pub struct Verifier<R, P> {
    resolver: R,
    prober: P,
    dns_timeout: Duration,
}

impl<R, P> Verifier<R, P>
where
    R: LookupMx,
    P: SmtpProbe,
{
    pub fn new(resolver: R, prober: P, dns_timeout: Duration) -> Self {
        Self {
            resolver,
            prober,
            dns_timeout,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn dns_timeout(&self) -> Duration {
        self.dns_timeout
    }

    /// Verify one address. Every failure is folded into the returned verdict.
    ///
    /// The recipient sent in `RCPT TO` is `input` exactly as given.
    pub async fn verify(&self, input: &str) -> VerificationResult {
        let parsed = match parse_address(input) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(error = %err, "malformed address");
                return VerificationResult::malformed(input);
            }
        };

        let mx = match resolve_primary(&self.resolver, &parsed.domain, self.dns_timeout).await {
            Ok(mx) => mx,
            Err(err) => {
                warn!(domain = %parsed.domain, error = %err, "MX resolution failed");
                return VerificationResult::resolution_failed(input, &parsed.domain);
            }
        };
        debug!(domain = %parsed.domain, host = %mx.exchange, preference = mx.preference, "primary MX");

        let outcome = self.prober.probe(&mx.exchange, input).await;
        if let Err(err) = &outcome {
            warn!(host = %mx.exchange, error = %err, "probe failed");
        }
        let result = classify_probe(input, &mx.exchange, outcome);
        info!(verdict = %result.verdict, "verified");
        result
    }
}

impl Verifier<DnsResolver, SmtpProber> {
    /// System resolver and TCP prober configured from `config`.
    pub fn from_config(config: &VerifierConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let resolver = DnsResolver::from_system_conf(config.dns_timeout)?;
        let prober = SmtpProber::new(config.probe_options());
        Ok(Self::new(resolver, prober, config.dns_timeout))
    }
}
