//! Mapping resolver and probe outcomes to a verdict with a fixed detail text.

use std::fmt;

use crate::probe::{ProbeError, ProbeOutcome};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    Valid,
    Invalid,
    MalformedAddress,
    DomainResolutionFailed,
    ConnectionFailed,
    TransactionError,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::MalformedAddress => "malformed_address",
            Self::DomainResolutionFailed => "domain_resolution_failed",
            Self::ConnectionFailed => "connection_failed",
            Self::TransactionError => "transaction_error",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final word on one input address. `detail` is the caller-facing sentence.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub input: String,
    pub verdict: VerdictKind,
    pub detail: String,
}

impl VerificationResult {
    pub fn malformed(input: &str) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::MalformedAddress,
            detail: format!("Invalid email format: {input}"),
        }
    }

    pub fn resolution_failed(input: &str, domain: &str) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::DomainResolutionFailed,
            detail: format!("Failed to retrieve MX record for domain: {domain}"),
        }
    }

    pub fn connection_failed(input: &str, host: &str) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::ConnectionFailed,
            detail: format!("Failed to connect to SMTP server: {host}"),
        }
    }

    pub fn transaction_error(input: &str, diagnostic: impl fmt::Display) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::TransactionError,
            detail: format!("Error during SMTP transaction for {input}: {diagnostic}"),
        }
    }

    pub fn valid(input: &str) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::Valid,
            detail: format!("Email {input} is valid."),
        }
    }

    pub fn invalid(input: &str, code: u16, message: &str) -> Self {
        Self {
            input: input.to_string(),
            verdict: VerdictKind::Invalid,
            detail: format!("Email {input} is invalid. Response code: {code}, Message: {message}"),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verdict.is_valid()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Classify what the probe observed for `input` on `host`.
///
/// Only an exact `250` counts as valid; `251` (forwarding) and every other
/// code is reported as invalid with the server text untouched.
pub fn classify_probe(
    input: &str,
    host: &str,
    outcome: Result<ProbeOutcome, ProbeError>,
) -> VerificationResult {
    match outcome {
        Ok(outcome) if outcome.code() == 250 => VerificationResult::valid(input),
        Ok(outcome) => VerificationResult::invalid(input, outcome.code(), outcome.message()),
        Err(err) if err.is_connection_stage() => VerificationResult::connection_failed(input, host),
        Err(err) => VerificationResult::transaction_error(input, err),
    }
}
