//! Batch fan-out: admit, spawn one task per address, join in input order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{Instrument, info, info_span, warn};

use crate::address::split_address_list;
use crate::gate::AdmissionGate;
use crate::mx::LookupMx;
use crate::probe::SmtpProbe;
use crate::verdict::VerificationResult;
use crate::verify::Verifier;

pub const NO_EMAILS: &str = "No emails provided";
pub const NOT_A_STRING_LIST: &str = "Emails should be a list of strings";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("rate limit exceeded for {caller}: {limit} batches per window, retry in {retry_after:?}")]
    RateLimitExceeded {
        caller: String,
        limit: u32,
        retry_after: Duration,
    },
}

/// Addresses submitted by one caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchRequest {
    pub emails: Vec<String>,
}

impl BatchRequest {
    pub fn new(emails: Vec<String>) -> Self {
        Self { emails }
    }

    /// Comma-separated form field: items are trimmed, blanks dropped.
    pub fn from_form(raw: &str) -> Self {
        Self::new(split_address_list(raw))
    }

    /// `{"emails": ["a@b.c", ...]}`. Entries are kept verbatim.
    #[cfg(feature = "with-serde")]
    pub fn from_json(raw: &str) -> Result<Self, BatchError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|err| BatchError::InvalidRequest(format!("Invalid JSON body: {err}")))?;
        let emails = value
            .as_object()
            .and_then(|object| object.get("emails"))
            .ok_or_else(|| BatchError::InvalidRequest(NO_EMAILS.to_string()))?;
        let items = emails
            .as_array()
            .ok_or_else(|| BatchError::InvalidRequest(NOT_A_STRING_LIST.to_string()))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| BatchError::InvalidRequest(NOT_A_STRING_LIST.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

pub struct BatchVerifier<R, P, G> {
    verifier: Arc<Verifier<R, P>>,
    gate: G,
    max_concurrency: Option<usize>,
}

impl<R, P, G> BatchVerifier<R, P, G>
where
    R: LookupMx + 'static,
    P: SmtpProbe + 'static,
    G: AdmissionGate,
{
    pub fn new(verifier: Verifier<R, P>, gate: G) -> Self {
        Self {
            verifier: Arc::new(verifier),
            gate,
            max_concurrency: None,
        }
    }

    /// At most `limit` pipelines of one batch run at the same time. A limit
    /// of zero is treated as one.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.map(|limit| limit.max(1));
        self
    }

    pub fn verifier(&self) -> &Verifier<R, P> {
        &self.verifier
    }

    pub async fn verify_request(
        &self,
        caller: &str,
        request: BatchRequest,
    ) -> Result<Vec<VerificationResult>, BatchError> {
        self.verify_batch(caller, request.emails).await
    }

    /// Verify every address and return one result per input, in input order.
    ///
    /// The only batch-wide failure is the admission check, which runs before
    /// any lookup.
    pub async fn verify_batch(
        &self,
        caller: &str,
        addresses: Vec<String>,
    ) -> Result<Vec<VerificationResult>, BatchError> {
        self.gate
            .admit(caller)
            .map_err(|rejection| BatchError::RateLimitExceeded {
                caller: caller.to_string(),
                limit: rejection.limit,
                retry_after: rejection.retry_after,
            })?;
        info!(caller, count = addresses.len(), "batch admitted");

        let permits = self.max_concurrency.map(|limit| Arc::new(Semaphore::new(limit)));
        let handles: Vec<_> = addresses
            .iter()
            .map(|address| {
                let verifier = Arc::clone(&self.verifier);
                let permits = permits.clone();
                let address = address.clone();
                let span = info_span!("verify", address = %address);
                tokio::spawn(
                    async move {
                        // The semaphore is never closed, so acquisition only waits.
                        let _permit = match permits {
                            Some(permits) => permits.acquire_owned().await.ok(),
                            None => None,
                        };
                        verifier.verify(&address).await
                    }
                    .instrument(span),
                )
            })
            .collect();
        let _guard = AbortOnDrop(handles.iter().map(|handle| handle.abort_handle()).collect());
        let joined = join_all(handles).await;

        let results: Vec<VerificationResult> = joined
            .into_iter()
            .zip(&addresses)
            .map(|(joined, address)| match joined {
                Ok(result) => result,
                Err(err) => {
                    warn!(address = %address, error = %err, "verification task aborted");
                    VerificationResult::transaction_error(address, format!("verification task failed: {err}"))
                }
            })
            .collect();

        let valid = results.iter().filter(|result| result.is_valid()).count();
        info!(caller, total = results.len(), valid, "batch finished");
        Ok(results)
    }
}

/// Aborts the pipelines still running when the batch future is dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
