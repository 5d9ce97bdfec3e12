use std::time::Duration;

use thiserror::Error;

use super::types::{ProbeStage, SmtpReply};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection to {host} timed out after {timeout:?}")]
    ConnectTimeout { host: String, timeout: Duration },
    #[error("{host} did not greet: {message}")]
    Greeting { host: String, message: String },
    #[error("{stage} failed: {message}")]
    Transaction { stage: ProbeStage, message: String },
    #[error("{stage} rejected: {reply}")]
    Rejected { stage: ProbeStage, reply: SmtpReply },
}

impl ProbeError {
    pub(crate) fn transaction(stage: ProbeStage, message: impl ToString) -> Self {
        Self::Transaction {
            stage,
            message: message.to_string(),
        }
    }

    /// Failures before the server greeted us: nothing was said at SMTP level.
    pub fn is_connection_stage(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::ConnectTimeout { .. } | Self::Greeting { .. }
        )
    }
}
