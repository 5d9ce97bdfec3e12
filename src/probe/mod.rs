//! SMTP probing: greet, optionally upgrade with `STARTTLS`, then send
//! `MAIL FROM` and `RCPT TO` and report the server's answer without ever
//! reaching `DATA`.
//!
//! The connection is owned by [`SmtpProber::probe`] for its whole lifetime
//! and is closed on every return path.

mod error;
mod options;
mod session;
mod tls;
mod types;

pub use error::ProbeError;
pub use options::{DEFAULT_SENDER, ProbeOptions};
pub use types::{ProbeOutcome, ProbeStage, SmtpReply, TlsPolicy};

use std::future::Future;

use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use session::SmtpSession;

/// Anything able to ask a mail exchanger about one recipient.
pub trait SmtpProbe: Send + Sync {
    fn probe(
        &self,
        host: &str,
        recipient: &str,
    ) -> impl Future<Output = Result<ProbeOutcome, ProbeError>> + Send;
}

/// Probe speaking SMTP over TCP.
pub struct SmtpProber {
    options: ProbeOptions,
    connector: Option<TlsConnector>,
}

impl SmtpProber {
    pub fn new(options: ProbeOptions) -> Self {
        let connector = match options.tls_policy {
            TlsPolicy::Opportunistic => Some(tls::build_connector(options.tls_verify)),
            TlsPolicy::Disabled => None,
        };
        Self { options, connector }
    }

    async fn transact(
        &self,
        session: &mut SmtpSession,
        host: &str,
        recipient: &str,
    ) -> Result<ProbeOutcome, ProbeError> {
        let ehlo = self.greet(session).await?;

        match &self.connector {
            Some(connector) if ehlo.has_capability("STARTTLS") => {
                let reply = session.command(ProbeStage::StartTls, "STARTTLS").await?;
                if reply.code == 220 {
                    session.upgrade(connector, tls::server_name(host)?).await?;
                    self.greet(session).await?;
                } else {
                    debug!(host, code = reply.code, "STARTTLS refused, continuing in clear text");
                }
            }
            Some(_) => debug!(host, "STARTTLS not advertised, continuing in clear text"),
            None => {}
        }

        let mail = session
            .command(ProbeStage::MailFrom, &self.options.mail_from_command())
            .await?;
        if !mail.is_positive_completion() {
            warn!(host, code = mail.code, "sender refused");
            return Ok(ProbeOutcome {
                host: host.to_string(),
                stage: ProbeStage::MailFrom,
                reply: mail,
                encrypted: session.is_encrypted(),
            });
        }

        let rcpt = session
            .command(ProbeStage::RcptTo, &format!("RCPT TO:<{recipient}>"))
            .await?;
        Ok(ProbeOutcome {
            host: host.to_string(),
            stage: ProbeStage::RcptTo,
            reply: rcpt,
            encrypted: session.is_encrypted(),
        })
    }

    /// `EHLO`, falling back to `HELO` for servers that do not speak ESMTP.
    async fn greet(&self, session: &mut SmtpSession) -> Result<SmtpReply, ProbeError> {
        let name = &self.options.helo_domain;
        let ehlo = session
            .command(ProbeStage::Ehlo, &format!("EHLO {name}"))
            .await?;
        if ehlo.is_positive_completion() {
            return Ok(ehlo);
        }
        let helo = session
            .command(ProbeStage::Ehlo, &format!("HELO {name}"))
            .await?;
        if helo.is_positive_completion() {
            Ok(helo)
        } else {
            Err(ProbeError::Rejected {
                stage: ProbeStage::Ehlo,
                reply: helo,
            })
        }
    }
}

impl SmtpProbe for SmtpProber {
    async fn probe(&self, host: &str, recipient: &str) -> Result<ProbeOutcome, ProbeError> {
        if recipient.contains(['\r', '\n']) {
            return Err(ProbeError::transaction(
                ProbeStage::RcptTo,
                "recipient contains a line break",
            ));
        }

        let (mut session, _greeting) = SmtpSession::connect(
            host,
            self.options.port,
            self.options.connect_timeout,
            self.options.command_timeout,
        )
        .await?;

        let outcome = self.transact(&mut session, host, recipient).await;
        // After a transport failure there is nobody left to say QUIT to.
        if matches!(outcome, Ok(_) | Err(ProbeError::Rejected { .. })) {
            session.quit().await;
        } else {
            session.close().await;
        }
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests;
