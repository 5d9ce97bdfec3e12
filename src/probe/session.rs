use std::io;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::error::ProbeError;
use super::types::{ProbeStage, SmtpReply};

enum SmtpStream {
    Plain(BufStream<TcpStream>),
    Tls(Box<BufStream<TlsStream<TcpStream>>>),
    Closed,
}

impl SmtpStream {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = line.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        match self {
            Self::Plain(stream) => {
                stream.write_all(&data).await?;
                stream.flush().await
            }
            Self::Tls(stream) => {
                stream.write_all(&data).await?;
                stream.flush().await
            }
            Self::Closed => Err(closed_error()),
        }
    }

    async fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read_line(buf).await,
            Self::Tls(stream) => stream.read_line(buf).await,
            Self::Closed => Err(closed_error()),
        }
    }

    async fn read_reply(&mut self) -> io::Result<SmtpReply> {
        let mut code = None;
        let mut message_lines = Vec::new();
        loop {
            let mut raw = String::new();
            let bytes = self.read_line(&mut raw).await?;
            if bytes == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading reply",
                ));
            }
            let (parsed_code, continuation, text) = parse_reply_line(&raw)?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("inconsistent SMTP reply codes: {existing} vs {parsed_code}"),
                    ));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            message_lines.push(text);
            if !continuation {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "SMTP reply missing status code")
            })?,
            message: message_lines.join("\n"),
        })
    }

    async fn shutdown(&mut self) {
        let result = match self {
            Self::Plain(stream) => stream.shutdown().await,
            Self::Tls(stream) => stream.shutdown().await,
            Self::Closed => Ok(()),
        };
        if let Err(err) = result {
            debug!(error = %err, "socket shutdown failed");
        }
        *self = Self::Closed;
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "SMTP stream is closed")
}

/// Split one reply line into `(code, has_continuation, text)`.
pub(crate) fn parse_reply_line(raw: &str) -> io::Result<(u16, bool, String)> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.len() < 3 || !line.is_char_boundary(3) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid SMTP reply: '{line}'"),
        ));
    }
    let code_part = &line[..3];
    let code = code_part
        .parse::<u16>()
        .ok()
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid SMTP status code: '{code_part}'"),
            )
        })?;
    let continuation = line.as_bytes().get(3).copied() == Some(b'-');
    let text = line.get(4..).unwrap_or_default().to_string();
    Ok((code, continuation, text))
}

/// One SMTP conversation with a single exchange. Dropping the session closes
/// the socket.
pub(crate) struct SmtpSession {
    host: String,
    stream: SmtpStream,
    command_timeout: Duration,
}

impl SmtpSession {
    /// Open the TCP connection and read the greeting. `connect_timeout` is one
    /// deadline shared by both steps.
    pub(crate) async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<(Self, SmtpReply), ProbeError> {
        let deadline = Instant::now() + connect_timeout;
        let tcp = match timeout_at(deadline, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ProbeError::Connect {
                    host: host.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(ProbeError::ConnectTimeout {
                    host: host.to_string(),
                    timeout: connect_timeout,
                });
            }
        };
        if let Err(err) = tcp.set_nodelay(true) {
            debug!(host, error = %err, "TCP_NODELAY not applied");
        }

        let mut session = Self {
            host: host.to_string(),
            stream: SmtpStream::Plain(BufStream::new(tcp)),
            command_timeout,
        };

        let greeting = match timeout_at(deadline, session.stream.read_reply()).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                session.close().await;
                return Err(ProbeError::Greeting {
                    host: host.to_string(),
                    message: err.to_string(),
                });
            }
            Err(_) => {
                session.close().await;
                return Err(ProbeError::Greeting {
                    host: host.to_string(),
                    message: format!("no greeting within {connect_timeout:?}"),
                });
            }
        };
        debug!(host, code = greeting.code, message = %greeting.message, "S: greeting");

        if !greeting.is_positive_completion() {
            session.quit().await;
            return Err(ProbeError::Greeting {
                host: host.to_string(),
                message: greeting.to_string(),
            });
        }
        Ok((session, greeting))
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        matches!(self.stream, SmtpStream::Tls(_))
    }

    /// Send `command` and wait for the complete reply.
    pub(crate) async fn command(
        &mut self,
        stage: ProbeStage,
        command: &str,
    ) -> Result<SmtpReply, ProbeError> {
        debug!(host = %self.host, %stage, "C: {command}");
        let stream = &mut self.stream;
        let exchange = async move {
            stream.write_line(command).await?;
            stream.read_reply().await
        };
        let reply = match timeout(self.command_timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Err(ProbeError::transaction(stage, err)),
            Err(_) => {
                return Err(ProbeError::transaction(
                    stage,
                    format!("no reply within {:?}", self.command_timeout),
                ));
            }
        };
        debug!(host = %self.host, %stage, code = reply.code, "S: {}", reply.message);
        Ok(reply)
    }

    /// Replace the clear-text stream with a TLS stream after a `220` to
    /// `STARTTLS`.
    pub(crate) async fn upgrade(
        &mut self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<(), ProbeError> {
        let plain = match std::mem::replace(&mut self.stream, SmtpStream::Closed) {
            SmtpStream::Plain(stream) => stream,
            other => {
                self.stream = other;
                return Ok(());
            }
        };
        let tcp = plain.into_inner();
        match timeout(self.command_timeout, connector.connect(server_name, tcp)).await {
            Ok(Ok(tls)) => {
                debug!(host = %self.host, "TLS established");
                self.stream = SmtpStream::Tls(Box::new(BufStream::new(tls)));
                Ok(())
            }
            Ok(Err(err)) => Err(ProbeError::transaction(
                ProbeStage::StartTls,
                format!("TLS handshake failed: {err}"),
            )),
            Err(_) => Err(ProbeError::transaction(
                ProbeStage::StartTls,
                "TLS handshake timed out",
            )),
        }
    }

    /// Best-effort `QUIT`, then close. Errors are only logged.
    pub(crate) async fn quit(mut self) {
        if let Err(err) = self.command(ProbeStage::Quit, "QUIT").await {
            debug!(host = %self.host, error = %err, "QUIT not acknowledged");
        }
        self.close().await;
    }

    pub(crate) async fn close(&mut self) {
        self.stream.shutdown().await;
    }
}
