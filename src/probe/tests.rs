use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::*;

type ProbeResult = Result<ProbeOutcome, ProbeError>;
type ProbeFn = dyn Fn(&str, &str) -> ProbeResult + Send + Sync;

/// In-memory prober answering from a closure of `(host, recipient)`.
pub(crate) struct ScriptedProber {
    on_probe: Box<ProbeFn>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedProber {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str) -> ProbeResult + Send + Sync + 'static,
    {
        Self {
            on_probe: Box::new(f),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every recipient gets the same reply.
    pub(crate) fn replying(code: u16, message: &'static str) -> Self {
        Self::new(move |host, _| Ok(rcpt_outcome(host, code, message)))
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SmtpProbe for ScriptedProber {
    async fn probe(&self, host: &str, recipient: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.on_probe)(host, recipient)
    }
}

pub(crate) fn rcpt_outcome(host: &str, code: u16, message: &str) -> ProbeOutcome {
    ProbeOutcome {
        host: host.to_string(),
        stage: ProbeStage::RcptTo,
        reply: SmtpReply::new(code, message),
        encrypted: false,
    }
}

/// Script response that leaves the command unanswered with the socket open.
pub(crate) const STALL: &str = "<stall>";

/// Single-connection SMTP server replaying `script`. The handle yields every
/// command line it received. An empty `greeting` means the server never
/// greets; an empty response hangs up, `STALL` waits for the client to leave.
pub(crate) struct MockServer {
    pub port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl MockServer {
    pub(crate) async fn received(self) -> Vec<String> {
        self.handle.await.expect("mock server task")
    }
}

pub(crate) async fn spawn_mock_server(
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let Ok((stream, _)) = listener.accept().await else {
            return received;
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        if greeting.is_empty() {
            wait_for_hangup(&mut reader).await;
            return received;
        }
        if write_half.write_all(greeting.as_bytes()).await.is_err() {
            return received;
        }
        for (expected, response) in script {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim_end().to_string();
            assert!(
                line.starts_with(expected),
                "expected command starting with '{expected}', got '{line}'"
            );
            received.push(line);
            if response.is_empty() {
                // Hang up without answering.
                break;
            }
            if response == STALL {
                wait_for_hangup(&mut reader).await;
                break;
            }
            if write_half.write_all(response.as_bytes()).await.is_err() {
                break;
            }
        }
        received
    });
    MockServer { port, handle }
}

/// Read and discard until the peer closes its side.
async fn wait_for_hangup<R: AsyncBufReadExt + Unpin>(reader: &mut R) {
    let mut sink = String::new();
    while let Ok(read) = reader.read_line(&mut sink).await {
        if read == 0 {
            return;
        }
        sink.clear();
    }
}

/// Multi-connection server answering `RCPT TO` by local part:
/// `ok*` gets 250, `gone*` gets 550, `drop*` has the connection cut.
pub(crate) async fn spawn_responder() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind responder");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(stream));
        }
    });
    (port, handle)
}

async fn serve_connection(stream: TcpStream) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    if write_half.write_all(b"220 responder ESMTP\r\n").await.is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let upper = line.to_ascii_uppercase();
        let reply: &[u8] = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            b"250-responder\r\n250 SIZE 1000\r\n"
        } else if upper.starts_with("MAIL FROM") {
            b"250 2.1.0 Ok\r\n"
        } else if upper.starts_with("RCPT TO:<OK") {
            b"250 2.1.5 Ok\r\n"
        } else if upper.starts_with("RCPT TO:<GONE") {
            b"550 5.1.1 User unknown\r\n"
        } else if upper.starts_with("RCPT TO:<DROP") {
            return;
        } else if upper.starts_with("QUIT") {
            let _ = write_half.write_all(b"221 2.0.0 Bye\r\n").await;
            return;
        } else {
            b"502 5.5.2 Command not recognized\r\n"
        };
        if write_half.write_all(reply).await.is_err() {
            return;
        }
    }
}

/// A port nothing listens on.
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

pub(crate) fn local_options(port: u16) -> ProbeOptions {
    ProbeOptions {
        port,
        connect_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(2),
        ..ProbeOptions::default()
    }
}

const GREETING: &str = "220 mock.smtp.test ESMTP\r\n";

#[tokio::test]
async fn accepted_recipient_reports_250() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO localhost", "250-mock.example\r\n250 PIPELINING\r\n"),
            ("MAIL FROM:<test@example.com>", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:<user@example.com>", "250 2.1.5 Ok\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect("probe succeeds");
    assert_eq!(outcome.code(), 250);
    assert_eq!(outcome.stage, ProbeStage::RcptTo);
    assert_eq!(outcome.message(), "2.1.5 Ok");
    assert!(!outcome.encrypted);

    let received = server.received().await;
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn rejected_recipient_keeps_code_and_message() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "550 5.1.1 User unknown\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober
        .probe("127.0.0.1", "nobody@example.com")
        .await
        .expect("probe succeeds");
    assert_eq!(outcome.code(), 550);
    assert_eq!(outcome.message(), "5.1.1 User unknown");
    server.received().await;
}

#[tokio::test]
async fn falls_back_to_helo() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "502 5.5.2 Command not recognized\r\n"),
            ("HELO localhost", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 Ok\r\n"),
            ("RCPT TO:", "250 Ok\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober.probe("127.0.0.1", "user@example.com").await.expect("probe");
    assert_eq!(outcome.code(), 250);
    assert_eq!(server.received().await.len(), 5);
}

#[tokio::test]
async fn sender_refusal_stops_before_rcpt() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "553 5.7.1 Sender rejected\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober.probe("127.0.0.1", "user@example.com").await.expect("probe");
    assert_eq!(outcome.stage, ProbeStage::MailFrom);
    assert_eq!(outcome.code(), 553);
    let received = server.received().await;
    assert!(received.iter().all(|line| !line.starts_with("RCPT")));
}

#[tokio::test]
async fn starttls_not_advertised_stays_clear_text() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "250-mock.example\r\n250 8BITMIME\r\n"),
            ("MAIL FROM:", "250 Ok\r\n"),
            ("RCPT TO:", "250 Ok\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober.probe("127.0.0.1", "user@example.com").await.expect("probe");
    assert!(!outcome.encrypted);
    let received = server.received().await;
    assert!(received.iter().all(|line| line != "STARTTLS"));
}

#[tokio::test]
async fn refused_starttls_continues_in_clear_text() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "454 4.7.0 TLS not available\r\n"),
            ("MAIL FROM:", "250 Ok\r\n"),
            ("RCPT TO:", "250 Ok\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let prober = SmtpProber::new(local_options(server.port));
    let outcome = prober.probe("127.0.0.1", "user@example.com").await.expect("probe");
    assert_eq!(outcome.code(), 250);
    assert!(!outcome.encrypted);
    server.received().await;
}

#[tokio::test]
async fn disabled_policy_never_sends_starttls() {
    let server = spawn_mock_server(
        GREETING,
        vec![
            ("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
            ("MAIL FROM:", "250 Ok\r\n"),
            ("RCPT TO:", "250 Ok\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ],
    )
    .await;

    let options = ProbeOptions {
        tls_policy: TlsPolicy::Disabled,
        ..local_options(server.port)
    };
    let outcome = SmtpProber::new(options)
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect("probe");
    assert_eq!(outcome.code(), 250);
    let received = server.received().await;
    assert!(received.iter().all(|line| line != "STARTTLS"));
}

#[tokio::test]
async fn refused_connection_is_connection_stage() {
    let port = closed_port().await;
    let err = SmtpProber::new(local_options(port))
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect_err("nothing listens");
    assert!(err.is_connection_stage(), "{err:?}");
    assert!(matches!(err, ProbeError::Connect { ref host, .. } if host == "127.0.0.1"));
}

#[tokio::test]
async fn negative_greeting_is_connection_stage() {
    let server = spawn_mock_server(
        "554 5.3.2 Not accepting mail\r\n",
        vec![("QUIT", "221 Bye\r\n")],
    )
    .await;
    let err = SmtpProber::new(local_options(server.port))
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect_err("greeting refused");
    assert!(matches!(err, ProbeError::Greeting { .. }));
    assert!(err.is_connection_stage());
    server.received().await;
}

#[tokio::test]
async fn dropped_connection_is_transaction_error() {
    let server = spawn_mock_server(
        GREETING,
        vec![("EHLO", "250 mock.example\r\n"), ("MAIL FROM:", "")],
    )
    .await;
    let err = SmtpProber::new(local_options(server.port))
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect_err("server hung up");
    match &err {
        ProbeError::Transaction { stage, message } => {
            assert_eq!(*stage, ProbeStage::MailFrom);
            assert!(message.contains("connection closed"), "{message}");
        }
        other => panic!("expected transaction error, got {other:?}"),
    }
    assert!(!err.is_connection_stage());
    server.received().await;
}

#[tokio::test]
async fn silent_server_hits_the_greeting_deadline() {
    let server = spawn_mock_server("", Vec::new()).await;
    let options = ProbeOptions {
        connect_timeout: Duration::from_millis(300),
        ..local_options(server.port)
    };

    let started = Instant::now();
    let err = SmtpProber::new(options)
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect_err("no greeting");
    let elapsed = started.elapsed();

    match &err {
        ProbeError::Greeting { host, message } => {
            assert_eq!(host, "127.0.0.1");
            assert!(message.contains("no greeting within"), "{message}");
        }
        other => panic!("expected greeting error, got {other:?}"),
    }
    assert!(err.is_connection_stage());
    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    // Connect and greeting share one deadline.
    assert!(elapsed < Duration::from_millis(550), "{elapsed:?}");
    assert!(server.received().await.is_empty());
}

#[tokio::test]
async fn stalled_command_hits_the_command_deadline() {
    let server = spawn_mock_server(
        GREETING,
        vec![("EHLO", "250 mock.example\r\n"), ("MAIL FROM:", STALL)],
    )
    .await;
    let options = ProbeOptions {
        command_timeout: Duration::from_millis(300),
        ..local_options(server.port)
    };

    let started = Instant::now();
    let err = SmtpProber::new(options)
        .probe("127.0.0.1", "user@example.com")
        .await
        .expect_err("no reply to MAIL FROM");

    match &err {
        ProbeError::Transaction { stage, message } => {
            assert_eq!(*stage, ProbeStage::MailFrom);
            assert!(message.contains("no reply within"), "{message}");
        }
        other => panic!("expected transaction error, got {other:?}"),
    }
    assert!(!err.is_connection_stage());
    assert!(started.elapsed() < Duration::from_secs(2));

    let received = server.received().await;
    assert!(received.iter().all(|line| !line.starts_with("RCPT")));
}

#[tokio::test]
async fn line_breaks_in_recipient_are_refused_before_connecting() {
    let port = closed_port().await;
    let err = SmtpProber::new(local_options(port))
        .probe("127.0.0.1", "a@b.com\r\nDATA")
        .await
        .expect_err("injection");
    assert!(matches!(
        err,
        ProbeError::Transaction {
            stage: ProbeStage::RcptTo,
            ..
        }
    ));
}
