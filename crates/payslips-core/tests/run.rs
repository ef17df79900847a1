//! End-to-end runs against a scripted IMAP server.
//!
//! The mock stream replays canned server output and records what the client
//! sent; decryption goes through a fake backend.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use payslips_core::{
    Config, Decrypt, DecryptError, DecryptionOutcome, Error, ErrorPolicy, MailboxSession,
    PasswordRetryDecryptor, RunReport, run_session,
};

/// Mock stream that returns predefined responses.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

/// Accepts one password and "decrypts" by prefixing the file contents.
struct FakeQpdf {
    password: &'static str,
    inputs: Mutex<Vec<PathBuf>>,
}

impl FakeQpdf {
    fn attempted(&self, file_name: &str) -> bool {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .any(|input| input.ends_with(file_name))
    }
}

impl Decrypt for FakeQpdf {
    async fn attempt(&self, input: &Path, output: &Path, password: &str) -> DecryptionOutcome {
        self.inputs.lock().unwrap().push(input.to_path_buf());
        if password != self.password {
            return DecryptionOutcome::WrongPassword;
        }
        let mut plain = b"decrypted:".to_vec();
        plain.extend(std::fs::read(input).unwrap());
        std::fs::write(output, plain).unwrap();
        DecryptionOutcome::Success
    }
}

fn decryptor(passwords: &[&str]) -> PasswordRetryDecryptor<FakeQpdf> {
    PasswordRetryDecryptor::new(
        FakeQpdf {
            password: "right",
            inputs: Mutex::default(),
        },
        passwords.iter().map(|p| (*p).to_string()).collect(),
    )
}

fn config(output: &Path, policy: ErrorPolicy) -> Config {
    let mut config = Config::new("me@example.com", "secret", vec!["unused".to_string()]);
    config.output_dir = output.to_path_buf();
    config.error_policy = policy;
    config
}

const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 LITERAL+] ready\r\n";

const LOGIN_AND_EXAMINE: &[u8] = b"A0000 OK LOGIN completed\r\n\
    * 2 EXISTS\r\n\
    * 0 RECENT\r\n\
    A0001 OK [READ-ONLY] EXAMINE completed\r\n";

/// One `* n FETCH` response carrying an envelope and the full message.
fn fetch_response(seq: u32, subject: &str, message: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "* {seq} FETCH (ENVELOPE (NIL \"{subject}\" ((\"HR\" NIL \"hr\" \"example.com\")) \
         NIL NIL NIL NIL NIL NIL NIL) BODY[] {{{}}}\r\n",
        message.len()
    )
    .into_bytes();
    out.extend_from_slice(message);
    out.extend_from_slice(b")\r\n");
    out
}

/// Server side of a complete session whose search finds `fetches`.
fn script(search: &str, fetches: &[Vec<u8>]) -> Vec<u8> {
    let mut out = [GREETING, LOGIN_AND_EXAMINE].concat();
    out.extend_from_slice(format!("* SEARCH{search}\r\nA0002 OK SEARCH completed\r\n").as_bytes());
    if fetches.is_empty() {
        out.extend_from_slice(b"* BYE\r\nA0003 OK LOGOUT completed\r\n");
    } else {
        for fetch in fetches {
            out.extend_from_slice(fetch);
        }
        out.extend_from_slice(b"A0003 OK FETCH completed\r\n* BYE\r\nA0004 OK LOGOUT completed\r\n");
    }
    out
}

/// A multipart message with a payslip, a text part, a wrongly named PDF and
/// an image carrying a payslip name.
fn january() -> Vec<u8> {
    [
        "From: HR <hr@example.com>\r\n",
        "Subject: payslip\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
        "\r\n",
        "--XYZ\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "תלוש משכורת\r\n",
        "--XYZ\r\n",
        "Content-Type: application/pdf; name=\"123456789_2024_01.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"123456789_2024_01.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0xLjQgamFudWFyeQ==\r\n",
        "--XYZ\r\n",
        "Content-Type: application/pdf\r\n",
        "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
        "\r\n",
        "not a payslip\r\n",
        "--XYZ\r\n",
        "Content-Type: image/png\r\n",
        "Content-Disposition: attachment; filename=\"123456789_2024_03.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "iVBORw0KGgo=\r\n",
        "--XYZ--\r\n",
    ]
    .concat()
    .into_bytes()
}

/// A message whose first part has an unknown charset.
fn february() -> Vec<u8> {
    [
        "Subject: payslip\r\n",
        "Content-Type: multipart/mixed; boundary=b\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain; charset=x-klingon\r\n",
        "Content-Disposition: attachment; filename=notes.txt\r\n",
        "\r\n",
        "qapla'\r\n",
        "--b\r\n",
        "Content-Type: application/octet-stream\r\n",
        "Content-Disposition: attachment; filename=123456789_2024_02.pdf\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0xLjQgZmVicnVhcnk=\r\n",
        "--b--\r\n",
    ]
    .concat()
    .into_bytes()
}

fn two_payslips() -> Vec<u8> {
    script(
        " 1 3",
        &[
            fetch_response(1, "payslip 01", &january()),
            fetch_response(3, "payslip 02", &february()),
        ],
    )
}

#[tokio::test]
async fn test_saves_and_decrypts_matching_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&two_payslips());
    let session = MailboxSession::from_stream(stream).await.unwrap();
    let decryptor = decryptor(&["wrong", "right"]);

    let report = run_session(
        &config(dir.path(), ErrorPolicy::FailFast),
        session,
        &decryptor,
    )
    .await
    .unwrap();

    assert_eq!(
        report,
        RunReport {
            messages: 2,
            attachments_saved: 2,
            attachments_decrypted: 2,
            attachments_failed: 0,
        }
    );

    let year = dir.path().join("123456789").join("2024");
    assert_eq!(
        std::fs::read(year.join("01.pdf")).unwrap(),
        b"decrypted:%PDF-1.4 january"
    );
    assert_eq!(
        std::fs::read(year.join("02.pdf")).unwrap(),
        b"decrypted:%PDF-1.4 february"
    );
    let mut names: Vec<_> = std::fs::read_dir(&year)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["01.pdf", "02.pdf"]);

    // The image named like a payslip is rejected by its content type
    assert!(!year.join("03.pdf").exists());
    assert!(decryptor.backend().attempted("01.pdf"));
    assert!(!decryptor.backend().attempted("03.pdf"));

    let expected = [
        "A0000 LOGIN me@example.com secret\r\n",
        "A0001 EXAMINE Inbox\r\n",
        "A0002 SEARCH CHARSET UTF-8 BODY {21+}\r\n",
        "תלוש משכורת\r\n",
        "A0003 FETCH 1,3 (ENVELOPE BODY.PEEK[])\r\n",
        "A0004 LOGOUT\r\n",
    ]
    .concat();
    assert_eq!(sent_text(&sent), expected);
}

#[tokio::test]
async fn test_no_search_results_skips_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&script("", &[]));
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let report = run_session(
        &config(dir.path(), ErrorPolicy::FailFast),
        session,
        &decryptor(&["right"]),
    )
    .await
    .unwrap();

    assert_eq!(report, RunReport::default());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let sent = sent_text(&sent);
    assert!(!sent.contains("FETCH"));
    assert!(sent.ends_with("A0003 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_exhausted_passwords_abort_under_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&two_payslips());
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let err = run_session(
        &config(dir.path(), ErrorPolicy::FailFast),
        session,
        &decryptor(&["wrong", "also wrong"]),
    )
    .await
    .unwrap_err();

    match err {
        Error::Decrypt { path, source } => {
            assert!(path.ends_with("123456789/2024/01.pdf"));
            assert!(matches!(source, DecryptError::Exhausted { attempts: 2 }));
            // The saved file stays as it was received
            assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 january");
        }
        other => panic!("expected a decrypt error, got {other:?}"),
    }
    assert!(!dir.path().join("123456789/2024/02.pdf").exists());
    assert!(sent_text(&sent).ends_with("A0004 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_continue_policy_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&two_payslips());
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let report = run_session(
        &config(dir.path(), ErrorPolicy::Continue),
        session,
        &decryptor(&["wrong"]),
    )
    .await
    .unwrap();

    assert_eq!(
        report,
        RunReport {
            messages: 2,
            attachments_saved: 2,
            attachments_decrypted: 0,
            attachments_failed: 2,
        }
    );
    assert_eq!(
        std::fs::read(dir.path().join("123456789/2024/02.pdf")).unwrap(),
        b"%PDF-1.4 february"
    );
    assert!(sent_text(&sent).ends_with("A0004 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_expected_id_filters_other_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (stream, _sent) = MockStream::new(&two_payslips());
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let mut config = config(dir.path(), ErrorPolicy::FailFast);
    config.expected_id = Some("987654321".to_string());

    let report = run_session(&config, session, &decryptor(&["right"]))
        .await
        .unwrap();

    assert_eq!(report.messages, 2);
    assert_eq!(report.attachments_saved, 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_malformed_multipart_is_fatal() {
    let broken = [
        "Content-Type: multipart/mixed; boundary=b\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: application/pdf\r\n",
        "Content-Disposition: attachment; filename=123456789_2024_03.pdf\r\n",
        "\r\n",
        "never closed\r\n",
    ]
    .concat();
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&script(
        " 1",
        &[fetch_response(1, "broken", broken.as_bytes())],
    ));
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let err = run_session(
        &config(dir.path(), ErrorPolicy::Continue),
        session,
        &decryptor(&["right"]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Mime(_)));
    assert!(sent_text(&sent).ends_with("A0004 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_rejected_login_still_logs_out() {
    let script = [
        GREETING,
        b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n",
        b"* BYE\r\n",
        b"A0001 OK LOGOUT completed\r\n",
    ]
    .concat();
    let dir = tempfile::tempdir().unwrap();
    let (stream, sent) = MockStream::new(&script);
    let session = MailboxSession::from_stream(stream).await.unwrap();

    let err = run_session(
        &config(dir.path(), ErrorPolicy::FailFast),
        session,
        &decryptor(&["right"]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert!(err.to_string().contains("Invalid credentials"));
    assert_eq!(
        sent_text(&sent),
        "A0000 LOGIN me@example.com secret\r\nA0001 LOGOUT\r\n"
    );
}

#[tokio::test]
async fn test_session_rejects_out_of_order_calls() {
    let (stream, _sent) = MockStream::new(GREETING);
    let mut session = MailboxSession::from_stream(stream).await.unwrap();

    let err = session
        .search(&payslips_core::SearchCriteria::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Search(_)));

    let seq = payslips_imap::SeqNum::new(1).unwrap();
    let err = session.fetch_and_stream(&[seq]).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));

    let err = session.select_mailbox("Inbox", true).await.unwrap_err();
    assert!(matches!(err, Error::Select { ref mailbox, .. } if mailbox == "Inbox"));
    // The failed calls leave the session where it was
    let err = session.select_mailbox("Inbox", true).await.unwrap_err();
    assert!(err.to_string().contains("in the not authenticated state"));
}
