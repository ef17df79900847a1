//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream that replays a scripted server transcript
//! and records everything the client sends.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use payslips_imap::{
    Capability, Client, Error, FetchAttribute, SearchKey, SeqNum, SequenceSet,
};

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
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

fn seqs(values: &[u32]) -> Vec<SeqNum> {
    values.iter().map(|&n| SeqNum::new(n).unwrap()).collect()
}

#[tokio::test]
async fn test_search_and_fetch_session() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Server ready\r\n"[..],
        b"A0000 OK [CAPABILITY IMAP4rev1 UTF8=ACCEPT] user@example.com authenticated\r\n",
        b"* FLAGS (\\Answered \\Flagged \\Draft \\Deleted \\Seen)\r\n",
        b"* OK [PERMANENTFLAGS ()] Flags permitted.\r\n",
        b"* OK [UIDVALIDITY 3] UIDs valid.\r\n",
        b"* 5 EXISTS\r\n",
        b"* 0 RECENT\r\n",
        b"* OK [UIDNEXT 6] Predicted next UID.\r\n",
        b"A0001 OK [READ-ONLY] Inbox selected. (Success)\r\n",
        b"+ go ahead\r\n",
        b"* SEARCH 4 2\r\n",
        b"A0002 OK SEARCH completed (Success)\r\n",
        b"* 2 FETCH (ENVELOPE (NIL \"first\" NIL NIL NIL NIL NIL NIL NIL NIL) BODY[] {5}\r\nhello)\r\n",
        b"* 4 FETCH (ENVELOPE (NIL \"second\" NIL NIL NIL NIL NIL NIL NIL NIL) BODY[] {5}\r\nworld)\r\n",
        b"A0003 OK Success\r\n",
        b"* BYE LOGOUT Requested\r\n",
        b"A0004 OK 73 good day (Success)\r\n",
    ]
    .concat();
    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    assert!(client.has_capability(&Capability::Auth("PLAIN".to_string())));

    let client = client.login("user@example.com", "secret").await.unwrap();
    assert!(client.has_capability(&Capability::Utf8Accept));

    let (mut client, status) = client.examine("Inbox").await.unwrap();
    assert_eq!(status.exists, 5);
    assert_eq!(status.uid_next.unwrap().get(), 6);
    assert!(status.read_only);

    let hits = client
        .search(&SearchKey::Body("תלוש משכורת".into()))
        .await
        .unwrap();
    assert_eq!(hits, seqs(&[4, 2]));

    let set = SequenceSet::from_seq_nums(&hits).unwrap();
    let mut messages = Vec::new();
    {
        let mut stream = client
            .fetch_stream(
                &set,
                vec![FetchAttribute::Envelope, FetchAttribute::body_peek()],
            )
            .await
            .unwrap();
        while let Some(message) = stream.next_message().await.unwrap() {
            messages.push(message);
        }
        assert!(stream.next_message().await.unwrap().is_none());
    }

    assert_eq!(messages.len(), 2);
    let subject = messages[0].envelope().and_then(|env| env.subject.clone());
    assert_eq!(subject.as_deref(), Some("first"));
    assert_eq!(messages.pop().unwrap().into_body().unwrap(), b"world");

    client.logout().await;

    let expected = [
        "A0000 LOGIN user@example.com secret\r\n",
        "A0001 EXAMINE Inbox\r\n",
        "A0002 SEARCH CHARSET UTF-8 BODY {21}\r\n",
        "תלוש משכורת\r\n",
        "A0003 FETCH 2,4 (ENVELOPE BODY.PEEK[])\r\n",
        "A0004 LOGOUT\r\n",
    ]
    .concat();
    assert_eq!(sent_text(&sent), expected);
}

#[tokio::test]
async fn test_literal_plus_skips_continuation() {
    let script = [
        &b"* OK IMAP4rev1 Service Ready\r\n"[..],
        b"* CAPABILITY IMAP4rev1 LITERAL+\r\n",
        b"A0000 OK CAPABILITY completed\r\n",
        b"A0001 OK LOGIN completed\r\n",
        b"A0002 OK LOGOUT completed\r\n",
    ]
    .concat();
    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    assert!(client.has_capability(&Capability::LiteralPlus));

    let client = client.login("user", "pässword").await.unwrap();
    client.logout().await;

    let expected = [
        "A0000 CAPABILITY\r\n",
        "A0001 LOGIN user {9+}\r\npässword\r\n",
        "A0002 LOGOUT\r\n",
    ]
    .concat();
    assert_eq!(sent_text(&sent), expected);
}

#[tokio::test]
async fn test_failed_login_can_still_logout() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n",
        b"* BYE bye\r\n",
        b"A0001 OK LOGOUT completed\r\n",
    ]
    .concat();
    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let failed = client.login("user", "wrong").await.unwrap_err();

    assert!(matches!(failed.error, Error::No(ref text) if text.contains("Invalid credentials")));
    failed.client.logout().await;

    assert!(sent_text(&sent).ends_with("A0001 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_examine_missing_mailbox() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 OK LOGIN completed\r\n",
        b"A0001 NO [NONEXISTENT] Unknown Mailbox: Payroll\r\n",
        b"A0002 OK LOGOUT completed\r\n",
    ]
    .concat();
    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let failed = client.examine("Payroll").await.unwrap_err();

    assert!(matches!(failed.error, Error::No(ref text) if text.contains("Payroll")));
    failed.client.logout().await;
    assert!(sent_text(&sent).ends_with("A0002 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_bye_greeting_is_error() {
    let (stream, _sent) = MockStream::new(b"* BYE Too many connections\r\n");

    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::Bye(ref text) if text == "Too many connections"));
}

#[tokio::test]
async fn test_empty_search() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 OK LOGIN completed\r\n",
        b"* 0 EXISTS\r\n",
        b"A0001 OK [READ-ONLY] EXAMINE completed\r\n",
        b"* SEARCH\r\n",
        b"A0002 OK SEARCH completed\r\n",
    ]
    .concat();
    let (stream, _sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let (mut client, _) = client.examine("Inbox").await.unwrap();

    let hits = client.search(&SearchKey::All).await.unwrap();
    assert!(hits.is_empty());
    assert!(SequenceSet::from_seq_nums(&hits).is_none());
}

#[tokio::test]
async fn test_rejected_literal_reports_server_error() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 OK LOGIN completed\r\n",
        b"A0001 OK EXAMINE completed\r\n",
        b"A0002 NO [BADCHARSET (US-ASCII)] charset not supported\r\n",
    ]
    .concat();
    let (stream, _sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let (mut client, _) = client.examine("Inbox").await.unwrap();

    let err = client
        .search(&SearchKey::Body("שלום".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No(ref text) if text.contains("charset")));
}

#[tokio::test]
async fn test_abandoned_fetch_is_drained_on_logout() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 OK LOGIN completed\r\n",
        b"A0001 OK EXAMINE completed\r\n",
        b"* 1 FETCH (BODY[] {3}\r\none)\r\n",
        b"* 2 FETCH (BODY[] {3}\r\ntwo)\r\n",
        b"A0002 OK FETCH completed\r\n",
        b"* BYE\r\n",
        b"A0003 OK LOGOUT completed\r\n",
    ]
    .concat();
    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let (mut client, _) = client.examine("Inbox").await.unwrap();

    {
        let mut stream = client
            .fetch_stream(&SequenceSet::range(1, 2).unwrap(), vec![FetchAttribute::body_peek()])
            .await
            .unwrap();
        let first = stream.next_message().await.unwrap().unwrap();
        assert_eq!(first.into_body().unwrap(), b"one");
    }

    client.logout().await;
    assert!(sent_text(&sent).ends_with("A0003 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_fetch_rejection_after_messages() {
    let script = [
        &b"* OK [CAPABILITY IMAP4rev1] ready\r\n"[..],
        b"A0000 OK LOGIN completed\r\n",
        b"A0001 OK EXAMINE completed\r\n",
        b"* 1 FETCH (BODY[] {3}\r\none)\r\n",
        b"A0002 NO Some messages could not be FETCHed (Failure)\r\n",
    ]
    .concat();
    let (stream, _sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let (mut client, _) = client.examine("Inbox").await.unwrap();

    let mut stream = client
        .fetch_stream(&SequenceSet::range(1, 2).unwrap(), vec![FetchAttribute::body_peek()])
        .await
        .unwrap();
    assert!(stream.next_message().await.unwrap().is_some());
    assert!(matches!(stream.next_message().await, Err(Error::No(_))));
    assert!(stream.next_message().await.unwrap().is_none());
}
