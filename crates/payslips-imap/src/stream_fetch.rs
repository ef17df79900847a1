//! Streaming FETCH.
//!
//! [`FetchStream`] reads the responses to one FETCH command and yields each
//! `* n FETCH (...)` as soon as it is parsed, so only one message is held in
//! memory at a time.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Client, Selected, status_to_result};
use crate::parser::{Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::SeqNum;
use crate::{Error, Result};

/// Responses to an in-flight FETCH command.
pub struct FetchStream<'a, S> {
    client: &'a mut Client<S, Selected>,
    tag: String,
    complete: bool,
}

impl<'a, S> FetchStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) const fn new(client: &'a mut Client<S, Selected>, tag: String) -> Self {
        Self {
            client,
            tag,
            complete: false,
        }
    }

    /// Returns the next fetched message, or `None` once the command completed.
    ///
    /// A `NO`/`BAD` completion is returned as an error after all messages
    /// before it were yielded.
    ///
    /// # Errors
    ///
    /// I/O and parse errors, the server's rejection of the FETCH, or `BYE`.
    pub async fn next_message(&mut self) -> Result<Option<FetchedMessage>> {
        while !self.complete {
            let response = self.client.stream.read_response().await?;

            match ResponseParser::parse(&response)? {
                Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                    return Ok(Some(FetchedMessage::new(seq, items)));
                }
                Response::Tagged {
                    tag, status, text, ..
                } if tag.as_str() == self.tag => {
                    self.complete = true;
                    status_to_result(status, text)?;
                }
                Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                    self.complete = true;
                    return Err(Error::Bye(text));
                }
                other => tracing::trace!(response = ?other, "ignoring response during FETCH"),
            }
        }

        Ok(None)
    }
}

/// One message from a FETCH response.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Sequence number.
    pub seq: SeqNum,
    /// Raw fetch items.
    pub items: Vec<FetchItem>,
}

impl FetchedMessage {
    /// Creates a message from parsed FETCH items.
    #[must_use]
    pub const fn new(seq: SeqNum, items: Vec<FetchItem>) -> Self {
        Self { seq, items }
    }

    /// Returns the envelope if it was fetched.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Envelope(env) => Some(env.as_ref()),
            _ => None,
        })
    }

    /// Takes the full message body out of the message.
    #[must_use]
    pub fn into_body(self) -> Option<Vec<u8>> {
        self.items.into_iter().find_map(|item| match item {
            FetchItem::Body {
                section: None,
                data,
                ..
            } => data,
            _ => None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(raw: &[u8]) -> FetchedMessage {
        match ResponseParser::parse(raw).unwrap() {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                FetchedMessage::new(seq, items)
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_and_body() {
        let msg = message(
            b"* 3 FETCH (UID 41 FLAGS (\\Seen) ENVELOPE (NIL \"Payslip\" ((NIL NIL \"hr\" \"corp.example\")) NIL NIL NIL NIL NIL NIL NIL) BODY[] {4}\r\nbody)\r\n",
        );

        assert_eq!(msg.seq.get(), 3);
        let envelope = msg.envelope().unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Payslip"));
        assert_eq!(envelope.from[0].host.as_deref(), Some("corp.example"));
        assert_eq!(msg.into_body().unwrap(), b"body");
    }

    #[test]
    fn test_partial_section_is_not_the_body() {
        let msg = message(b"* 1 FETCH (BODY[TEXT] {2}\r\nhi)\r\n");
        assert!(msg.envelope().is_none());
        assert!(msg.into_body().is_none());
    }
}
