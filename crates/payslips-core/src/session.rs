//! One IMAP session: log in, open the mailbox, search, stream the hits.
//!
//! [`MailboxSession`] wraps the type-state client from `payslips-imap` in a
//! runtime state so the orchestrator can hold it across fallible steps and
//! still log out from wherever it stopped.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use payslips_imap::connection::connect_tls;
use payslips_imap::{
    Authenticated, Client, Envelope, FetchAttribute, FetchStream, ImapStream, MailboxStatus,
    NotAuthenticated, SeqNum, Selected, SequenceSet, Transition,
};
use payslips_mime::Attachments;
use payslips_mime::encoding::decode_rfc2047;

use crate::config::ServerAddress;
use crate::error::{Error, Result};
use crate::search::SearchCriteria;

enum State<S> {
    NotAuthenticated(Client<S, NotAuthenticated>),
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
    Closed,
}

impl<S> State<S> {
    const fn name(&self) -> &'static str {
        match self {
            Self::NotAuthenticated(_) => "not authenticated",
            Self::Authenticated(_) => "authenticated",
            Self::Selected(_) => "selected",
            Self::Closed => "closed",
        }
    }
}

/// A connection to the mailbox server.
pub struct MailboxSession<S = ImapStream> {
    state: State<S>,
}

impl<S> fmt::Debug for MailboxSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSession")
            .field("state", &self.state.name())
            .finish()
    }
}

impl MailboxSession<ImapStream> {
    /// Opens a TLS connection and reads the server greeting.
    ///
    /// # Errors
    ///
    /// [`Error::Connect`] if the connection, the TLS handshake or the
    /// greeting fails (a `BYE` greeting included).
    pub async fn connect(address: &ServerAddress) -> Result<Self> {
        tracing::info!("Connecting to server...");
        let stream = connect_tls(&address.host, address.port)
            .await
            .map_err(Error::Connect)?;
        let session = Self::from_stream(stream).await?;
        tracing::info!("Connected");
        Ok(session)
    }
}

impl<S> MailboxSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a session on an already connected stream.
    ///
    /// # Errors
    ///
    /// [`Error::Connect`] if the greeting is missing or rejects us.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let client = Client::from_stream(stream).await.map_err(Error::Connect)?;
        Ok(Self {
            state: State::NotAuthenticated(client),
        })
    }

    /// Logs in with `LOGIN`.
    ///
    /// On failure the session stays not authenticated and can only be
    /// logged out (or asked to log in again).
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] if the server rejects the credentials, the connection
    /// fails, or the session is already authenticated.
    pub async fn authenticate(&mut self, identity: &str, secret: &str) -> Result<()> {
        let client = match std::mem::replace(&mut self.state, State::Closed) {
            State::NotAuthenticated(client) => client,
            other => {
                let error = invalid_state("LOGIN", &other);
                self.state = other;
                return Err(Error::Auth(error));
            }
        };

        match client.login(identity, secret).await {
            Ok(client) => {
                self.state = State::Authenticated(client);
                Ok(())
            }
            Err(Transition { error, client }) => {
                self.state = State::NotAuthenticated(client);
                Err(Error::Auth(error))
            }
        }
    }

    /// Opens `name` with `EXAMINE` when `read_only`, `SELECT` otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::Select`] if the server refuses, or the session is not
    /// authenticated (or already has a mailbox open).
    pub async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus> {
        let client = match std::mem::replace(&mut self.state, State::Closed) {
            State::Authenticated(client) => client,
            other => {
                let source = invalid_state("SELECT", &other);
                self.state = other;
                return Err(Error::Select {
                    mailbox: name.to_string(),
                    source,
                });
            }
        };

        let opened = if read_only {
            client.examine(name).await
        } else {
            client.select(name).await
        };

        match opened {
            Ok((client, status)) => {
                tracing::debug!(
                    mailbox = name,
                    exists = status.exists,
                    read_only = status.read_only,
                    "mailbox opened"
                );
                self.state = State::Selected(client);
                Ok(status)
            }
            Err(Transition { error, client }) => {
                self.state = State::Authenticated(client);
                Err(Error::Select {
                    mailbox: name.to_string(),
                    source: error,
                })
            }
        }
    }

    /// Runs `SEARCH` in the open mailbox.
    ///
    /// # Errors
    ///
    /// [`Error::Search`] if no mailbox is open or the server rejects the
    /// search. An empty result is not an error.
    pub async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<SeqNum>> {
        let State::Selected(client) = &mut self.state else {
            return Err(Error::Search(invalid_state("SEARCH", &self.state)));
        };
        client
            .search(&criteria.to_search_key())
            .await
            .map_err(Error::Search)
    }

    /// Fetches envelope and full body of `refs` as a stream.
    ///
    /// No command is sent for an empty `refs`; the stream is then empty.
    ///
    /// # Errors
    ///
    /// [`Error::Fetch`] if no mailbox is open or the command cannot be sent.
    pub async fn fetch_and_stream(&mut self, refs: &[SeqNum]) -> Result<MessageStream<'_, S>> {
        let client = match &mut self.state {
            State::Selected(client) => client,
            other => return Err(Error::Fetch(invalid_state("FETCH", other))),
        };
        let Some(set) = SequenceSet::from_seq_nums(refs) else {
            return Ok(MessageStream { inner: None });
        };

        let inner = client
            .fetch_stream(
                &set,
                vec![FetchAttribute::Envelope, FetchAttribute::body_peek()],
            )
            .await
            .map_err(Error::Fetch)?;
        Ok(MessageStream { inner: Some(inner) })
    }

    /// Ends the session with `LOGOUT`, whatever state it is in.
    ///
    /// Responses left over from an unfinished fetch are discarded. Errors
    /// are not reported.
    pub async fn logout(self) {
        match self.state {
            State::NotAuthenticated(client) => client.logout().await,
            State::Authenticated(client) => client.logout().await,
            State::Selected(client) => client.logout().await,
            State::Closed => {}
        }
    }
}

fn invalid_state<S>(command: &str, state: &State<S>) -> payslips_imap::Error {
    payslips_imap::Error::InvalidState(format!(
        "{command} is not allowed in the {} state",
        state.name()
    ))
}

/// Messages of one FETCH, read as they arrive.
pub struct MessageStream<'a, S> {
    inner: Option<FetchStream<'a, S>>,
}

impl<S> fmt::Debug for MessageStream<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("active", &self.inner.is_some())
            .finish()
    }
}

impl<S> MessageStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the next message, or `None` when the FETCH is complete.
    ///
    /// FETCH responses without a body (unsolicited flag updates, for
    /// example) are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Fetch`] on I/O or parse errors, or if the server fails the
    /// FETCH.
    pub async fn next_mail(&mut self) -> Result<Option<FetchedMail>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };

        while let Some(message) = inner.next_message().await.map_err(Error::Fetch)? {
            let seq = message.seq;
            let envelope = message.envelope().cloned();
            match message.into_body() {
                Some(body) => {
                    return Ok(Some(FetchedMail {
                        seq,
                        envelope,
                        body,
                    }));
                }
                None => tracing::debug!(seq = seq.get(), "skipping FETCH response without a body"),
            }
        }

        Ok(None)
    }
}

/// One fetched message.
#[derive(Debug, Clone)]
pub struct FetchedMail {
    /// Sequence number in the open mailbox.
    pub seq: SeqNum,
    /// Envelope, if the server sent one.
    pub envelope: Option<Envelope>,
    /// Raw RFC 5322 message.
    pub body: Vec<u8>,
}

impl FetchedMail {
    /// Returns the subject with encoded words decoded.
    ///
    /// An undecodable subject is returned as sent.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        let raw = self.envelope.as_ref()?.subject.as_deref()?;
        Some(decode_rfc2047(raw).unwrap_or_else(|_| raw.to_string()))
    }

    /// Walks the attachments of the message.
    #[must_use]
    pub fn attachments(&self) -> Attachments<'_> {
        Attachments::new(&self.body)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn fetched(subject: Option<&str>, body: &[u8]) -> FetchedMail {
        FetchedMail {
            seq: SeqNum::new(1).unwrap(),
            envelope: Some(Envelope {
                subject: subject.map(str::to_string),
                ..Envelope::default()
            }),
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_subject_decodes_encoded_words() {
        let mail = fetched(Some("=?UTF-8?B?16rXnNeV16k=?= 01/2024"), b"");
        assert_eq!(mail.subject().unwrap(), "תלוש 01/2024");
    }

    #[test]
    fn test_subject_falls_back_to_raw() {
        let mail = fetched(Some("=?x-unknown?Q?abc?= tail"), b"");
        assert_eq!(mail.subject().unwrap(), "=?x-unknown?Q?abc?= tail");
        assert!(fetched(None, b"").subject().is_none());
    }

    #[test]
    fn test_attachments_walk_body() {
        let body = b"Content-Type: application/pdf; name=\"123456789_2024_01.pdf\"\r\n\
                     Content-Transfer-Encoding: base64\r\n\
                     \r\n\
                     JVBERg==\r\n";
        let mail = fetched(None, body);
        let attachments: Vec<_> = mail
            .attachments()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(
            attachments[0].filename.as_deref(),
            Some("123456789_2024_01.pdf")
        );
    }
}
