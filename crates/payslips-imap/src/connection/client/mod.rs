//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time.
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: Initial state after connection
//! - `Authenticated`: After successful LOGIN
//! - `Selected`: After successful SELECT/EXAMINE
//!
//! Each state only exposes methods that are valid for that state. LOGOUT is
//! valid everywhere.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::fmt;
use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::authenticated::MailboxStatus;
pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, LiteralMode, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection with type-state.
///
/// The type parameter `State` tracks the connection state at compile time.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    _state: PhantomData<State>,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State> fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// A state transition the server refused.
///
/// Hands the client back in its previous state, so the caller can still
/// issue LOGOUT on the same connection.
pub struct Transition<S, State> {
    /// Why the transition failed.
    pub error: Error,
    /// The client, unchanged.
    pub client: Client<S, State>,
}

impl<S, State> fmt::Debug for Transition<S, State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S, State> fmt::Display for Transition<S, State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<S, State> std::error::Error for Transition<S, State> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<S, State> From<Transition<S, State>> for Error {
    fn from(transition: Transition<S, State>) -> Self {
        transition.error
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Returns how literals are sent to this server (RFC 7888).
    #[must_use]
    pub fn literal_mode(&self) -> LiteralMode {
        if self.has_capability(&Capability::LiteralPlus) {
            LiteralMode::NonSynchronizing
        } else if self.has_capability(&Capability::LiteralMinus) {
            LiteralMode::NonSynchronizingSmall
        } else {
            LiteralMode::Synchronizing
        }
    }

    /// Sends a CAPABILITY command and updates the stored capabilities.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let tag = self.send_command(&Command::Capability).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        self.update_capabilities(&responses);
        Ok(self.capabilities.clone())
    }

    /// Gracefully disconnects from the server.
    ///
    /// Responses still pending from an abandoned command (for example a
    /// FETCH that was not read to the end) are discarded. Errors are logged
    /// and otherwise ignored: the connection is going away either way.
    pub async fn logout(mut self) {
        let result = match self.send_command(&Command::Logout).await {
            Ok(tag) => {
                ResponseAccumulator::new(tag)
                    .drain_until_tagged(&mut self.stream)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => tracing::debug!("logged out"),
            Err(e) => tracing::debug!(error = %e, "LOGOUT did not complete cleanly"),
        }
    }

    /// Sends a command, waiting for `+` continuations between literal parts.
    ///
    /// Returns the tag the command was sent with.
    pub(crate) async fn send_command(&mut self, command: &Command) -> Result<String> {
        let tag = self.tag_gen.next();
        let bytes = command.serialize(&tag, self.literal_mode());
        tracing::debug!(tag, command = command.name(), "sending command");

        let parts = bytes.parts();
        for (i, part) in parts.iter().enumerate() {
            self.stream.write_command(part).await?;
            if i + 1 < parts.len() {
                self.wait_for_continuation(&tag).await?;
            }
        }

        Ok(tag)
    }

    /// Waits for the server to accept a synchronizing literal.
    async fn wait_for_continuation(&mut self, tag: &str) -> Result<()> {
        loop {
            let response = self.stream.read_response().await?;
            match ResponseParser::parse(&response)? {
                Response::Continuation { .. } => return Ok(()),
                Response::Tagged {
                    tag: resp_tag,
                    status,
                    text,
                    ..
                } if resp_tag.as_str() == tag => {
                    status_to_result(status, text)?;
                    return Err(Error::Protocol(
                        "command completed before literal was sent".to_string(),
                    ));
                }
                Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                    return Err(Error::Bye(text));
                }
                _ => {}
            }
        }
    }

    /// Reads responses until we get a tagged response matching our tag.
    pub(crate) async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut accumulator = ResponseAccumulator::new(tag);
        accumulator.read_until_tagged(&mut self.stream).await
    }

    /// Picks up capabilities from untagged CAPABILITY data or a
    /// `[CAPABILITY ...]` response code.
    pub(crate) fn update_capabilities(&mut self, responses: &[Vec<u8>]) {
        for response_bytes in responses {
            let caps = match ResponseParser::parse(response_bytes) {
                Ok(
                    Response::Untagged(UntaggedResponse::Capability(caps))
                    | Response::Untagged(UntaggedResponse::Ok {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    })
                    | Response::Tagged {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    },
                ) => caps,
                _ => continue,
            };
            self.capabilities = caps;
        }
    }

    /// Checks that the tagged response is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        for response_bytes in responses.iter().rev() {
            if let Ok(Response::Tagged {
                tag: resp_tag,
                status,
                text,
                ..
            }) = ResponseParser::parse(response_bytes)
                && resp_tag.as_str() == tag
            {
                return status_to_result(status, text);
            }
        }

        Err(Error::Protocol("missing tagged response".to_string()))
    }

    /// Moves the connection into another state.
    pub(crate) fn into_state<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            _state: PhantomData,
        }
    }
}

/// Maps a completion status to a result.
pub(crate) fn status_to_result(status: Status, text: String) -> Result<()> {
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}
