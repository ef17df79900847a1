//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, Transition};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting. A `BYE` greeting is an error. When the
    /// greeting carries no `[CAPABILITY ...]` code, CAPABILITY is issued so
    /// the literal mode is known before any command with a literal is sent.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let response = ResponseParser::parse(&greeting)?;

        let mut capabilities = None;
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                tracing::debug!(greeting = %text, "server greeting");
                if let Some(ResponseCode::Capability(caps)) = code {
                    capabilities = Some(caps);
                }
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            Response::Untagged(UntaggedResponse::PreAuth { .. }) => {
                return Err(Error::InvalidState(
                    "server greeted with PREAUTH; LOGIN is not possible".to_string(),
                ));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        let mut client = Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities: capabilities.clone().unwrap_or_default(),
            _state: PhantomData,
        };

        if capabilities.is_none() {
            client.capability().await?;
        }

        Ok(client)
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// On success returns the authenticated client. On failure the client is
    /// handed back, still not authenticated, inside the [`Transition`].
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> std::result::Result<Client<S, Authenticated>, Transition<S, NotAuthenticated>> {
        match self.run_login(username, password).await {
            Ok(()) => Ok(self.into_state()),
            Err(error) => Err(Transition {
                error,
                client: self,
            }),
        }
    }

    async fn run_login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::InvalidState(
                "server advertises LOGINDISABLED".to_string(),
            ));
        }

        let tag = self
            .send_command(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        // Servers commonly announce a different set once authenticated
        self.update_capabilities(&responses);
        Ok(())
    }
}
