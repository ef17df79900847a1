//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, Selected};
use super::{Client, Transition};
use crate::Result;
use crate::command::Command;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{ResponseCode, SeqNum, Uid, UidValidity};

/// What the server reported while opening a mailbox.
///
/// `FLAGS` and `PERMANENTFLAGS` are not kept; messages are only read.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Messages in the mailbox (`EXISTS`).
    pub exists: u32,
    /// Messages with `\Recent` set.
    pub recent: u32,
    /// First unseen message, if announced.
    pub unseen: Option<SeqNum>,
    /// Predicted UID of the next message.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY of the mailbox.
    pub uid_validity: Option<UidValidity>,
    /// Opened with EXAMINE or reported `[READ-ONLY]`.
    pub read_only: bool,
}

/// Result of SELECT or EXAMINE.
type Opened<S> =
    std::result::Result<(Client<S, Selected>, MailboxStatus), Transition<S, Authenticated>>;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    pub async fn select(self, mailbox: &str) -> Opened<S> {
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        self.open(command, false).await
    }

    /// Examines a mailbox for read-only access.
    pub async fn examine(self, mailbox: &str) -> Opened<S> {
        let command = Command::Examine {
            mailbox: mailbox.to_string(),
        };
        self.open(command, true).await
    }

    async fn open(mut self, command: Command, read_only: bool) -> Opened<S> {
        match self.run_open(&command, read_only).await {
            Ok(status) => Ok((self.into_state(), status)),
            Err(error) => Err(Transition {
                error,
                client: self,
            }),
        }
    }

    async fn run_open(&mut self, command: &Command, read_only: bool) -> Result<MailboxStatus> {
        let tag = self.send_command(command).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        let mut status = parse_mailbox_status(&responses);
        status.read_only |= read_only;
        Ok(status)
    }
}

/// Parses mailbox status from SELECT/EXAMINE responses.
fn parse_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response_bytes in responses {
        let code = match ResponseParser::parse(response_bytes) {
            Ok(Response::Untagged(UntaggedResponse::Exists(n))) => {
                status.exists = n;
                continue;
            }
            Ok(Response::Untagged(UntaggedResponse::Recent(n))) => {
                status.recent = n;
                continue;
            }
            Ok(
                Response::Untagged(UntaggedResponse::Ok {
                    code: Some(code), ..
                })
                | Response::Tagged {
                    code: Some(code), ..
                },
            ) => code,
            _ => continue,
        };

        match code {
            ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
            ResponseCode::UidNext(v) => status.uid_next = Some(v),
            ResponseCode::Unseen(v) => status.unseen = Some(v),
            ResponseCode::ReadOnly => status.read_only = true,
            ResponseCode::ReadWrite => status.read_only = false,
            _ => {}
        }
    }

    status
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mailbox_status() {
        let responses: Vec<Vec<u8>> = vec![
            b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n".to_vec(),
            b"* OK [PERMANENTFLAGS ()] Flags permitted.\r\n".to_vec(),
            b"* OK [UIDVALIDITY 3857529045] UIDs valid.\r\n".to_vec(),
            b"* 172 EXISTS\r\n".to_vec(),
            b"* 1 RECENT\r\n".to_vec(),
            b"* OK [UNSEEN 12] Message 12 is first unseen\r\n".to_vec(),
            b"* OK [UIDNEXT 4392] Predicted next UID.\r\n".to_vec(),
            b"A0003 OK [READ-ONLY] EXAMINE completed\r\n".to_vec(),
        ];

        let status = parse_mailbox_status(&responses);

        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.unseen.unwrap().get(), 12);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert_eq!(status.uid_validity.unwrap().get(), 3_857_529_045);
        assert!(status.read_only);
    }
}
