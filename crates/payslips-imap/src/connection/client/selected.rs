//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, FetchAttribute, SearchKey};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::stream_fetch::FetchStream;
use crate::types::{SeqNum, SequenceSet};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Searches the selected mailbox.
    ///
    /// Returns matching sequence numbers in server order; an empty result is
    /// not an error.
    pub async fn search(&mut self, key: &SearchKey) -> Result<Vec<SeqNum>> {
        let tag = self
            .send_command(&Command::Search { key: key.clone() })
            .await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        let mut results = Vec::new();
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Search(ids))) =
                ResponseParser::parse(response_bytes)
            {
                results.extend(ids);
            }
        }

        tracing::debug!(hits = results.len(), "SEARCH completed");
        Ok(results)
    }

    /// Starts a FETCH and returns a stream over its responses.
    ///
    /// Messages are parsed one at a time as they arrive. Dropping the
    /// stream early leaves the rest of the responses on the wire; they are
    /// discarded by [`Client::logout`].
    pub async fn fetch_stream(
        &mut self,
        sequence: &SequenceSet,
        items: Vec<FetchAttribute>,
    ) -> Result<FetchStream<'_, S>> {
        let tag = self
            .send_command(&Command::Fetch {
                sequence: sequence.clone(),
                items,
            })
            .await?;

        Ok(FetchStream::new(self, tag))
    }
}
