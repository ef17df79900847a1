//! # payslips-imap
//!
//! A small async IMAP client (RFC 9051 / RFC 3501) for reading a mailbox:
//! log in, open a folder read-only, search it and stream the matching
//! messages back one at a time.
//!
//! ## Features
//!
//! - **Type-state connection management**: `NotAuthenticated` → `Authenticated`
//!   → `Selected`, checked at compile time. A failed transition hands the
//!   client back in its previous state so it can still log out.
//! - **Literals**: non-ASCII search strings and credentials are sent as
//!   synchronizing literals, or `{n+}` when the server announces `LITERAL+`.
//! - **Streaming FETCH**: [`FetchStream`] parses one `FETCH` response at a
//!   time instead of buffering the whole batch.
//! - **TLS via rustls**: implicit TLS with the webpki root store.
//! - **Sans-I/O parser**: protocol parsing separated from network I/O.
//!
//! ## Quick Start
//!
//! ```ignore
//! use payslips_imap::{Client, FetchAttribute, SearchKey, SequenceSet};
//!
//! #[tokio::main]
//! async fn main() -> payslips_imap::Result<()> {
//!     let stream = payslips_imap::connection::connect_tls("imap.example.com", 993).await?;
//!     let client = Client::from_stream(stream).await?;
//!
//!     let client = client.login("user@example.com", "password").await.map_err(|e| e.error)?;
//!     let (mut client, status) = client.examine("INBOX").await.map_err(|e| e.error)?;
//!     println!("Messages: {}", status.exists);
//!
//!     let hits = client.search(&SearchKey::Body("invoice".into())).await?;
//!     if let Some(set) = SequenceSet::from_seq_nums(&hits) {
//!         let mut stream = client
//!             .fetch_stream(&set, vec![FetchAttribute::Envelope, FetchAttribute::body_peek()])
//!             .await?;
//!         while let Some(message) = stream.next_message().await? {
//!             println!("{:?}", message.envelope().and_then(|env| env.subject.as_deref()));
//!         }
//!     }
//!
//!     client.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── select()/examine() ───→ Selected
//! └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and serialization
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Sans-I/O response parser
//! - [`types`]: Core IMAP types (flags, sequences, response codes)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod stream_fetch;
pub mod types;

pub use command::{Command, FetchAttribute, LiteralMode, SearchKey, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, ImapStream, MailboxStatus, NotAuthenticated,
    ResponseAccumulator, Selected, Transition,
};
pub use error::{Error, Result};
pub use parser::{Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
pub use stream_fetch::{FetchStream, FetchedMessage};
pub use types::{
    Capability, Flag, Flags, ResponseCode, SeqNum, SequenceSet, Status, Tag, Uid, UidValidity,
};

/// Default port for IMAP over implicit TLS.
pub const DEFAULT_TLS_PORT: u16 = 993;
