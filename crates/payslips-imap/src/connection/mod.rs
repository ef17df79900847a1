//! IMAP connection management.
//!
//! - TLS stream over TCP
//! - Framed I/O for IMAP protocol
//! - Type-state connection wrapper

mod client;
mod framed;
mod stream;

pub use client::{
    Authenticated, Client, MailboxStatus, NotAuthenticated, Selected, Transition,
};
pub(crate) use client::status_to_result;
pub use framed::{FramedStream, ResponseAccumulator};
pub use stream::{ImapStream, connect_tls, create_tls_connector};
