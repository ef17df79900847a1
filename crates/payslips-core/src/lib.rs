//! # payslips-core
//!
//! Retrieval of password-protected payslip PDFs from a mailbox.
//!
//! This crate provides:
//! - Run configuration and validation
//! - Translation of the message filter into an IMAP search
//! - A mailbox session that logs in, searches and streams messages
//! - Attachment selection by content type and filename pattern
//! - Saving to `{output}/{id}/{yyyy}/{mm}.pdf`
//! - In-place decryption, trying candidate passwords in order
//! - The orchestrator tying it together ([`run`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod decrypt;
mod error;
pub mod filter;
pub mod run;
pub mod search;
pub mod session;
pub mod sink;

pub use config::{
    Config, DEFAULT_BODY_FILTER, DEFAULT_INBOX, ErrorPolicy, FilterConfig, ServerAddress,
    ValidationError,
};
pub use decrypt::{Decrypt, DecryptionOutcome, PasswordRetryDecryptor, QpdfDecryptor};
pub use error::{DecryptError, Error, Result};
pub use filter::{AttachmentFilter, Verdict, is_allowed_content_type, matches_filename_pattern};
pub use run::{RunReport, run, run_session};
pub use search::SearchCriteria;
pub use session::{FetchedMail, MailboxSession, MessageStream};
pub use sink::AttachmentSink;
