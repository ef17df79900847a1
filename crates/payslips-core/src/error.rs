//! Error types for the core library.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur while fetching and storing payslips.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP/TLS connection or greeting failed.
    #[error("Connection failed: {0}")]
    Connect(#[source] payslips_imap::Error),

    /// LOGIN was rejected or could not be sent.
    #[error("Authentication failed: {0}")]
    Auth(#[source] payslips_imap::Error),

    /// SELECT/EXAMINE failed.
    #[error("Failed to open mailbox {mailbox:?}: {source}")]
    Select {
        /// Mailbox name as configured.
        mailbox: String,
        /// Underlying IMAP error.
        #[source]
        source: payslips_imap::Error,
    },

    /// SEARCH failed.
    #[error("Search failed: {0}")]
    Search(#[source] payslips_imap::Error),

    /// FETCH failed or the connection broke while streaming.
    #[error("Fetch failed: {0}")]
    Fetch(#[source] payslips_imap::Error),

    /// A fetched message could not be parsed.
    #[error("MIME error: {0}")]
    Mime(#[from] payslips_mime::Error),

    /// Writing an attachment to disk failed.
    #[error("Failed to save {}: {source}", .path.display())]
    Save {
        /// Destination (or intended destination) of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Decrypting a saved attachment failed.
    #[error("Failed to decrypt {}: {source}", .path.display())]
    Decrypt {
        /// The saved (still encrypted) file.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: DecryptError,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for failures that concern one attachment only.
    ///
    /// Only these may be skipped under [`crate::ErrorPolicy::Continue`].
    #[must_use]
    pub const fn is_per_attachment(&self) -> bool {
        matches!(self, Self::Save { .. } | Self::Decrypt { .. })
    }
}

/// Errors from decrypting one file.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Every candidate password was rejected.
    #[error("no candidate password matched ({attempts} tried)")]
    Exhausted {
        /// Number of passwords tried.
        attempts: usize,
    },

    /// The decryption tool failed for a reason other than a wrong password.
    #[error("decryption tool failed with {status}: {output}")]
    Tool {
        /// Exit status of the tool.
        status: ExitStatus,
        /// Combined stdout and stderr.
        output: String,
    },

    /// The decryption tool could not be started.
    #[error("failed to run {}: {source}", .tool.display())]
    Spawn {
        /// Tool that was invoked.
        tool: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The decrypted output could not replace the original file.
    #[error("failed to replace the original with the decrypted file: {0}")]
    Replace(#[source] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
