//! # payslips-mime
//!
//! MIME parsing for fetched email, focused on getting attachments out.
//!
//! ## Features
//!
//! - **Attachment walk**: [`Attachments`] visits nested multiparts depth-first
//!   and yields only attachment parts, lazily
//! - **Headers**: folded fields, 8-bit values, RFC 2047 encoded words
//! - **Parameters**: quoted strings and RFC 2231 extended/continued values
//! - **Decoding**: Base64 and Quoted-Printable bodies, charsets via `encoding_rs`
//!
//! ## Quick Start
//!
//! ```ignore
//! use payslips_mime::Attachments;
//!
//! for attachment in Attachments::new(raw_message) {
//!     match attachment {
//!         Ok(attachment) => {
//!             println!("{:?} ({})", attachment.filename, attachment.content_type.mime_type());
//!             let bytes = attachment.body.decode()?;
//!         }
//!         // A part in an unknown charset; the rest of the message is fine
//!         Err(e) if e.is_charset() => continue,
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachments;
mod content_type;
mod error;
mod header;
mod params;
mod part;

pub mod encoding;

pub use attachments::{Attachment, Attachments};
pub use content_type::{ContentDisposition, ContentType, DispositionKind};
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{Part, PartBody, TransferEncoding};
