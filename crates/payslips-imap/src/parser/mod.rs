//! IMAP protocol parser.
//!
//! A sans-I/O parser for the server responses this client needs: status
//! responses, capabilities, mailbox data from SELECT/EXAMINE, SEARCH
//! results and FETCH data (flags, UID, size, envelope and body sections).
//!
//! - **Lexer**: Tokenizes raw bytes into IMAP tokens (atoms, strings, numbers, etc.)
//! - **Response Parser**: Builds structured response objects from tokens
//!
//! # Example
//!
//! ```
//! use payslips_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let input = b"* OK IMAP4rev1 server ready\r\n";
//! let response = ResponseParser::parse(input).unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Ok { text, .. }) => {
//!         assert!(text.contains("IMAP4rev1"));
//!     }
//!     _ => panic!("Expected untagged OK"),
//! }
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{Address, Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
