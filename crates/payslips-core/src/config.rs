//! Run configuration.
//!
//! A [`Config`] is built once (by the binary, from the environment) and
//! passed by reference to [`crate::run`]. Nothing in it changes during a run.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use payslips_imap::DEFAULT_TLS_PORT;

use crate::error::{Error, Result};
use crate::search::SearchCriteria;

/// Body text searched for when no other filter is configured ("payslip").
pub const DEFAULT_BODY_FILTER: &str = "תלוש משכורת";

/// Mailbox opened when none is configured.
pub const DEFAULT_INBOX: &str = "Inbox";

/// IMAP server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Server hostname.
    pub host: String,
    /// Server port (implicit TLS).
    pub port: u16,
}

impl ServerAddress {
    /// Creates an address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    /// Parses `host:port`, or a bare host on the default TLS port.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid port in address {s:?}")))?;
                (host, port)
            }
            None => (s, DEFAULT_TLS_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config(format!("missing host in address {s:?}")));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which messages to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Mailbox to open.
    pub inbox: String,
    /// Required subject substring.
    pub subject: Option<String>,
    /// Required sender substring.
    pub from: Option<String>,
    /// Body substrings; a message must contain at least one.
    pub body: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            inbox: DEFAULT_INBOX.to_string(),
            subject: None,
            from: None,
            body: vec![DEFAULT_BODY_FILTER.to_string()],
        }
    }
}

/// What to do when one attachment cannot be saved or decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the run.
    #[default]
    FailFast,
    /// Log, count and go on with the next attachment.
    Continue,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail-fast"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// Everything a run needs.
#[derive(Clone)]
pub struct Config {
    /// IMAP server.
    pub server: ServerAddress,
    /// Login name.
    pub identity: String,
    /// Login password.
    pub secret: String,
    /// Candidate PDF passwords, tried in order.
    pub pdf_passwords: Vec<String>,
    /// If set, only files for this 9-digit id are handled.
    pub expected_id: Option<String>,
    /// Root of the `{id}/{yyyy}/{mm}.pdf` tree.
    pub output_dir: PathBuf,
    /// Message selection.
    pub filter: FilterConfig,
    /// Decryption tool (qpdf).
    pub decrypt_tool: PathBuf,
    /// Per-attachment failure handling.
    pub error_policy: ErrorPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("pdf_passwords", &format_args!("<{} redacted>", self.pdf_passwords.len()))
            .field("expected_id", &self.expected_id)
            .field("output_dir", &self.output_dir)
            .field("filter", &self.filter)
            .field("decrypt_tool", &self.decrypt_tool)
            .field("error_policy", &self.error_policy)
            .finish()
    }
}

impl Config {
    /// Creates a configuration with defaults for everything but the
    /// credentials and passwords.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        secret: impl Into<String>,
        pdf_passwords: Vec<String>,
    ) -> Self {
        Self {
            server: ServerAddress::new("imap.gmail.com", DEFAULT_TLS_PORT),
            identity: identity.into(),
            secret: secret.into(),
            pdf_passwords,
            expected_id: None,
            output_dir: PathBuf::from("/tmp/output"),
            filter: FilterConfig::default(),
            decrypt_tool: PathBuf::from("qpdf"),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// The search this configuration asks for.
    #[must_use]
    pub fn search_criteria(&self) -> SearchCriteria {
        SearchCriteria::from_filter(&self.filter)
    }

    /// Checks the configuration before anything touches the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<&str> = errors.iter().map(ValidationError::message).collect();
        Err(Error::Config(messages.join("; ")))
    }

    /// Returns all validation problems, empty if the configuration is usable.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost);
        }
        if self.server.port == 0 {
            errors.push(ValidationError::InvalidPort);
        }
        if self.identity.trim().is_empty() {
            errors.push(ValidationError::EmptyIdentity);
        }
        if self.pdf_passwords.is_empty() {
            errors.push(ValidationError::NoPdfPasswords);
        }
        if self.filter.inbox.trim().is_empty() {
            errors.push(ValidationError::EmptyInbox);
        }
        if let Some(id) = &self.expected_id
            && (id.len() != 9 || !id.bytes().all(|b| b.is_ascii_digit()))
        {
            errors.push(ValidationError::InvalidExpectedId);
        }

        errors
    }
}

/// Validation error for a run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// IMAP host is empty.
    EmptyHost,
    /// IMAP port is 0.
    InvalidPort,
    /// Login name is empty.
    EmptyIdentity,
    /// No PDF password to try.
    NoPdfPasswords,
    /// Mailbox name is empty.
    EmptyInbox,
    /// Expected id is not 9 digits.
    InvalidExpectedId,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "IMAP server is required",
            Self::InvalidPort => "IMAP port must be 1-65535",
            Self::EmptyIdentity => "Email address is required",
            Self::NoPdfPasswords => "At least one PDF password is required",
            Self::EmptyInbox => "Mailbox name is required",
            Self::InvalidExpectedId => "ID must be exactly 9 digits",
        }
    }

    /// Get the environment variable this error relates to.
    #[must_use]
    pub const fn variable(&self) -> &'static str {
        match self {
            Self::EmptyHost | Self::InvalidPort => "IMAP_ADDR",
            Self::EmptyIdentity => "EMAIL",
            Self::NoPdfPasswords => "PDF_PASSWORDS",
            Self::EmptyInbox => "FILTER_INBOX",
            Self::InvalidExpectedId => "ID",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.variable())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config::new("me@example.com", "secret", vec!["pw".to_string()])
    }

    #[test]
    fn test_server_address_parse() {
        let addr: ServerAddress = "imap.gmail.com:993".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("imap.gmail.com", 993));
        assert_eq!(addr.to_string(), "imap.gmail.com:993");
    }

    #[test]
    fn test_server_address_default_port() {
        let addr: ServerAddress = "mail.example.org".parse().unwrap();
        assert_eq!(addr.port, 993);
    }

    #[test]
    fn test_server_address_invalid() {
        assert!("host:notaport".parse::<ServerAddress>().is_err());
        assert!(":993".parse::<ServerAddress>().is_err());
        assert!("host:70000".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_error_policy_default_and_display() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::FailFast);
        assert_eq!(ErrorPolicy::Continue.to_string(), "continue");
    }

    #[test]
    fn test_filter_defaults() {
        let filter = FilterConfig::default();
        assert_eq!(filter.inbox, "Inbox");
        assert_eq!(filter.body, vec!["תלוש משכורת".to_string()]);
        assert!(filter.subject.is_none());
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = valid();
        config.identity = "  ".to_string();
        config.pdf_passwords.clear();
        config.filter.inbox = String::new();

        assert_eq!(
            config.validation_errors(),
            vec![
                ValidationError::EmptyIdentity,
                ValidationError::NoPdfPasswords,
                ValidationError::EmptyInbox,
            ]
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("PDF password")));
    }

    #[test]
    fn test_validate_expected_id() {
        let mut config = valid();
        config.expected_id = Some("123456789".to_string());
        assert!(config.validate().is_ok());

        config.expected_id = Some("12345".to_string());
        assert_eq!(
            config.validation_errors(),
            vec![ValidationError::InvalidExpectedId]
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = valid();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("\"pw\""));
        assert!(debug.contains("<redacted>"));
    }
}
