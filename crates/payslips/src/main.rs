//! `payslips` - fetch password-protected payslip PDFs from a mailbox
//!
//! Searches the mailbox, saves every matching attachment as
//! `{output}/{id}/{yyyy}/{mm}.pdf` and decrypts it in place with qpdf.
//! Everything is configured through environment variables (or the matching
//! flags).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payslips_core::{
    Config, DEFAULT_BODY_FILTER, DEFAULT_INBOX, ErrorPolicy, FilterConfig, RunReport,
};

#[derive(Debug, Parser)]
#[command(
    name = "payslips",
    version,
    about = "Fetch payslip PDFs from an IMAP mailbox and remove their password"
)]
struct Cli {
    /// IMAP server as host:port (port defaults to 993).
    #[arg(long, env = "IMAP_ADDR", default_value = "imap.gmail.com:993")]
    imap_addr: String,

    /// Login name.
    #[arg(long, env = "EMAIL")]
    email: String,

    /// Login password.
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: String,

    /// Candidate PDF passwords, comma-separated, tried in order.
    #[arg(
        long,
        env = "PDF_PASSWORDS",
        value_delimiter = ',',
        required = true,
        hide_env_values = true
    )]
    pdf_passwords: Vec<String>,

    /// Only handle files of this 9-digit id.
    #[arg(long, env = "ID")]
    id: Option<String>,

    /// Root of the `{id}/{yyyy}/{mm}.pdf` tree.
    #[arg(long, env = "OUTPUT_DIR", default_value = "/tmp/output")]
    output_dir: PathBuf,

    /// Mailbox to search.
    #[arg(long, env = "FILTER_INBOX", default_value = DEFAULT_INBOX)]
    filter_inbox: String,

    /// Required subject substring.
    #[arg(long, env = "FILTER_SUBJECT")]
    filter_subject: Option<String>,

    /// Required sender substring.
    #[arg(long, env = "FILTER_FROM")]
    filter_from: Option<String>,

    /// Body substrings, semicolon-separated; any of them may match.
    #[arg(long, env = "FILTER_BODY", value_delimiter = ';', default_value = DEFAULT_BODY_FILTER)]
    filter_body: Vec<String>,

    /// qpdf executable.
    #[arg(long, env = "QPDF_PATH", default_value = "qpdf")]
    qpdf_path: PathBuf,

    /// What to do when one attachment cannot be saved or decrypted.
    #[arg(
        long,
        env = "ON_ERROR",
        value_enum,
        ignore_case = true,
        default_value_t = OnError::FailFast
    )]
    on_error: OnError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OnError {
    /// Abort the run.
    FailFast,
    /// Log the failure and go on with the next attachment.
    Continue,
}

impl From<OnError> for ErrorPolicy {
    fn from(on_error: OnError) -> Self {
        match on_error {
            OnError::FailFast => Self::FailFast,
            OnError::Continue => Self::Continue,
        }
    }
}

impl Cli {
    fn into_config(self) -> payslips_core::Result<Config> {
        let pdf_passwords = self
            .pdf_passwords
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();

        let mut config = Config::new(self.email, self.password, pdf_passwords);
        config.server = self.imap_addr.parse()?;
        config.expected_id = non_empty(self.id);
        config.output_dir = self.output_dir;
        config.filter = FilterConfig {
            inbox: self.filter_inbox,
            subject: non_empty(self.filter_subject),
            from: non_empty(self.filter_from),
            body: self
                .filter_body
                .into_iter()
                .filter(|term| !term.is_empty())
                .collect(),
        };
        config.decrypt_tool = self.qpdf_path;
        config.error_policy = self.on_error.into();
        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn execute(cli: Cli) -> anyhow::Result<RunReport> {
    let config = cli.into_config()?;
    for problem in config.validation_errors() {
        error!("{problem}");
    }
    config.validate()?;

    info!(
        server = %config.server,
        inbox = %config.filter.inbox,
        output = %config.output_dir.display(),
        policy = %config.error_policy,
        "Starting"
    );
    Ok(payslips_core::run(&config).await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payslips=info,payslips_core=info,payslips_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(report) => {
            info!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to run: {e}");
            ExitCode::FAILURE
        }
    }
}

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
    use clap::CommandFactory;
    use payslips_core::{DecryptError, ServerAddress};

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec![
            "payslips",
            "--email",
            "me@example.com",
            "--password",
            "secret",
            "--pdf-passwords",
            "a,b",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.server, ServerAddress::new("imap.gmail.com", 993));
        assert_eq!(config.pdf_passwords, vec!["a", "b"]);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/output"));
        assert_eq!(config.filter, FilterConfig::default());
        assert_eq!(config.decrypt_tool, PathBuf::from("qpdf"));
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
    }

    #[test]
    fn test_filters_and_lists() {
        let config = parse(&[
            "--imap-addr",
            "mail.example.org:1993",
            "--filter-body",
            "payslip;;salary",
            "--filter-subject",
            "",
            "--filter-from",
            "hr@example.com",
            "--on-error",
            "continue",
            "--id",
            "123456789",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.server, ServerAddress::new("mail.example.org", 1993));
        assert_eq!(config.filter.body, vec!["payslip", "salary"]);
        assert_eq!(config.filter.subject, None);
        assert_eq!(config.filter.from.as_deref(), Some("hr@example.com"));
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        assert_eq!(config.expected_id.as_deref(), Some("123456789"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_server_address_is_config_error() {
        assert!(parse(&["--imap-addr", "host:port"]).into_config().is_err());
    }

    #[test]
    fn test_unknown_error_policy_rejected_by_parser() {
        let err = Cli::try_parse_from([
            "payslips",
            "--email",
            "me@example.com",
            "--password",
            "secret",
            "--pdf-passwords",
            "a",
            "--on-error",
            "maybe",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_error_policy_choices_are_listed() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("fail-fast"));
        assert!(help.contains("continue"));
    }

    #[test]
    fn test_failure_message_carries_cause() {
        let err = anyhow::Error::from(payslips_core::Error::Decrypt {
            path: PathBuf::from("/tmp/output/123456789/2024/01.pdf"),
            source: DecryptError::Exhausted { attempts: 2 },
        });
        assert_eq!(
            format!("Failed to run: {err}"),
            "Failed to run: Failed to decrypt /tmp/output/123456789/2024/01.pdf: \
             no candidate password matched (2 tried)"
        );
    }

    #[test]
    fn test_pdf_passwords_required() {
        let result = Cli::try_parse_from([
            "payslips",
            "--email",
            "me@example.com",
            "--password",
            "secret",
        ]);
        // PDF_PASSWORDS may be set in the environment running the tests
        if std::env::var_os("PDF_PASSWORDS").is_none() {
            assert!(result.is_err());
        }
    }
}
