//! The whole retrieval: search, filter, save, decrypt.

use std::fmt;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{Config, ErrorPolicy};
use crate::decrypt::{Decrypt, PasswordRetryDecryptor, QpdfDecryptor};
use crate::error::{Error, Result};
use crate::filter::{AttachmentFilter, Verdict};
use crate::session::MailboxSession;
use crate::sink::AttachmentSink;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Messages fetched.
    pub messages: usize,
    /// Attachments written to disk.
    pub attachments_saved: usize,
    /// Saved attachments that were decrypted in place.
    pub attachments_decrypted: usize,
    /// Attachments skipped after a save or decrypt failure.
    pub attachments_failed: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages, {} attachments saved, {} decrypted, {} failed",
            self.messages,
            self.attachments_saved,
            self.attachments_decrypted,
            self.attachments_failed
        )
    }
}

/// Connects to the configured server and runs the retrieval with qpdf.
///
/// # Errors
///
/// The first unrecovered error; see [`run_session`].
pub async fn run(config: &Config) -> Result<RunReport> {
    let session = MailboxSession::connect(&config.server).await?;
    let decryptor = PasswordRetryDecryptor::new(
        QpdfDecryptor::new(config.decrypt_tool.clone()),
        config.pdf_passwords.clone(),
    );
    run_session(config, session, &decryptor).await
}

/// Runs the retrieval on a connected session and logs out afterwards.
///
/// Every accepted attachment is saved and decrypted before the walk moves
/// on. The session is logged out whether or not the run succeeded.
///
/// # Errors
///
/// - login, mailbox, search and fetch errors
/// - MIME errors other than an unknown charset in one part
/// - save and decrypt errors, unless the error policy is
///   [`ErrorPolicy::Continue`]
pub async fn run_session<S, D>(
    config: &Config,
    mut session: MailboxSession<S>,
    decryptor: &PasswordRetryDecryptor<D>,
) -> Result<RunReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Decrypt,
{
    let result = process(config, &mut session, decryptor).await;
    if let Ok(report) = &result {
        tracing::info!("Done! ({report})");
    }
    session.logout().await;
    result
}

async fn process<S, D>(
    config: &Config,
    session: &mut MailboxSession<S>,
    decryptor: &PasswordRetryDecryptor<D>,
) -> Result<RunReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Decrypt,
{
    session.authenticate(&config.identity, &config.secret).await?;
    tracing::info!("Logged in");

    session.select_mailbox(&config.filter.inbox, true).await?;

    let refs = session.search(&config.search_criteria()).await?;
    let numbers: Vec<u32> = refs.iter().map(|seq| seq.get()).collect();
    tracing::info!("Search results: {numbers:?}");

    let mut report = RunReport::default();
    if refs.is_empty() {
        return Ok(report);
    }

    let filter = AttachmentFilter::new(config.expected_id.clone());
    let sink = AttachmentSink::new(&config.output_dir);

    let mut messages = session.fetch_and_stream(&refs).await?;
    while let Some(mail) = messages.next_mail().await? {
        report.messages += 1;
        tracing::info!("* {}", mail.subject().unwrap_or_default());

        for attachment in mail.attachments() {
            let attachment = match attachment {
                Ok(attachment) => attachment,
                Err(e) if e.is_charset() => {
                    tracing::debug!(seq = mail.seq.get(), error = %e, "skipping part");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mime_type = attachment.content_type.mime_type();
            let Verdict::Accept(filename) =
                filter.check(&mime_type, attachment.filename.as_deref())
            else {
                continue;
            };
            tracing::info!("handle attachment: {filename}");

            let body = attachment.body.decode()?;
            match store(&sink, decryptor, filename, &body, &mut report).await {
                Ok(()) => {}
                Err(e) if config.error_policy == ErrorPolicy::Continue && e.is_per_attachment() => {
                    report.attachments_failed += 1;
                    tracing::warn!("Skipping {filename:?}: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(report)
}

/// Saves one attachment and decrypts it in place.
async fn store<D: Decrypt>(
    sink: &AttachmentSink,
    decryptor: &PasswordRetryDecryptor<D>,
    filename: &str,
    body: &[u8],
    report: &mut RunReport,
) -> Result<()> {
    tracing::info!("Found file {filename:?}");

    let path = sink
        .save(filename, &mut &body[..])
        .await
        .map_err(|source| Error::Save {
            path: intended_path(sink, filename),
            source,
        })?;
    report.attachments_saved += 1;

    let attempt = decryptor
        .decrypt(&path)
        .await
        .map_err(|source| Error::Decrypt {
            path: path.clone(),
            source,
        })?;
    report.attachments_decrypted += 1;
    tracing::debug!(path = %path.display(), attempt, "decrypted");

    Ok(())
}

/// Where `filename` was meant to go, for error reports.
fn intended_path(sink: &AttachmentSink, filename: &str) -> PathBuf {
    sink.destination(filename)
        .unwrap_or_else(|_| sink.root().join(filename))
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

    #[test]
    fn test_report_display() {
        let report = RunReport {
            messages: 3,
            attachments_saved: 2,
            attachments_decrypted: 1,
            attachments_failed: 1,
        };
        assert_eq!(
            report.to_string(),
            "3 messages, 2 attachments saved, 1 decrypted, 1 failed"
        );
    }

    #[test]
    fn test_intended_path_for_unusable_name() {
        let sink = AttachmentSink::new("/tmp/output");
        assert_eq!(
            intended_path(&sink, "report.pdf"),
            PathBuf::from("/tmp/output/report.pdf")
        );
        assert_eq!(
            intended_path(&sink, "123456789_2024_01.pdf"),
            PathBuf::from("/tmp/output/123456789/2024/01.pdf")
        );
    }
}
