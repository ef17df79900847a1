//! Removing PDF encryption by trying candidate passwords.
//!
//! [`PasswordRetryDecryptor`] owns the retry loop and the file handling;
//! the actual tool sits behind the [`Decrypt`] trait. [`QpdfDecryptor`] is
//! the default backend.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::DecryptError;

/// Marker qpdf prints when the password does not open the file.
const INVALID_PASSWORD_MARKER: &str = "invalid password";

/// Result of one decryption attempt.
#[derive(Debug)]
pub enum DecryptionOutcome {
    /// `output` holds the decrypted file.
    Success,
    /// The password was rejected; the next one may work.
    WrongPassword,
    /// Anything else. Retrying with another password will not help.
    OtherFailure(DecryptError),
}

/// One decryption attempt with one password.
pub trait Decrypt {
    /// Decrypts `input` into `output` using `password`.
    fn attempt(
        &self,
        input: &Path,
        output: &Path,
        password: &str,
    ) -> impl Future<Output = DecryptionOutcome> + Send;
}

/// Runs `qpdf --decrypt --password=<p> <input> <output>`.
#[derive(Debug, Clone)]
pub struct QpdfDecryptor {
    tool: PathBuf,
}

impl QpdfDecryptor {
    /// Uses the given qpdf executable (a bare name is looked up in `PATH`).
    #[must_use]
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    /// Returns the executable.
    #[must_use]
    pub fn tool(&self) -> &Path {
        &self.tool
    }
}

impl Default for QpdfDecryptor {
    fn default() -> Self {
        Self::new("qpdf")
    }
}

impl Decrypt for QpdfDecryptor {
    async fn attempt(&self, input: &Path, output: &Path, password: &str) -> DecryptionOutcome {
        let mut password_arg = OsString::from("--password=");
        password_arg.push(password);

        let result = Command::new(&self.tool)
            .arg("--decrypt")
            .arg(password_arg)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(source) => {
                return DecryptionOutcome::OtherFailure(DecryptError::Spawn {
                    tool: self.tool.clone(),
                    source,
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if combined.contains(INVALID_PASSWORD_MARKER) {
            DecryptionOutcome::WrongPassword
        } else if output.status.success() {
            DecryptionOutcome::Success
        } else {
            DecryptionOutcome::OtherFailure(DecryptError::Tool {
                status: output.status,
                output: combined.trim().to_string(),
            })
        }
    }
}

/// Tries passwords in order until one opens the file.
///
/// Each attempt writes `<file>.dec`. On success that file is renamed over
/// the original; otherwise it is removed and the original is left as it was.
#[derive(Debug, Clone)]
pub struct PasswordRetryDecryptor<D> {
    backend: D,
    passwords: Vec<String>,
}

impl<D: Decrypt> PasswordRetryDecryptor<D> {
    /// Creates a decryptor trying `passwords` in the given order.
    #[must_use]
    pub const fn new(backend: D, passwords: Vec<String>) -> Self {
        Self { backend, passwords }
    }

    /// Returns the backend.
    #[must_use]
    pub const fn backend(&self) -> &D {
        &self.backend
    }

    /// Decrypts `file` in place.
    ///
    /// Returns the 1-based number of the password that worked.
    ///
    /// # Errors
    ///
    /// - [`DecryptError::Exhausted`] if every password was rejected (also for
    ///   an empty list, with 0 attempts)
    /// - the backend's error as soon as it fails for another reason
    /// - [`DecryptError::Replace`] if the rename fails
    pub async fn decrypt(&self, file: &Path) -> Result<usize, DecryptError> {
        let output = scratch_path(file);

        let result = match self.try_passwords(file, &output).await {
            Ok(attempt) => tokio::fs::rename(&output, file)
                .await
                .map(|()| attempt)
                .map_err(DecryptError::Replace),
            Err(e) => Err(e),
        };

        if result.is_err() {
            remove_stale(&output).await;
        }
        result
    }

    async fn try_passwords(&self, input: &Path, output: &Path) -> Result<usize, DecryptError> {
        for (index, password) in self.passwords.iter().enumerate() {
            let attempt = index + 1;
            tracing::debug!(file = %input.display(), attempt, "trying password");

            match self.backend.attempt(input, output, password).await {
                DecryptionOutcome::Success => {
                    tracing::debug!(file = %input.display(), attempt, "password accepted");
                    return Ok(attempt);
                }
                DecryptionOutcome::WrongPassword => {}
                DecryptionOutcome::OtherFailure(e) => return Err(e),
            }
        }

        Err(DecryptError::Exhausted {
            attempts: self.passwords.len(),
        })
    }
}

/// `<file>.dec` next to `file`.
fn scratch_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".dec");
    PathBuf::from(name)
}

async fn remove_stale(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove partial output"),
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
    use std::sync::Mutex;

    /// Accepts one password, rejects the others, records the order tried.
    struct FakeDecryptor {
        correct: Option<&'static str>,
        fail_on: Option<&'static str>,
        tried: Mutex<Vec<String>>,
    }

    impl FakeDecryptor {
        fn accepting(correct: &'static str) -> Self {
            Self {
                correct: Some(correct),
                fail_on: None,
                tried: Mutex::new(Vec::new()),
            }
        }

        fn tried(&self) -> Vec<String> {
            self.tried.lock().unwrap().clone()
        }
    }

    impl Decrypt for FakeDecryptor {
        async fn attempt(&self, input: &Path, output: &Path, password: &str) -> DecryptionOutcome {
            self.tried.lock().unwrap().push(password.to_string());
            // Every attempt leaves something behind, like a real tool would
            std::fs::write(output, b"partial").unwrap();

            if self.fail_on == Some(password) {
                return DecryptionOutcome::OtherFailure(DecryptError::Spawn {
                    tool: PathBuf::from("fake"),
                    source: io::Error::other("boom"),
                });
            }
            if self.correct == Some(password) {
                let mut plain = std::fs::read(input).unwrap();
                plain.extend_from_slice(b" decrypted");
                std::fs::write(output, plain).unwrap();
                return DecryptionOutcome::Success;
            }
            DecryptionOutcome::WrongPassword
        }
    }

    fn passwords(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| (*p).to_string()).collect()
    }

    fn encrypted_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("01.pdf");
        std::fs::write(&path, b"encrypted").unwrap();
        path
    }

    #[test]
    fn test_scratch_path() {
        assert_eq!(
            scratch_path(Path::new("/out/1/2024/01.pdf")),
            PathBuf::from("/out/1/2024/01.pdf.dec")
        );
    }

    #[tokio::test]
    async fn test_tries_passwords_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = encrypted_file(&dir);
        let decryptor = PasswordRetryDecryptor::new(
            FakeDecryptor::accepting("p2"),
            passwords(&["p1", "p2", "p3"]),
        );

        let attempt = decryptor.decrypt(&file).await.unwrap();

        assert_eq!(attempt, 2);
        assert_eq!(decryptor.backend().tried(), vec!["p1", "p2"]);
        assert_eq!(std::fs::read(&file).unwrap(), b"encrypted decrypted");
        assert!(!scratch_path(&file).exists());
    }

    #[tokio::test]
    async fn test_exhausted_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = encrypted_file(&dir);
        let decryptor = PasswordRetryDecryptor::new(
            FakeDecryptor::accepting("never"),
            passwords(&["p1", "p2", "p3"]),
        );

        let err = decryptor.decrypt(&file).await.unwrap_err();

        assert!(matches!(err, DecryptError::Exhausted { attempts: 3 }));
        assert_eq!(decryptor.backend().tried(), vec!["p1", "p2", "p3"]);
        assert_eq!(std::fs::read(&file).unwrap(), b"encrypted");
        assert!(!scratch_path(&file).exists());
    }

    #[tokio::test]
    async fn test_other_failure_stops_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let file = encrypted_file(&dir);
        let backend = FakeDecryptor {
            correct: Some("p3"),
            fail_on: Some("p2"),
            tried: Mutex::new(Vec::new()),
        };
        let decryptor = PasswordRetryDecryptor::new(backend, passwords(&["p1", "p2", "p3"]));

        let err = decryptor.decrypt(&file).await.unwrap_err();

        assert!(matches!(err, DecryptError::Spawn { .. }));
        assert_eq!(decryptor.backend().tried(), vec!["p1", "p2"]);
        assert_eq!(std::fs::read(&file).unwrap(), b"encrypted");
        assert!(!scratch_path(&file).exists());
    }

    #[tokio::test]
    async fn test_empty_password_list_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let file = encrypted_file(&dir);
        let decryptor = PasswordRetryDecryptor::new(FakeDecryptor::accepting("p"), Vec::new());

        let err = decryptor.decrypt(&file).await.unwrap_err();

        assert!(matches!(err, DecryptError::Exhausted { attempts: 0 }));
        assert!(decryptor.backend().tried().is_empty());
    }

    #[tokio::test]
    async fn test_qpdf_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = encrypted_file(&dir);
        let backend = QpdfDecryptor::new(dir.path().join("no-such-qpdf"));

        let outcome = backend
            .attempt(&file, &scratch_path(&file), "pw")
            .await;

        assert!(matches!(
            outcome,
            DecryptionOutcome::OtherFailure(DecryptError::Spawn { .. })
        ));
    }
}
