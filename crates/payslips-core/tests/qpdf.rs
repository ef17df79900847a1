//! `QpdfDecryptor` against a stand-in qpdf script.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use payslips_core::{
    Decrypt, DecryptError, DecryptionOutcome, PasswordRetryDecryptor, QpdfDecryptor,
};

/// Behaves like `qpdf --decrypt --password=<p> <in> <out>` for three
/// passwords: `right` copies, `broken` fails like a damaged file, anything
/// else is an invalid password.
const FAKE_QPDF: &str = r#"#!/bin/sh
[ "$1" = "--decrypt" ] || exit 2
password="${2#--password=}"
case "$password" in
    right)
        { printf 'plain:'; cat "$3"; } > "$4"
        exit 0
        ;;
    broken)
        echo "qpdf: $3: file is damaged" >&2
        : > "$4"
        exit 2
        ;;
    *)
        echo "qpdf: $3: invalid password" >&2
        exit 2
        ;;
esac
"#;

/// Writes the script once, before any test spawns it.
fn fake_qpdf() -> &'static Path {
    static SCRIPT: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = SCRIPT.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qpdf");
        std::fs::write(&path, FAKE_QPDF).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

fn encrypted_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("01.pdf");
    std::fs::write(&path, b"%PDF-1.4 encrypted").unwrap();
    path
}

#[tokio::test]
async fn test_invalid_password_is_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    let input = encrypted_file(&dir);
    let backend = QpdfDecryptor::new(fake_qpdf());

    let outcome = backend
        .attempt(&input, &dir.path().join("out.pdf"), "nope")
        .await;

    assert!(matches!(outcome, DecryptionOutcome::WrongPassword));
}

#[tokio::test]
async fn test_correct_password_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = encrypted_file(&dir);
    let output = dir.path().join("out.pdf");
    let backend = QpdfDecryptor::new(fake_qpdf());

    let outcome = backend.attempt(&input, &output, "right").await;

    assert!(matches!(outcome, DecryptionOutcome::Success));
    assert_eq!(std::fs::read(&output).unwrap(), b"plain:%PDF-1.4 encrypted");
}

#[tokio::test]
async fn test_other_tool_failure_carries_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = encrypted_file(&dir);
    let backend = QpdfDecryptor::new(fake_qpdf());

    let outcome = backend
        .attempt(&input, &dir.path().join("out.pdf"), "broken")
        .await;

    match outcome {
        DecryptionOutcome::OtherFailure(DecryptError::Tool { status, output }) => {
            assert_eq!(status.code(), Some(2));
            assert!(output.contains("file is damaged"));
        }
        other => panic!("expected a tool failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_replaces_original_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = encrypted_file(&dir);
    let decryptor = PasswordRetryDecryptor::new(
        QpdfDecryptor::new(fake_qpdf()),
        vec!["first".to_string(), "second".to_string(), "right".to_string()],
    );

    let attempt = decryptor.decrypt(&file).await.unwrap();

    assert_eq!(attempt, 3);
    assert_eq!(std::fs::read(&file).unwrap(), b"plain:%PDF-1.4 encrypted");
    assert!(!dir.path().join("01.pdf.dec").exists());
}

#[tokio::test]
async fn test_tool_failure_stops_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let file = encrypted_file(&dir);
    let decryptor = PasswordRetryDecryptor::new(
        QpdfDecryptor::new(fake_qpdf()),
        vec!["first".to_string(), "broken".to_string(), "right".to_string()],
    );

    let err = decryptor.decrypt(&file).await.unwrap_err();

    assert!(matches!(err, DecryptError::Tool { .. }));
    assert_eq!(std::fs::read(&file).unwrap(), b"%PDF-1.4 encrypted");
    assert!(!dir.path().join("01.pdf.dec").exists());
}
