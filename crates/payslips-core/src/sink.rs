//! Writing attachments into the `{id}/{yyyy}/{mm}.pdf` tree.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{DirBuilder, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Saves attachment bodies under an output root.
#[derive(Debug, Clone)]
pub struct AttachmentSink {
    root: PathBuf,
}

impl AttachmentSink {
    /// Creates a sink writing below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps `id_yyyy_mm.pdf` to `root/id/yyyy/mm.pdf`.
    ///
    /// The name is split on the first two underscores; it is not checked
    /// against the payslip pattern.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::InvalidInput`] if the name has fewer than three
    /// segments or a segment is not a plain file name.
    pub fn destination(&self, filename: &str) -> io::Result<PathBuf> {
        let mut segments = filename.splitn(3, '_');
        let (Some(id), Some(year), Some(file)) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{filename:?} does not split into id, year and month"),
            ));
        };

        let mut path = self.root.clone();
        for segment in [id, year, file] {
            if !is_plain_segment(segment) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{filename:?} contains an unusable path segment {segment:?}"),
                ));
            }
            path.push(segment);
        }
        std::path::absolute(path)
    }

    /// Streams `body` into the file for `filename` and returns its absolute
    /// path.
    ///
    /// Missing directories are created (0755 on Unix). An existing file is
    /// truncated and overwritten.
    ///
    /// # Errors
    ///
    /// Any I/O error, or `InvalidInput` from [`Self::destination`].
    pub async fn save<R>(&self, filename: &str, body: &mut R) -> io::Result<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.destination(filename)?;
        if let Some(dir) = path.parent() {
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o755);
            builder.create(dir).await?;
        }

        let mut file = File::create(&path).await?;
        let written = tokio::io::copy(body, &mut file).await?;
        file.flush().await?;
        tracing::debug!(path = %path.display(), bytes = written, "attachment written");

        Ok(path)
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !segment.contains(['/', '\\'])
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
    fn test_destination_layout() {
        let sink = AttachmentSink::new("/tmp/output");
        assert_eq!(
            sink.destination("123456789_2024_01.pdf").unwrap(),
            PathBuf::from("/tmp/output/123456789/2024/01.pdf")
        );
    }

    #[test]
    fn test_destination_too_few_segments() {
        let sink = AttachmentSink::new("/tmp/output");
        let err = sink.destination("123456789_2024.pdf").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = sink.destination("report.pdf").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_destination_rejects_traversal() {
        let sink = AttachmentSink::new("/tmp/output");
        for name in [".._2024_01.pdf", "a_2024_../x", "a__01.pdf", "a_/etc_01.pdf"] {
            let err = sink.destination(name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
        }
    }

    #[test]
    fn test_destination_is_absolute() {
        let sink = AttachmentSink::new("relative/out");
        assert!(sink.destination("123456789_2024_01.pdf").unwrap().is_absolute());
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AttachmentSink::new(dir.path());
        let body = b"%PDF-1.4 payslip".to_vec();

        let path = sink
            .save("123456789_2024_01.pdf", &mut body.as_slice())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("123456789").join("2024").join("01.pdf"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AttachmentSink::new(dir.path());

        sink.save("123456789_2024_01.pdf", &mut &b"a much longer first version"[..])
            .await
            .unwrap();
        let path = sink
            .save("123456789_2024_01.pdf", &mut &b"second"[..])
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_directory_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let sink = AttachmentSink::new(dir.path());
        sink.save("123456789_2024_01.pdf", &mut &b"x"[..]).await.unwrap();

        let mode = std::fs::metadata(dir.path().join("123456789"))
            .unwrap()
            .permissions()
            .mode();
        // umask may remove bits, never add them
        assert_eq!(mode & 0o777 & !0o755, 0);
    }

    #[tokio::test]
    async fn test_save_invalid_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AttachmentSink::new(dir.path());

        let err = sink.save("report.pdf", &mut &b"x"[..]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
