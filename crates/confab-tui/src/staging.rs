//! Attachment staging.
//!
//! Files the user has picked but not yet sent. Uniqueness is keyed by
//! (name, size); adding a duplicate is a silent no-op, and so is removing
//! an out-of-range index. On send every staged file is read and
//! base64-encoded concurrently, and the caller waits for all of them before
//! emitting one combined frame.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use futures::future::try_join_all;

use confab_core::{AttachmentMeta, FileAttachment};

/// Error type for staging operations.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The path could not be inspected.
    #[error("cannot stage {}: {source}", path.display())]
    Probe {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The path exists but is not a regular file.
    #[error("{} is not a regular file", path.display())]
    NotAFile {
        /// The offending path.
        path: PathBuf,
    },

    /// A staged file could not be read at send time.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// One file chosen by the user but not yet transmitted.
#[derive(Debug, Clone)]
pub struct StagedFile {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
}

impl StagedFile {
    /// Inspect `path` and build a staged entry for it.
    ///
    /// The MIME type is inferred from the extension; unknown extensions
    /// fall back to `application/octet-stream`.
    pub async fn probe(path: impl AsRef<Path>) -> Result<Self, StagingError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| StagingError::Probe {
                path: path.to_path_buf(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(StagingError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
        })
    }

    /// File name shown in chips and sent as `filename`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Display metadata for the transcript.
    #[must_use]
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Read the file and build its wire payload.
    async fn encode(&self) -> Result<FileAttachment, StagingError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StagingError::Read {
                path: self.path.clone(),
                source,
            })?;

        Ok(FileAttachment {
            filename: self.name.clone(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime_type: self.mime_type.clone(),
        })
    }
}

/// The ordered list of staged attachments.
#[derive(Debug, Default)]
pub struct Staging {
    files: Vec<StagedFile>,
}

impl Staging {
    /// Create an empty staging list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file unless one with the same (name, size) already is.
    ///
    /// Returns `false` for a duplicate; the list is unchanged.
    pub fn add(&mut self, file: StagedFile) -> bool {
        let duplicate = self
            .files
            .iter()
            .any(|f| f.name == file.name && f.size == file.size);
        if duplicate {
            return false;
        }
        self.files.push(file);
        true
    }

    /// Remove the entry at `index`. Out of range is a no-op.
    pub fn remove(&mut self, index: usize) -> Option<StagedFile> {
        if index < self.files.len() {
            Some(self.files.remove(index))
        } else {
            None
        }
    }

    /// Empty the list. Called after a successful send.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of staged files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// The staged files in order.
    #[must_use]
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Display metadata for all staged files.
    #[must_use]
    pub fn metas(&self) -> Vec<AttachmentMeta> {
        self.files.iter().map(StagedFile::meta).collect()
    }

    /// Read and encode every staged file concurrently.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any single read fails; the staging list itself
    /// is untouched either way, so the caller can surface the error and
    /// let the user retry.
    pub async fn encode_all(&self) -> Result<Vec<FileAttachment>, StagingError> {
        try_join_all(self.files.iter().map(StagedFile::encode)).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[tokio::test]
    async fn probe_fills_name_size_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "photo.png", b"not really a png");

        let staged = StagedFile::probe(&path).await.unwrap();
        assert_eq!(staged.name(), "photo.png");
        assert_eq!(staged.size(), 16);
        assert_eq!(staged.meta().mime_type, "image/png");
    }

    #[tokio::test]
    async fn probe_unknown_extension_falls_back_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "blob.xyzzy", b"??");

        let staged = StagedFile::probe(&path).await.unwrap();
        assert_eq!(staged.meta().mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn probe_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StagedFile::probe(dir.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Probe { .. }));
    }

    #[tokio::test]
    async fn probe_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StagedFile::probe(dir.path()).await.unwrap_err();
        assert!(matches!(err, StagingError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn duplicate_name_and_size_stages_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "dup.txt", b"same");

        let mut staging = Staging::new();
        assert!(staging.add(StagedFile::probe(&path).await.unwrap()));
        assert!(!staging.add(StagedFile::probe(&path).await.unwrap()));
        assert_eq!(staging.len(), 1);
    }

    #[tokio::test]
    async fn same_name_different_size_is_not_a_duplicate() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = fixture(&dir_a, "data.txt", b"short");
        let b = fixture(&dir_b, "data.txt", b"rather longer contents");

        let mut staging = Staging::new();
        assert!(staging.add(StagedFile::probe(&a).await.unwrap()));
        assert!(staging.add(StagedFile::probe(&b).await.unwrap()));
        assert_eq!(staging.len(), 2);
    }

    #[tokio::test]
    async fn remove_out_of_range_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "one.txt", b"1");

        let mut staging = Staging::new();
        staging.add(StagedFile::probe(&path).await.unwrap());

        assert!(staging.remove(5).is_none());
        assert_eq!(staging.len(), 1);

        assert!(staging.remove(0).is_some());
        assert!(staging.is_empty());
        assert!(staging.remove(0).is_none());
    }

    #[tokio::test]
    async fn encode_all_produces_base64_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(&dir, "a.txt", b"hello");
        let b = fixture(&dir, "b.bin", &[0xde, 0xad, 0xbe, 0xef]);

        let mut staging = Staging::new();
        staging.add(StagedFile::probe(&a).await.unwrap());
        staging.add(StagedFile::probe(&b).await.unwrap());

        let payloads = staging.encode_all().await.unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].filename, "a.txt");
        assert_eq!(payloads[0].content_base64, "aGVsbG8=");
        assert_eq!(payloads[0].mime_type, "text/plain");
        assert_eq!(payloads[1].content_base64, "3q2+7w==");
    }

    #[tokio::test]
    async fn encode_all_surfaces_a_vanished_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "gone.txt", b"soon deleted");

        let mut staging = Staging::new();
        staging.add(StagedFile::probe(&path).await.unwrap());
        std::fs::remove_file(&path).unwrap();

        let err = staging.encode_all().await.unwrap_err();
        assert!(matches!(err, StagingError::Read { .. }));
        // Staging is untouched so the user can drop the entry and retry.
        assert_eq!(staging.len(), 1);
    }
}
