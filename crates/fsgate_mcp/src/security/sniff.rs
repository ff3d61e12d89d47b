//! Content Sniffer - Byte-Based Type Classification
//!
//! Strict UTF-8 decoding runs first. Valid UTF-8 is text, and text that
//! carries a NUL byte is rejected outright rather than retried as binary.
//! Only bytes that fail to decode reach magic-number sniffing.

use super::{CanonicalPath, SecurityError};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default bound on a sniff or read of one file
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

const TEXT_MIME: &str = "text/plain";
const PDF_MIME: &str = "application/pdf";
const UNKNOWN_MIME: &str = "application/octet-stream";

/// Coarse class a sniffed file falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Text,
    Image,
    Pdf,
    Other,
}

/// Outcome of classifying a file's bytes. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub mime_type: String,
    pub is_text_safe: bool,
    pub class: ContentClass,
}

impl SniffResult {
    /// Text (NUL-free), images and PDFs may be read
    pub fn is_permitted(&self) -> bool {
        match self.class {
            ContentClass::Text => self.is_text_safe,
            ContentClass::Image | ContentClass::Pdf => true,
            ContentClass::Other => false,
        }
    }

    /// Human-readable reason for a rejected classification
    pub fn rejection_reason(&self) -> &'static str {
        match self.class {
            ContentClass::Text if !self.is_text_safe => "File contains null bytes",
            _ => "Unsupported file type",
        }
    }

    pub(crate) fn into_error(self, path: &Path) -> SecurityError {
        SecurityError::DisallowedType {
            path: path.to_path_buf(),
            reason: self.rejection_reason().to_string(),
            mime_type: self.mime_type,
        }
    }
}

/// Classify raw bytes. Pure, no I/O.
pub fn classify(bytes: &[u8]) -> SniffResult {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return SniffResult {
            mime_type: TEXT_MIME.to_string(),
            is_text_safe: !text.contains('\0'),
            class: ContentClass::Text,
        };
    }

    match infer::get(bytes) {
        Some(kind) => {
            let mime = kind.mime_type();
            let class = if mime.starts_with("image/") {
                ContentClass::Image
            } else if mime == PDF_MIME {
                ContentClass::Pdf
            } else {
                ContentClass::Other
            };
            SniffResult {
                mime_type: mime.to_string(),
                is_text_safe: false,
                class,
            }
        }
        None => SniffResult {
            mime_type: UNKNOWN_MIME.to_string(),
            is_text_safe: false,
            class: ContentClass::Other,
        },
    }
}

/// Run filesystem `work` against `path`, giving up after `timeout`.
pub(crate) async fn bounded<T, F>(
    path: &Path,
    timeout: Duration,
    work: F,
) -> Result<T, SecurityError>
where
    F: Future<Output = Result<T, SecurityError>>,
{
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| SecurityError::Timeout {
            path: path.to_path_buf(),
            timeout,
        })?
}

/// Read a whole file, giving up after `timeout`.
pub async fn read_file_bounded(path: &Path, timeout: Duration) -> Result<Vec<u8>, SecurityError> {
    bounded(path, timeout, async {
        tokio::fs::read(path)
            .await
            .map_err(|source| SecurityError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
    })
    .await
}

/// Reads and classifies files under a timeout
#[derive(Debug, Clone)]
pub struct ContentSniffer {
    timeout: Duration,
}

impl ContentSniffer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn sniff(&self, path: &CanonicalPath) -> Result<SniffResult, SecurityError> {
        let bytes = read_file_bounded(path.as_path(), self.timeout).await?;
        let result = classify(&bytes);
        debug!(
            path = %path,
            mime_type = %result.mime_type,
            permitted = result.is_permitted(),
            "File sniffed"
        );
        Ok(result)
    }
}

impl Default for ContentSniffer {
    fn default() -> Self {
        Self::new(DEFAULT_IO_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn test_plain_text_is_permitted() {
        let result = classify("héllo, wörld\n".as_bytes());
        assert_eq!(result.class, ContentClass::Text);
        assert_eq!(result.mime_type, "text/plain");
        assert!(result.is_text_safe);
        assert!(result.is_permitted());
    }

    #[test]
    fn test_empty_file_is_text() {
        let result = classify(b"");
        assert_eq!(result.class, ContentClass::Text);
        assert!(result.is_permitted());
    }

    #[test]
    fn test_utf8_with_nul_is_rejected_not_binary() {
        let result = classify(b"abc\0def");
        assert_eq!(result.class, ContentClass::Text);
        assert!(!result.is_text_safe);
        assert!(!result.is_permitted());
        assert_eq!(result.rejection_reason(), "File contains null bytes");
    }

    #[test]
    fn test_png_magic_is_image() {
        let result = classify(PNG_HEADER);
        assert_eq!(result.class, ContentClass::Image);
        assert_eq!(result.mime_type, "image/png");
        assert!(result.is_permitted());
    }

    #[test]
    fn test_pdf_magic_is_pdf() {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.extend_from_slice(&[0xE2, 0xE3, 0xCF, 0xD3, b'\n']);
        let result = classify(&bytes);
        assert_eq!(result.class, ContentClass::Pdf);
        assert_eq!(result.mime_type, "application/pdf");
        assert!(result.is_permitted());
    }

    #[test]
    fn test_unknown_binary_is_rejected() {
        let result = classify(&[0xFF, 0xFE, 0x00, 0x81, 0x02]);
        assert_eq!(result.class, ContentClass::Other);
        assert_eq!(result.mime_type, "application/octet-stream");
        assert!(!result.is_permitted());
    }

    #[test]
    fn test_known_but_unsupported_binary_is_rejected() {
        // Zip local file header followed by invalid UTF-8
        let bytes = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00, 0xFF, 0xFE];
        let result = classify(&bytes);
        assert_eq!(result.class, ContentClass::Other);
        assert!(!result.is_permitted());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_unreadable() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = read_file_bounded(&temp.path().join("missing"), DEFAULT_IO_TIMEOUT).await;
        assert!(matches!(result, Err(SecurityError::Unreadable { .. })));
    }

    #[tokio::test]
    async fn test_bounded_work_times_out() {
        let path = Path::new("/data/slow");
        let result: Result<(), _> = bounded(
            path,
            Duration::from_millis(20),
            std::future::pending::<Result<(), SecurityError>>(),
        )
        .await;

        match result {
            Err(SecurityError::Timeout { path: p, timeout }) => {
                assert_eq!(p, path);
                assert_eq!(timeout, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    /// A FIFO with no writer blocks `open` until one shows up.
    #[cfg(unix)]
    fn make_fifo(path: &Path) {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
    }

    /// Opening the write end lets the blocked reader see EOF and finish,
    /// so the blocking pool can shut down.
    #[cfg(unix)]
    fn release_fifo(path: &Path) {
        drop(std::fs::OpenOptions::new().write(true).open(path).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_fifo_without_writer_times_out() {
        let temp = tempfile::TempDir::new().unwrap();
        let fifo = temp.path().join("pipe");
        make_fifo(&fifo);

        let result = read_file_bounded(&fifo, Duration::from_millis(50)).await;
        release_fifo(&fifo);

        match result {
            Err(SecurityError::Timeout { path, .. }) => assert_eq!(path, fifo),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sniff_fifo_without_writer_times_out() {
        use crate::security::{PathCanonicalizer, PathGrammar, PathLimits};

        let temp = tempfile::TempDir::new().unwrap();
        let fifo = temp.path().join("pipe");
        make_fifo(&fifo);

        let canonicalizer = PathCanonicalizer::new(
            temp.path().to_path_buf(),
            PathGrammar::Posix,
            PathLimits::default(),
        );
        let canonical = canonicalizer.canonicalize("pipe").await.unwrap();
        let result = ContentSniffer::new(Duration::from_millis(50))
            .sniff(&canonical)
            .await;
        release_fifo(&fifo);

        assert!(matches!(result, Err(SecurityError::Timeout { .. })), "{:?}", result);
    }
}
