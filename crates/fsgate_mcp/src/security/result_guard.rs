//! Result Size Guard - Whole-Result Byte Cap
//!
//! Text items count their UTF-8 length and image items their decoded length.
//! A result over the cap is replaced, never truncated.

use crate::types::ToolContent;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

/// 1 MiB
pub const MAX_RESULT_BYTES: usize = 1 << 20;

/// Caps the total payload of a tool result
#[derive(Debug, Clone)]
pub struct ResultGuard {
    max_bytes: usize,
}

impl ResultGuard {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_RESULT_BYTES,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Total payload bytes of `contents`
    pub fn measure(&self, contents: &[ToolContent]) -> usize {
        contents.iter().map(payload_len).sum()
    }

    /// Pass `contents` through, or replace them with a single notice when over
    /// the cap. The flag is true when a replacement happened.
    pub fn guard(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        contents: Vec<ToolContent>,
    ) -> (Vec<ToolContent>, bool) {
        let size = self.measure(&contents);
        if size <= self.max_bytes {
            return (contents, false);
        }

        warn!(tool = tool_name, size, max = self.max_bytes, "Tool result too large");
        (vec![ToolContent::text(self.notice(tool_name, args, size))], true)
    }

    /// Text that stands in for a result of `size` bytes
    pub fn notice(&self, tool_name: &str, args: &serde_json::Value, size: usize) -> String {
        format!(
            "Result for tool {} with arguments {} is too large: {} bytes",
            tool_name, args, size
        )
    }
}

impl Default for ResultGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_len(content: &ToolContent) -> usize {
    match content {
        ToolContent::Text { text } => text.len(),
        ToolContent::Image { data, .. } => STANDARD
            .decode(data)
            .map(|bytes| bytes.len())
            .unwrap_or(data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_small_result_unchanged() {
        let guard = ResultGuard::new();
        let contents = vec![ToolContent::text("hello")];
        let (out, replaced) = guard.guard("read-file", &json!({"path": "a"}), contents.clone());
        assert!(!replaced);
        assert_eq!(out, contents);
    }

    #[test]
    fn test_exact_threshold_unchanged() {
        let guard = ResultGuard::new();
        let contents = vec![
            ToolContent::text("x".repeat(MAX_RESULT_BYTES - 4)),
            ToolContent::text("yyyy"),
        ];
        assert_eq!(guard.measure(&contents), MAX_RESULT_BYTES);

        let (out, replaced) = guard.guard("ls", &json!({}), contents.clone());
        assert!(!replaced);
        assert_eq!(out, contents);
    }

    #[test]
    fn test_one_byte_over_is_replaced() {
        let guard = ResultGuard::new();
        let contents = vec![ToolContent::text("x".repeat(MAX_RESULT_BYTES + 1))];
        let args = json!({"path": "/data/big.txt"});

        let (out, replaced) = guard.guard("read-file", &args, contents);
        assert!(replaced);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].as_text().unwrap(),
            format!(
                "Result for tool read-file with arguments {} is too large: {} bytes",
                args,
                MAX_RESULT_BYTES + 1
            )
        );
    }

    #[test]
    fn test_images_count_decoded_bytes() {
        let guard = ResultGuard::new();
        // 3 raw bytes encode to 4 base64 chars
        let image = ToolContent::image(&[1, 2, 3], "image/webp");
        assert_eq!(guard.measure(&[image]), 3);

        let images = vec![ToolContent::image(&vec![0u8; MAX_RESULT_BYTES / 2 + 1], "image/webp"); 2];
        let (_, replaced) = guard.guard("read-file", &json!({}), images);
        assert!(replaced);
    }

    #[test]
    fn test_undecodable_image_counts_encoded_length() {
        let guard = ResultGuard::new();
        let image = ToolContent::Image {
            data: "not base64!".to_string(),
            mime_type: "image/png".to_string(),
        };
        assert_eq!(guard.measure(&[image]), "not base64!".len());
    }

    #[test]
    fn test_multibyte_text_counts_utf8_bytes() {
        let guard = ResultGuard::new();
        assert_eq!(guard.measure(&[ToolContent::text("héllo")]), 6);
    }
}
