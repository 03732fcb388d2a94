//! Turning local files into model content blocks.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use scribe_types::{ContentBlock, MediaSource};
use std::path::Path;

/// How a file is sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// PDF, sent as a base64 document block.
    Pdf,
    /// PNG/JPEG/GIF/WebP, sent as a base64 image block.
    Image,
    /// Read as UTF-8 and inlined as text.
    Text,
}

/// Media type guessed from the file extension.
pub fn media_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Classify by media type. `None` for formats the model cannot take inline.
pub fn attachment_kind(media_type: &str) -> Option<AttachmentKind> {
    match media_type {
        "application/pdf" => Some(AttachmentKind::Pdf),
        "image/png" | "image/jpeg" | "image/gif" | "image/webp" => Some(AttachmentKind::Image),
        t if t.starts_with("text/") => Some(AttachmentKind::Text),
        "application/json" | "application/toml" | "application/x-yaml" => {
            Some(AttachmentKind::Text)
        }
        _ => None,
    }
}

/// Read `path` and wrap it in the content block matching its type.
/// Unsupported binary formats become a text note naming the file.
pub async fn load_attachment(path: &Path) -> std::io::Result<ContentBlock> {
    let media_type = media_type(path);
    let block = match attachment_kind(&media_type) {
        Some(AttachmentKind::Pdf) => ContentBlock::Document {
            source: MediaSource::base64(media_type, STANDARD.encode(tokio::fs::read(path).await?)),
        },
        Some(AttachmentKind::Image) => ContentBlock::Image {
            source: MediaSource::base64(media_type, STANDARD.encode(tokio::fs::read(path).await?)),
        },
        Some(AttachmentKind::Text) => {
            let bytes = tokio::fs::read(path).await?;
            ContentBlock::Text {
                text: format!(
                    "[file:{}]\n{}",
                    path.display(),
                    String::from_utf8_lossy(&bytes)
                ),
            }
        }
        None => {
            // Still fail on unreadable files so callers can report them as missing.
            tokio::fs::metadata(path).await?;
            ContentBlock::Text {
                text: format!("[file:{} ({media_type}, not readable inline)]", path.display()),
            }
        }
    };
    Ok(block)
}
