use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use tracing::warn;

/// Discord's per-message attachment limit.
pub const MAX_ATTACHMENTS: usize = 10;

static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data:image/.{1,7};base64,(.+?)(?:["'\s]|$)"#).expect("valid data URL regex")
});

/// A file sent alongside the reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Name the file after its detected image format, e.g. `image3.gif`.
    pub fn image(index: usize, bytes: Vec<u8>) -> Self {
        let filename = format!("image{}.{}", index, image_extension(&bytes));
        Self { filename, bytes }
    }
}

/// Decode up to [`MAX_ATTACHMENTS`] base64 `data:image/...` payloads.
pub(super) fn extract_data_images(text: &str) -> Vec<Attachment> {
    DATA_URL_RE
        .captures_iter(text)
        .filter_map(|caps| match STANDARD.decode(&caps[1]) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "skipping undecodable data URL image");
                None
            }
        })
        .take(MAX_ATTACHMENTS)
        .enumerate()
        .map(|(i, bytes)| Attachment::image(i + 1, bytes))
        .collect()
}

/// File name extension for raw image bytes.
pub(super) fn image_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png")
}
