//! Turning raw generator output into a Discord reply.
//!
//! Generator output is HTML. Inline images, colour palettes and layered
//! images become attachments; the remaining markup is rewritten as Discord
//! markdown and fitted to the message length limit.

mod attachments;
mod layers;
mod markup;
mod palette;
mod raster;

use std::time::Duration;

use reqwest::Client;

pub use attachments::{Attachment, MAX_ATTACHMENTS};
pub use markup::{DIVIDER, html_to_markdown};

/// Discord's message length limit.
pub const REPLY_LIMIT: usize = 2000;
/// Length kept when a reply is cut.
pub const TRUNCATED_LENGTH: usize = 1900;
pub const TRUNCATION_SUFFIX: &str = " ... (full result was too long)";
pub const RATE_LIMIT_NOTE: &str = "(**Note**: Bot is being rate limited by Discord API) ";
pub const EMPTY_REPLY: &str = "*(empty result)*";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("SVG render failed: {0}")]
    Svg(String),

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("image download failed: {0}")]
    Fetch(String),

    #[error("image decode failed: {0}")]
    Decode(String),
}

/// Reply body and files, before the final text pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReply {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl RenderedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

pub struct Renderer {
    client: Client,
}

impl Renderer {
    pub fn new(request_timeout: Duration) -> Result<Self, RenderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RenderError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    /// Extract attachments and convert markup. Rendering failures for a
    /// single image are logged and skipped.
    pub async fn render(&self, raw: &str) -> RenderedReply {
        let mut files = attachments::extract_data_images(raw);
        let text = palette::render_palettes(raw, &mut files);
        let text = layers::render_layers(&self.client, &text, &mut files).await;
        let text = html_to_markdown(&text);

        files.truncate(MAX_ATTACHMENTS);
        RenderedReply {
            text,
            attachments: files,
        }
    }
}

/// Final text pass: rate-limit note, length limit, search prefix, and the
/// placeholder for an empty reply.
pub fn finalize_reply(text: &str, rate_limited: bool, found_generator: Option<&str>) -> String {
    let mut text = if rate_limited {
        format!("{RATE_LIMIT_NOTE}{text}")
    } else {
        text.to_string()
    };

    if text.chars().count() > REPLY_LIMIT {
        let kept: String = text.trim().chars().take(TRUNCATED_LENGTH).collect();
        text = format!("{kept}{TRUNCATION_SUFFIX}");
    }
    let mut text = text.trim().to_string();

    if let Some(name) = found_generator {
        text = format!("**{name}:** {text}");
    }
    if text.is_empty() {
        return EMPTY_REPLY.to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    fn renderer() -> Renderer {
        Renderer::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn long_replies_are_truncated() {
        let text = "x".repeat(2500);
        let reply = finalize_reply(&text, false, None);
        assert_eq!(reply.chars().count(), TRUNCATED_LENGTH + TRUNCATION_SUFFIX.len());
        assert!(reply.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn exactly_limit_is_kept() {
        let text = "y".repeat(REPLY_LIMIT);
        assert_eq!(finalize_reply(&text, false, None), text);
    }

    #[test]
    fn rate_limit_note_and_search_prefix() {
        insta::assert_snapshot!(
            finalize_reply("a cat  ", true, Some("animal")),
            @"**animal:** (**Note**: Bot is being rate limited by Discord API) a cat"
        );
    }

    #[test]
    fn empty_result_placeholder() {
        assert_eq!(finalize_reply(" \n ", false, None), EMPTY_REPLY);
    }

    #[tokio::test]
    async fn renders_markup_and_inline_images() {
        let gif = STANDARD.encode(b"GIF89a\x01\x00\x01\x00");
        let raw = format!(r#"<b>Loot</b><br><img src="data:image/gif;base64,{gif}">a&nbsp;coin"#);

        let reply = renderer().render(&raw).await;

        assert_eq!(reply.text, "**Loot**\na coin");
        assert_eq!(reply.attachments.len(), 1);
        assert_eq!(reply.attachments[0].filename, "image1.gif");
    }

    #[tokio::test]
    async fn palette_marker_becomes_colors_line() {
        let raw = r#"<div data-bot-indicator="---color-palette-plugin-output---" data-colors="red%3C%7C%7C%7C%3Egreen">::</div>"#;

        let reply = renderer().render(raw).await;

        assert_eq!(reply.text, "Colors: red green");
        assert_eq!(reply.attachments[0].filename, "palette.png");
    }
}
