//! Colour-palette plugin output: a strip of colour swatches.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::{NoExpand, Regex};
use tracing::warn;

use super::raster::{svg_to_png, xml_escape};
use super::{Attachment, RenderError};

const STRIP_WIDTH: f32 = 500.0;
const STRIP_HEIGHT: f32 = 100.0;
const COLOR_SEPARATOR: &str = "<|||>";

static PALETTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"data-bot-indicator="---color-palette-plugin-output---" data-colors="([^"]+)""#,
    )
    .expect("valid palette regex")
});

static PALETTE_DIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div data-bot-indicator="---color-palette-plugin-output---".*?>.+?</div>"#)
        .expect("valid palette div regex")
});

/// Render every palette marker in `text` to a PNG strip and replace its
/// `<div>` with a `Colors: ...` line.
pub(super) fn render_palettes(text: &str, attachments: &mut Vec<Attachment>) -> String {
    let palettes: Vec<Vec<String>> = PALETTE_RE
        .captures_iter(text)
        .map(|caps| decode_colors(&caps[1]))
        .collect();

    let mut out = text.to_string();
    for colors in palettes {
        match palette_png(&colors) {
            Ok(png) => attachments.push(Attachment::new("palette.png", png)),
            Err(err) => warn!(error = %err, "failed to render colour palette"),
        }
        let summary = format!("Colors: {}", colors.join(" "));
        out = PALETTE_DIV_RE.replacen(&out, 1, NoExpand(&summary)).into_owned();
    }
    out
}

fn decode_colors(raw: &str) -> Vec<String> {
    percent_decode_str(raw)
        .decode_utf8_lossy()
        .split(COLOR_SEPARATOR)
        .map(str::to_string)
        .collect()
}

fn palette_svg(colors: &[String]) -> String {
    let segment = STRIP_WIDTH / colors.len().max(1) as f32;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="{w}" height="{h}" fill="white"/>"#,
        w = STRIP_WIDTH,
        h = STRIP_HEIGHT
    );
    for (i, color) in colors.iter().enumerate() {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="0" width="{segment}" height="{h}" fill="{fill}"/>"#,
            x = i as f32 * segment,
            h = STRIP_HEIGHT,
            fill = xml_escape(color.trim())
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn palette_png(colors: &[String]) -> Result<Vec<u8>, RenderError> {
    svg_to_png(&palette_svg(colors))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = r#"<div data-bot-indicator="---color-palette-plugin-output---" data-colors="%23ff0000%3C%7C%7C%7C%3Eblue"><span>swatches</span></div>"#;

    #[test]
    fn decodes_percent_encoded_colors() {
        assert_eq!(
            decode_colors("%23ff0000%3C%7C%7C%7C%3Eblue"),
            vec!["#ff0000".to_string(), "blue".to_string()]
        );
    }

    #[test]
    fn replaces_marker_and_attaches_png() {
        let mut attachments = Vec::new();
        let text = render_palettes(&format!("before {MARKER} after"), &mut attachments);

        assert_eq!(text, "before Colors: #ff0000 blue after");
        assert_eq!(attachments.len(), 1);
        assert_eq!(&attachments[0].bytes[..4], b"\x89PNG");
    }

    #[test]
    fn segments_split_width_evenly() {
        let svg = palette_svg(&["red".into(), "green".into(), "blue".into(), "black".into()]);
        assert!(svg.contains(r#"<rect x="375" y="0" width="125" height="100" fill="black"/>"#));
    }

    #[test]
    fn text_without_marker_is_untouched() {
        let mut attachments = Vec::new();
        assert_eq!(render_palettes("plain", &mut attachments), "plain");
        assert!(attachments.is_empty());
    }
}
