//! SVG rasterization shared by the palette and layer composers.

use std::io::Cursor;
use std::sync::LazyLock;

use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::tiny_skia;
use resvg::usvg;

use super::RenderError;

/// Largest width or height, in pixels, of a rendered image.
pub(super) const MAX_SIDE: u32 = 4096;

/// No text is ever drawn, so the font database stays empty.
static SVG_OPTIONS: LazyLock<usvg::Options> = LazyLock::new(usvg::Options::default);

fn render_pixmap(svg: &str) -> Result<tiny_skia::Pixmap, RenderError> {
    let tree = usvg::Tree::from_data(svg.as_bytes(), &SVG_OPTIONS)
        .map_err(|e| RenderError::Svg(e.to_string()))?;

    let size = tree.size().to_int_size();
    if size.width() > MAX_SIDE || size.height() > MAX_SIDE {
        return Err(RenderError::Svg(format!(
            "{}x{} exceeds the {MAX_SIDE}px limit",
            size.width(),
            size.height()
        )));
    }
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| RenderError::Svg("pixmap allocation failed".into()))?;

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
    Ok(pixmap)
}

pub(super) fn svg_to_png(svg: &str) -> Result<Vec<u8>, RenderError> {
    render_pixmap(svg)?
        .encode_png()
        .map_err(|e| RenderError::Encode(format!("PNG encode: {e}")))
}

/// Rasterize and encode as JPEG. The SVG must paint an opaque background.
pub(super) fn svg_to_jpeg(svg: &str) -> Result<Vec<u8>, RenderError> {
    let pixmap = render_pixmap(svg)?;
    let rgba = RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
        .ok_or_else(|| RenderError::Encode("pixmap size mismatch".into()))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| RenderError::Encode(format!("JPEG encode: {e}")))?;
    Ok(bytes)
}

pub(super) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
