//! Image-layer-combiner plugin output: stacked images flattened into one JPEG.

use std::io::Cursor;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageReader;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use super::raster::{MAX_SIDE, svg_to_jpeg, xml_escape};
use super::{Attachment, RenderError};

const DEFAULT_WIDTH: f64 = 400.0;
const LIST_SEPARATOR: &str = "<|||>";
/// Largest accepted layer file
const MAX_LAYER_BYTES: usize = 10 * 1024 * 1024;
/// Layers are decoded at full size while compositing
const MAX_LAYER_SIDE: u32 = 2 * MAX_SIDE;

static COMBINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"data-bot-indicator="---image-layer-combiner-plugin-output---" data-image-urls="([^"]+)" data-image-filters="([^"]+)" data-width="([^"]*)" data-height="([^"]*)""#,
    )
    .expect("valid combiner regex")
});

static COMBINER_DIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div data-bot-indicator="---image-layer-combiner-plugin-output---".+?>.+?</div>"#)
        .expect("valid combiner div regex")
});

#[derive(Debug, Clone, PartialEq)]
struct CombinerSpec {
    urls: Vec<String>,
    filters: Vec<String>,
    width: f64,
    height: Option<f64>,
}

#[derive(Debug)]
struct Layer {
    mime: &'static str,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

/// Composite every combiner marker in `text` and strip the marker `<div>`s.
pub(super) async fn render_layers(
    client: &Client,
    text: &str,
    attachments: &mut Vec<Attachment>,
) -> String {
    let specs: Vec<CombinerSpec> = COMBINER_RE
        .captures_iter(text)
        .map(|caps| parse_spec(&caps))
        .collect();

    for spec in &specs {
        match compose(client, spec).await {
            Ok(jpeg) => attachments.push(Attachment::new("layers.jpg", jpeg)),
            Err(err) => warn!(error = %err, "failed to combine image layers"),
        }
    }

    if specs.is_empty() {
        return text.to_string();
    }
    COMBINER_DIV_RE.replace_all(text, "").into_owned()
}

fn split_list(raw: &str) -> Vec<String> {
    percent_decode_str(raw)
        .decode_utf8_lossy()
        .split(LIST_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// Dimension attribute such as `400px`, capped at [`MAX_SIDE`]; anything
/// unusable yields `None`.
fn parse_dimension(raw: &str) -> Option<f64> {
    let value = raw.trim();
    let value = value.strip_suffix("px").unwrap_or(value);
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.min(f64::from(MAX_SIDE)))
}

async fn download_capped(client: &Client, url: &str) -> Result<Vec<u8>, RenderError> {
    let fetch_err = |e: reqwest::Error| RenderError::Fetch(format!("{url}: {e}"));
    let too_large = || RenderError::Fetch(format!("{url}: larger than {MAX_LAYER_BYTES} bytes"));

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;
    if response
        .content_length()
        .is_some_and(|len| len > MAX_LAYER_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        if bytes.len() + chunk.len() > MAX_LAYER_BYTES {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn parse_spec(caps: &regex::Captures<'_>) -> CombinerSpec {
    CombinerSpec {
        urls: split_list(&caps[1]),
        filters: split_list(&caps[2]),
        width: parse_dimension(&caps[3]).unwrap_or(DEFAULT_WIDTH),
        height: parse_dimension(&caps[4]),
    }
}

async fn fetch_layer(client: &Client, url: &str) -> Result<Layer, RenderError> {
    let bytes = match url.strip_prefix("data:") {
        Some(data) => {
            let (_, payload) = data
                .split_once(',')
                .ok_or_else(|| RenderError::Fetch("malformed data URL for layer".into()))?;
            STANDARD
                .decode(payload.trim())
                .map_err(|e| RenderError::Decode(e.to_string()))?
        }
        None => download_capped(client, url).await?,
    };
    if bytes.len() > MAX_LAYER_BYTES {
        return Err(RenderError::Decode(format!(
            "layer larger than {MAX_LAYER_BYTES} bytes"
        )));
    }

    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| RenderError::Decode(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| RenderError::Decode(format!("unknown image format for {url}")))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| RenderError::Decode(e.to_string()))?;
    if width > MAX_LAYER_SIDE || height > MAX_LAYER_SIDE {
        return Err(RenderError::Decode(format!(
            "layer is {width}x{height}, over the {MAX_LAYER_SIDE}px limit"
        )));
    }

    Ok(Layer {
        mime: format.to_mime_type(),
        bytes,
        width,
        height,
    })
}

fn composite_svg(layers: &[Layer], filters: &[String], width: f64, height: f64) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><rect width="{width}" height="{height}" fill="white"/>"#
    );
    // Layers are listed top-first; paint bottom-first.
    for (i, layer) in layers.iter().enumerate().rev() {
        let filter = filters.get(i).map(|f| f.trim()).unwrap_or("none");
        let filter_attr = if filter.is_empty() || filter == "none" {
            String::new()
        } else {
            format!(r#" filter="{}""#, xml_escape(filter))
        };
        svg.push_str(&format!(
            r#"<image x="0" y="0" width="{width}" height="{height}" preserveAspectRatio="none"{filter_attr} xlink:href="data:{};base64,{}"/>"#,
            layer.mime,
            STANDARD.encode(&layer.bytes)
        ));
    }
    svg.push_str("</svg>");
    svg
}

async fn compose(client: &Client, spec: &CombinerSpec) -> Result<Vec<u8>, RenderError> {
    let mut layers = Vec::with_capacity(spec.urls.len());
    for url in &spec.urls {
        layers.push(fetch_layer(client, url).await?);
    }
    let first = layers
        .first()
        .ok_or_else(|| RenderError::Decode("combiner has no layers".into()))?;

    let width = spec.width.round();
    let height = spec
        .height
        .unwrap_or_else(|| width / f64::from(first.width.max(1)) * f64::from(first.height))
        .round()
        .clamp(1.0, f64::from(MAX_SIDE));
    debug!(layers = layers.len(), width, height, "Combining image layers");

    svg_to_jpeg(&composite_svg(&layers, &spec.filters, width, height))
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::*;

    fn png_data_url(width: u32, height: u32) -> String {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn dimension_strips_px() {
        assert_eq!(parse_dimension("300px"), Some(300.0));
        assert_eq!(parse_dimension("250"), Some(250.0));
        assert_eq!(parse_dimension(""), None);
        assert_eq!(parse_dimension("auto"), None);
    }

    #[test]
    fn dimensions_are_capped() {
        let text = r#"<div data-bot-indicator="---image-layer-combiner-plugin-output---" data-image-urls="a.png" data-image-filters="none" data-width="100000000px" data-height="100000000px">x</div>"#;
        let caps = COMBINER_RE.captures(text).unwrap();

        let spec = parse_spec(&caps);

        assert_eq!(spec.width, f64::from(MAX_SIDE));
        assert_eq!(spec.height, Some(f64::from(MAX_SIDE)));
    }

    #[tokio::test]
    async fn tall_first_layer_height_is_capped() {
        let client = Client::new();
        let spec = CombinerSpec {
            urls: vec![png_data_url(1, 200)],
            filters: vec!["none".into()],
            width: 100.0,
            height: None,
        };

        let jpeg = compose(&client, &spec).await.unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, MAX_SIDE));
    }

    #[test]
    fn spec_defaults_width() {
        let html = r#"<div data-bot-indicator="---image-layer-combiner-plugin-output---" data-image-urls="a.png%3C%7C%7C%7C%3Eb.png" data-image-filters="none%3C%7C%7C%7C%3Egrayscale(1)" data-width="" data-height=""></div>"#;
        let caps = COMBINER_RE.captures(html).unwrap();
        assert_eq!(
            parse_spec(&caps),
            CombinerSpec {
                urls: vec!["a.png".into(), "b.png".into()],
                filters: vec!["none".into(), "grayscale(1)".into()],
                width: 400.0,
                height: None,
            }
        );
    }

    #[test]
    fn composite_paints_last_layer_first() {
        let layer = |mime| Layer {
            mime,
            bytes: vec![1, 2, 3],
            width: 1,
            height: 1,
        };
        let svg = composite_svg(
            &[layer("image/png"), layer("image/jpeg")],
            &["blur(2px)".into()],
            10.0,
            10.0,
        );
        let jpeg_at = svg.find("image/jpeg").unwrap();
        let png_at = svg.find("image/png").unwrap();
        assert!(jpeg_at < png_at);
        assert!(svg.contains(r#"filter="blur(2px)""#));
        assert_eq!(svg.matches("filter=").count(), 1);
    }

    #[tokio::test]
    async fn height_follows_first_layer_aspect_ratio() {
        let html = format!(
            r#"x<div data-bot-indicator="---image-layer-combiner-plugin-output---" data-image-urls="{}" data-image-filters="none" data-width="200px" data-height=""><img></div>y"#,
            png_data_url(40, 10)
        );
        let mut attachments = Vec::new();

        let text = render_layers(&Client::new(), &html, &mut attachments).await;

        assert_eq!(text, "xy");
        assert_eq!(attachments.len(), 1);
        let decoded = image::load_from_memory(&attachments[0].bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 50));
    }
}
