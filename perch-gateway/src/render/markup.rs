//! HTML fragments to Discord markdown.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// What `<hr>` becomes: a struck-through run of spaces.
pub const DIVIDER: &str = "~~-                                     -~~";

/// Ordered rewrite rules; later rules see the output of earlier ones.
static RULES: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    [
        (r"<b>([^<]+?)</b>", "**${1}**".to_string()),
        (r"<i>([^<]+?)</i>", "*${1}*".to_string()),
        (r"<u>([^<]+?)</u>", "__${1}__".to_string()),
        (r"<br ?/?>", "\n".to_string()),
        (r"<hr>", DIVIDER.to_string()),
        (r"<hr [^<>]*>", DIVIDER.to_string()),
        // Inline data images are sent as attachments.
        (r#"<img [^>]*src=['"]data:image/([^"']+)['"][^>]*>"#, String::new()),
        (r#"<img [^>]*src=['"]([^"']+)['"][^>]*>"#, " ${1} ".to_string()),
        (r#"<a [^>]*href=['"]([^"']+)['"][^>]*>([^<]+)</a>"#, "${2}: ${1} ".to_string()),
        (r"&#160;", " ".to_string()),
        (r"&nbsp;", " ".to_string()),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid markup rule"),
            replacement,
        )
    })
    .collect()
});

/// Apply the markup rules, then fall back to plain text if tags remain.
pub fn html_to_markdown(html: &str) -> String {
    let mut text = html.to_string();
    for (pattern, replacement) in RULES.iter() {
        text = pattern.replace_all(&text, replacement.as_str()).into_owned();
    }
    if text.contains("</") {
        text = fragment_text(&text);
    }
    text
}

/// Concatenated text nodes of an HTML fragment.
fn fragment_text(html: &str) -> String {
    Html::parse_fragment(html).root_element().text().collect()
}
