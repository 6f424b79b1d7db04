//! Conversion of raw bytes into plain text, keyed by MIME type.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, node::Node};

use crate::types::RagError;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Converts raw document bytes into plain text.
///
/// Supported content types: `text/html`, `application/json`, and any
/// `text/*` subtype (taken as UTF-8). Everything else fails with
/// [`RagError::Conversion`].
pub fn to_plain_text(bytes: &[u8], content_type: &str) -> Result<String, RagError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => {
            let html = decode_utf8(bytes)?;
            Ok(html_to_text(&html))
        }
        "application/json" => {
            let value: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|err| RagError::Conversion(format!("invalid JSON: {err}")))?;
            let mut out = String::new();
            collect_json_text(&value, &mut out);
            Ok(collapse_whitespace(&out))
        }
        other if other.starts_with("text/") => {
            let text = decode_utf8(bytes)?;
            Ok(text.trim().to_string())
        }
        other => Err(RagError::Conversion(format!(
            "unsupported content type '{other}'"
        ))),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, RagError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|err| RagError::Conversion(format!("content is not valid UTF-8: {err}")))
}

/// Extracts visible text from an HTML document, skipping script/style/head
/// subtrees and collapsing runs of whitespace.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    for node in document.tree.root().descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| matches!(el.name(), "script" | "style" | "noscript" | "head"))
                    .unwrap_or(false)
            });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    collapse_whitespace(&out)
}

fn collect_json_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(text) => {
            out.push_str(text);
            out.push('\n');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_text(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_json_text(item, out);
            }
        }
        _ => {}
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_strips_markup_and_scripts() {
        let html = r#"<html><head><title>skip me</title><style>body{}</style></head>
            <body><h1>Heading</h1><p>First   paragraph.</p>
            <script>var hidden = 1;</script><p>Second.</p></body></html>"#;
        let text = to_plain_text(html.as_bytes(), "text/html").unwrap();
        assert_eq!(text, "Heading First paragraph. Second.");
        assert!(!text.contains("hidden"));
        assert!(!text.contains("skip me"));
    }

    #[test]
    fn json_flattens_string_values() {
        let json = serde_json::json!({
            "title": "Overview",
            "sections": [{"content": "First section."}, {"content": "Second section."}],
            "count": 2
        });
        let text = to_plain_text(json.to_string().as_bytes(), "application/json").unwrap();
        assert!(text.contains("Overview"));
        assert!(text.contains("First section."));
        assert!(!text.contains('2'));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = to_plain_text(b"  some words  ", "text/plain; charset=utf-8").unwrap();
        assert_eq!(text, "some words");
    }

    #[test]
    fn unsupported_type_is_a_conversion_error() {
        let err = to_plain_text(b"\x00", "application/pdf").unwrap_err();
        assert!(matches!(err, RagError::Conversion(_)));
    }

    #[test]
    fn invalid_utf8_is_a_conversion_error() {
        let err = to_plain_text(&[0xff, 0xfe], "text/plain").unwrap_err();
        assert!(matches!(err, RagError::Conversion(_)));
    }
}
