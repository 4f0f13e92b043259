//! Whitespace compaction for HTML pages and template bodies.

use std::sync::LazyLock;

use regex::Regex;

use crate::application::render::split_front_matter;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const TAGS: [(&str, &str); 3] = [("{{", "}}"), ("{%", "%}"), ("{#", "#}")];

/// Drop newlines, then collapse every whitespace run to one space.
pub fn collapse_whitespace(text: &str) -> String {
    let joined = text.replace(['\r', '\n'], "");
    WHITESPACE_RUN.replace_all(&joined, " ").into_owned()
}

/// Collapse literal markup in a template while leaving its front matter and every
/// `{{ }}`, `{% %}` and `{# #}` tag untouched.
pub fn compact_template(source: &str) -> String {
    let (_, body) = split_front_matter(source);
    let header = &source[..source.len() - body.len()];

    let mut out = String::with_capacity(source.len());
    out.push_str(header);

    let mut rest = body;
    while let Some((start, close)) = next_tag(rest) {
        out.push_str(&collapse_whitespace(&rest[..start]));
        let tag = &rest[start..];
        match tag[2..].find(close) {
            Some(end) => {
                let tag_len = 2 + end + close.len();
                out.push_str(&tag[..tag_len]);
                rest = &tag[tag_len..];
            }
            None => {
                out.push_str(tag);
                return out;
            }
        }
    }
    out.push_str(&collapse_whitespace(rest));
    out
}

/// Byte offset of the next tag opener and the matching closer.
fn next_tag(text: &str) -> Option<(usize, &'static str)> {
    TAGS.iter()
        .filter_map(|(open, close)| text.find(open).map(|at| (at, *close)))
        .min_by_key(|(at, _)| *at)
}
