use chrono::{DateTime, Utc};
use regex::Regex;
use once_cell::sync::Lazy;

use crate::feed_item::FeedItem;

const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "s", "code", "pre", "a"];
const DESCRIPTION_MAX_CHARS: usize = 500;

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static A_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a[^>]*>").unwrap());
static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)href\s*=\s*"([^"]*)"|href\s*=\s*'([^']*)'"#).unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z]+)[^>]*>").unwrap());
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

fn rename_equivalents(text: &str) -> String {
    let pairs = [
        ("strong", "b"),
        ("em", "i"),
        ("ins", "u"),
        ("strike", "s"),
        ("del", "s"),
    ];
    let mut out = text.to_string();
    for (from, to) in pairs {
        let open = Regex::new(&format!(r"(?i)<{from}>")).unwrap();
        let close = Regex::new(&format!(r"(?i)</{from}>")).unwrap();
        out = open.replace_all(&out, format!("<{to}>")).to_string();
        out = close.replace_all(&out, format!("</{to}>")).to_string();
    }
    out
}

fn clean_a_tags(text: &str) -> String {
    A_OPEN_RE
        .replace_all(text, |caps: &regex::Captures| {
            let tag = &caps[0];
            if let Some(href_caps) = HREF_RE.captures(tag) {
                let href = href_caps
                    .get(1)
                    .or_else(|| href_caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                let escaped = escape_text(&unescape_entities(href));
                format!(r#"<a href="{escaped}">"#)
            } else {
                "<a>".to_string()
            }
        })
        .to_string()
}

fn strip_attributes_from_allowed_tags(text: &str) -> String {
    let mut out = text.to_string();
    for tag in ["b", "i", "u", "s", "code", "pre"] {
        let open = Regex::new(&format!(r"(?i)<{tag}[^>]*>")).unwrap();
        let close = Regex::new(&format!(r"(?i)</{tag}[^>]*>")).unwrap();
        out = open.replace_all(&out, format!("<{tag}>")).to_string();
        out = close.replace_all(&out, format!("</{tag}>")).to_string();
    }
    out
}

fn is_allowed_tag(tag_content: &str) -> bool {
    let lowered = tag_content.to_ascii_lowercase();
    ALLOWED_TAGS.iter().any(|t| {
        lowered.starts_with(&format!("<{t}")) || lowered.starts_with(&format!("</{t}"))
    })
}

/// Replace every tag with a placeholder (allowed tags) or drop it
/// (everything else), then escape the remaining text content, then
/// restore the placeholders — avoids escaping the tags themselves.
fn remove_disallowed_tags_and_escape_text(text: &str) -> String {
    let mut placeholders = Vec::new();
    let protected = TAG_RE.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        if is_allowed_tag(whole) {
            placeholders.push(whole.to_string());
            format!("\u{0}{}\u{0}", placeholders.len() - 1)
        } else {
            String::new()
        }
    });

    let unescaped = unescape_entities(&protected);
    let escaped = escape_text(&unescaped);

    let placeholder_re = Regex::new("\u{0}(\\d+)\u{0}").unwrap();
    placeholder_re
        .replace_all(&escaped, |caps: &regex::Captures| {
            let idx: usize = caps[1].parse().unwrap();
            placeholders[idx].clone()
        })
        .to_string()
}

/// Remove any `</x>` lacking a matching earlier `<x>`, and at the end
/// auto-close any tag left open (spec.md §4.14 rule 8).
fn balance_tags(text: &str) -> String {
    let paired = ["b", "i", "u", "s", "code", "pre"];
    let self_closing = ["a"];

    struct TagMatch {
        name: String,
        is_closing: bool,
        start: usize,
        end: usize,
    }

    let tags: Vec<TagMatch> = TAG_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0).unwrap();
            let name = caps[2].to_ascii_lowercase();
            if paired.contains(&name.as_str()) || self_closing.contains(&name.as_str()) {
                Some(TagMatch {
                    name,
                    is_closing: !caps[1].is_empty(),
                    start: whole.start(),
                    end: whole.end(),
                })
            } else {
                None
            }
        })
        .collect();

    if tags.is_empty() {
        return text.to_string();
    }

    let mut stack: Vec<&TagMatch> = Vec::new();
    let mut result = String::new();
    let mut last_pos = 0;

    for tag in &tags {
        result.push_str(&text[last_pos..tag.start]);

        if self_closing.contains(&tag.name.as_str()) {
            result.push_str(&text[tag.start..tag.end]);
        } else if tag.is_closing {
            if let Some(pos) = stack.iter().rposition(|t| t.name == tag.name) {
                while stack.len() > pos + 1 {
                    let closed = stack.pop().unwrap();
                    result.push_str(&format!("</{}>", closed.name));
                }
                stack.pop();
                result.push_str(&text[tag.start..tag.end]);
            }
            // else: unmatched closing tag, drop it.
        } else {
            stack.push(tag);
            result.push_str(&text[tag.start..tag.end]);
        }

        last_pos = tag.end;
    }
    result.push_str(&text[last_pos..]);

    while let Some(tag) = stack.pop() {
        result.push_str(&format!("</{}>", tag.name));
    }

    result
}

fn collapse_whitespace(text: &str) -> String {
    let text = SPACES_RE.replace_all(text, " ");
    let text = NEWLINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// C14 sanitizer: reduces arbitrary source HTML to the chat backend's
/// restricted tag subset `{b, i, u, s, code, pre, a}` (spec.md §4.14).
pub fn sanitize_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = COMMENT_RE.replace_all(text, "");
    let text = SCRIPT_RE.replace_all(&text, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = rename_equivalents(&text);
    let text = clean_a_tags(&text);
    let text = strip_attributes_from_allowed_tags(&text);
    let text = remove_disallowed_tags_and_escape_text(&text);
    let text = balance_tags(&text);
    collapse_whitespace(&text)
}

/// Plain-text fallback: strip all tags, unescape entities, collapse
/// whitespace (spec.md §4.14).
pub fn strip_html_tags(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = COMMENT_RE.replace_all(text, "");
    let no_tags = Regex::new(r"<[^>]+>").unwrap().replace_all(&text, "");
    let unescaped = unescape_entities(&no_tags);
    let collapsed = Regex::new(r"\s+").unwrap().replace_all(&unescaped, " ");
    collapsed.trim().to_string()
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

/// C14 message formatter: composes the notification text for one item.
pub fn format_message(item: &FeedItem, feed_name: &str, use_html: bool) -> String {
    let title = if use_html { sanitize_html(&item.title) } else { strip_html_tags(&item.title) };
    let mut parts = vec![format!("[{feed_name}]"), title];

    if let Some(description) = &item.description {
        let mut desc = if use_html {
            sanitize_html(description)
        } else {
            strip_html_tags(description)
        };
        if desc.chars().count() > DESCRIPTION_MAX_CHARS {
            desc = desc.chars().take(DESCRIPTION_MAX_CHARS).collect::<String>() + "...";
        }
        parts.push(desc);
    }

    if let Some(pub_date) = item.pub_date {
        parts.push(format_pub_date(pub_date));
    }

    parts.push(item.link.clone());
    parts.join("\n")
}

fn format_pub_date(d: DateTime<Utc>) -> String {
    d.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
