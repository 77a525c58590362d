//! HTML helpers shared by the scrape tool and the page-title resolver.

use regex::Regex;
use std::sync::LazyLock;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid"));

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("meta pattern is valid"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid")
});

/// Title separators; the name is whatever precedes the earliest one.
const TITLE_SEPARATORS: [&str; 6] = [" | ", " - ", " – ", " — ", " · ", ": "];

/// Simple HTML-to-text extraction.
///
/// Strips tags and the contents of `script`/`style`, puts block elements on
/// their own lines and decodes the common entities.
pub fn extract_text(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' && in_tag {
            in_tag = false;
            building_tag = false;

            let tag = tag_name.to_lowercase();
            match tag.as_str() {
                "script" => in_script = true,
                "/script" => in_script = false,
                "style" => in_style = true,
                "/style" => in_style = false,
                _ => {}
            }
            if is_block_tag(&tag) {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if in_script || in_style {
            continue;
        }
        text.push(ch);
    }

    let text = decode_entities(&text);
    let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.retain(|l| !l.is_empty());
    lines.join("\n")
}

fn is_block_tag(tag: &str) -> bool {
    let name = tag.trim_start_matches('/');
    matches!(
        name,
        "p" | "br" | "div" | "section" | "article" | "li" | "tr" | "h1" | "h2" | "h3" | "h4"
            | "h5" | "h6" | "title" | "header" | "footer" | "table"
    )
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Content of the first `<meta>` whose `property` or `name` is `key`.
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut matches_key = false;
        let mut content = None;
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            let name = caps[1].to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str())?;
            match name.as_str() {
                "property" | "name" if value.eq_ignore_ascii_case(key) => matches_key = true,
                "content" => content = Some(decode_entities(value.trim())),
                _ => {}
            }
        }
        if matches_key { content.filter(|c| !c.is_empty()) } else { None }
    })
}

/// The document `<title>`, whitespace-collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let raw = TITLE.captures(html)?.get(1)?.as_str();
    let title = decode_entities(&raw.split_whitespace().collect::<Vec<_>>().join(" "));
    (!title.is_empty()).then_some(title)
}

/// Derive an entity name from a page: `og:site_name` first, then the title
/// with any trailing tagline after a separator removed.
pub fn entity_name(html: &str) -> Option<String> {
    if let Some(site_name) = meta_content(html, "og:site_name") {
        return Some(site_name);
    }
    let title = page_title(html)?;
    let name = TITLE_SEPARATORS
        .iter()
        .filter_map(|sep| title.find(sep))
        .min()
        .map_or(title.as_str(), |idx| &title[..idx])
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        let html = r#"
        <html>
        <head><title>Test</title></head>
        <body>
            <h1>Hello World</h1>
            <p>This is a <b>test</b> paragraph.</p>
            <script>var x = 1;</script>
            <style>.foo { color: red; }</style>
            <ul>
                <li>Item 1</li>
                <li>Item 2</li>
            </ul>
        </body>
        </html>"#;

        let text = extract_text(html);
        assert!(text.contains("Hello World"));
        assert!(text.contains("This is a test paragraph."));
        assert!(text.contains("Item 1\nItem 2"));
        assert!(!text.contains("var x = 1"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_text_entities() {
        let text = extract_text("<p>A &amp; B &lt; C &gt; D &quot;E&quot; &amp;lt;</p>");
        assert_eq!(text, "A & B < C > D \"E\" &lt;");
    }

    #[test]
    fn test_entity_name_prefers_site_name() {
        let html = r#"<head><meta property="og:site_name" content="Acme Corp"><title>Home | Acme</title></head>"#;
        assert_eq!(entity_name(html).as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn test_entity_name_from_title() {
        assert_eq!(
            entity_name("<title>\n  Acme Corp | Rockets for everyone </title>").as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(
            entity_name("<title>Initech - Software: Done</title>").as_deref(),
            Some("Initech")
        );
        assert_eq!(entity_name("<title>Globex</title>").as_deref(), Some("Globex"));
        assert_eq!(entity_name("<p>no title</p>"), None);
    }

    #[test]
    fn test_meta_content_single_quotes_and_order() {
        let html = "<meta content='Hooli' name='og:site_name'>";
        assert_eq!(meta_content(html, "og:site_name").as_deref(), Some("Hooli"));
    }

    #[test]
    fn test_truncate_chars_is_boundary_safe() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("hi", 5), ("hi", false));
    }
}
