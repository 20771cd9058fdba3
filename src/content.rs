//! Lightweight content helpers over rendered HTML
//!
//! Not a readability pipeline: plain tag-stripped text plus link and image
//! indexes, which is all the fetch subsystem itself needs (the SPA-shell
//! heuristic, the `text` output format, and the response indexes).

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

/// Extract visible text from HTML with a linear scan, skipping tags and the
/// bodies of `<script>`, `<style>`, and `<noscript>` elements. Runs of
/// whitespace collapse to a single space.
pub fn visible_text(html: &str) -> String {
    let mut out = String::new();
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<&'static str> = None;
    let mut pending_space = false;

    while let Some((i, c)) = chars.next() {
        if let Some(close) = skip_until {
            // Inside a raw-text element: scan for its close tag.
            let at_close = c == '<'
                && html.as_bytes()[i..]
                    .get(..close.len())
                    .is_some_and(|p| p.eq_ignore_ascii_case(close.as_bytes()));
            if at_close {
                skip_until = None;
                while let Some(&(_, c2)) = chars.peek() {
                    chars.next();
                    if c2 == '>' {
                        break;
                    }
                }
            }
            continue;
        }

        if c == '<' {
            let rest = &html[i + 1..];
            if tag_is(rest, "script") {
                skip_until = Some("</script");
            } else if tag_is(rest, "style") {
                skip_until = Some("</style");
            } else if tag_is(rest, "noscript") {
                skip_until = Some("</noscript");
            }
            // Consume to the end of the tag itself.
            while let Some(&(_, c2)) = chars.peek() {
                chars.next();
                if c2 == '>' {
                    break;
                }
            }
            pending_space = true;
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }

    out
}

/// True if `rest` (the text right after a `<`) opens the named tag, and not
/// merely a longer tag sharing the prefix (`<styled-box>` is not `<style>`).
fn tag_is(rest: &str, name: &str) -> bool {
    let rest = rest.as_bytes();
    let name = name.as_bytes();
    if rest.len() < name.len() || !rest[..name.len()].eq_ignore_ascii_case(name) {
        return false;
    }
    matches!(
        rest.get(name.len()),
        None | Some(b'>') | Some(b'/') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')
    )
}

/// Absolute http(s) links from `a[href]`, resolved against `base` and
/// deduplicated in document order.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    extract_refs(html, base, "a[href]", "href")
}

/// Absolute image URLs from `img[src]`, resolved against `base` and
/// deduplicated in document order.
pub fn extract_images(html: &str, base: &Url) -> Vec<String> {
    extract_refs(html, base, "img[src]", "src")
}

fn extract_refs(html: &str, base: &Url, selector: &str, attr: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for element in document.select(&selector) {
        if let Some(value) = element.value().attr(attr) {
            if let Ok(resolved) = base.join(value) {
                if (resolved.scheme() == "http" || resolved.scheme() == "https")
                    && seen.insert(resolved.as_str().to_string())
                {
                    urls.push(resolved.into());
                }
            }
        }
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_strips_tags() {
        let html = "<html><body><h1>Title</h1><p>Hello <b>world</b></p></body></html>";
        assert_eq!(visible_text(html), "Title Hello world");
    }

    #[test]
    fn test_visible_text_skips_scripts_and_styles() {
        let html = r#"<body><style>.x { color: red }</style>
            <script>var hidden = "<p>nope</p>";</script>
            <noscript>enable javascript</noscript>
            <p>shown</p></body>"#;
        assert_eq!(visible_text(html), "shown");
    }

    #[test]
    fn test_visible_text_collapses_whitespace() {
        let html = "<p>a\n\n   b</p>\t<p>c</p>";
        assert_eq!(visible_text(html), "a b c");
    }

    #[test]
    fn test_visible_text_of_empty() {
        assert_eq!(visible_text(""), "");
        assert_eq!(visible_text("<div></div>"), "");
    }

    #[test]
    fn test_extract_links() {
        let base = Url::parse("https://example.com/page").unwrap();
        let html = r#"
            <a href="/about">About</a>
            <a href="https://example.com/contact">Contact</a>
            <a href="https://other.com/page">Other</a>
            <a href="/about">Duplicate</a>
            <a href="mailto:x@example.com">Mail</a>
        "#;
        let links = extract_links(html, &base);
        assert_eq!(
            links,
            vec![
                "https://example.com/about",
                "https://example.com/contact",
                "https://other.com/page",
            ]
        );
    }

    #[test]
    fn test_extract_images() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"<img src="/hero.png"><img src="https://cdn.example.com/a.webp">"#;
        let images = extract_images(html, &base);
        assert_eq!(
            images,
            vec![
                "https://example.com/hero.png",
                "https://cdn.example.com/a.webp",
            ]
        );
    }
}
