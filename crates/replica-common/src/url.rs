//! URL resolution utilities.
//!
//! [§ 4.2.3 The base element](https://html.spec.whatwg.org/multipage/semantics.html#the-base-element)
//! [URL Standard](https://url.spec.whatwg.org/)
//!
//! Captured snapshots are replayed away from the page that produced them, so
//! every relative reference has to be made absolute at capture time.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// `url(...)` references inside CSS text: single-quoted, double-quoted or bare.
static URL_IN_CSS_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\((?:(')([^']*)'|(")([^"]*)"|([^)]*))\)"#).expect("valid css url regex")
});

/// Scheme-qualified or protocol-relative references.
static URL_PROTOCOL_MATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:[a-z+]+:)?//").expect("valid protocol regex"));

/// Bare `www.` hosts are left alone; they were never resolvable against a path.
static URL_WWW_MATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^www\.").expect("valid www regex"));

/// `data:` URIs.
static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^data:[^,]*,").expect("valid data uri regex"));

/// [§ 2.5 URLs](https://html.spec.whatwg.org/multipage/urls-and-fetching.html#resolving-urls)
///
/// Resolve a potentially relative URL against a base URL.
///
/// # Algorithm
///
/// STEP 1: "If url is an absolute URL, return url."
///
/// STEP 2: "Otherwise, resolve url relative to base."
///
/// Blank values, a missing base, or a base that does not parse leave the
/// value untouched.
#[must_use]
pub fn resolve_url(href: &str, base_url: Option<&str>) -> String {
    if href.trim().is_empty() {
        return href.to_string();
    }

    // STEP 1: already absolute.
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }

    // STEP 2: resolve against the base.
    let Some(base) = base_url.and_then(|b| Url::parse(b).ok()) else {
        return href.to_string();
    };
    base.join(href)
        .map_or_else(|_| href.to_string(), |resolved| resolved.to_string())
}

/// [§ 4.8.4.2.2 Srcset attributes](https://html.spec.whatwg.org/multipage/images.html#srcset-attributes)
///
/// Absolutize every image candidate URL in a `srcset` value, keeping the
/// width/density descriptors. Candidates are re-joined with `", "`.
#[must_use]
pub fn absolute_srcset(srcset: &str, base_url: Option<&str>) -> String {
    if srcset.trim().is_empty() {
        return srcset.to_string();
    }

    let chars: Vec<char> = srcset.chars().collect();
    let mut pos = 0;
    let mut output = Vec::new();

    let is_separator = |c: char| matches!(c, ',' | ' ' | '\t' | '\n' | '\r' | '\u{c}');
    let is_space = |c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{c}');

    loop {
        // "Collect a sequence of code points that are ASCII whitespace or U+002C COMMA"
        while pos < chars.len() && is_separator(chars[pos]) {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }

        // "Collect a sequence of code points that are not ASCII whitespace"
        let start = pos;
        while pos < chars.len() && !is_space(chars[pos]) {
            pos += 1;
        }
        let raw: String = chars[start..pos].iter().collect();

        if let Some(stripped) = raw.strip_suffix(',') {
            output.push(resolve_url(stripped, base_url));
            continue;
        }

        let url = resolve_url(&raw, base_url);
        let mut descriptors = String::new();
        let mut in_parens = false;
        loop {
            let Some(&c) = chars.get(pos) else {
                output.push(format!("{url}{descriptors}").trim().to_string());
                break;
            };
            if in_parens {
                if c == ')' {
                    in_parens = false;
                }
            } else if c == ',' {
                pos += 1;
                output.push(format!("{url}{descriptors}").trim().to_string());
                break;
            } else if c == '(' {
                in_parens = true;
            }
            descriptors.push(c);
            pos += 1;
        }
    }

    output.join(", ")
}

/// Rewrite every relative `url(...)` reference in `css_text` to an absolute
/// URL resolved against `href` (the stylesheet's or document's URL).
///
/// Protocol-qualified, protocol-relative, `www.` and `data:` references are
/// re-emitted unchanged. The original quoting style is kept.
#[must_use]
pub fn absolutify_css_urls(css_text: &str, href: &str) -> String {
    URL_IN_CSS_REF
        .replace_all(css_text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let path = caps
                .get(2)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map_or("", |m| m.as_str());
            let quote = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());

            if path.is_empty() {
                return whole.to_string();
            }
            if URL_PROTOCOL_MATCH.is_match(path)
                || URL_WWW_MATCH.is_match(path)
                || DATA_URI.is_match(path)
            {
                return format!("url({quote}{path}{quote})");
            }
            format!("url({quote}{}{quote})", resolve_url(path, Some(href)))
        })
        .into_owned()
}

/// Extract the lower-cased file extension of a URL path, ignoring query and
/// fragment. Returns `None` when the last path segment has no extension.
#[must_use]
pub fn file_extension(href: &str, base_url: Option<&str>) -> Option<String> {
    let resolved = resolve_url(href, base_url);
    let path = Url::parse(&resolved).map_or_else(
        |_| {
            resolved
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        },
        |url| url.path().to_string(),
    );
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    let (_, extension) = last_segment.rsplit_once('.')?;
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_ascii_lowercase())
    }
}
