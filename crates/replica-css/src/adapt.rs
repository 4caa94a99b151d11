//! Replay-time stylesheet adaptation.
//!
//! Two rewrites are applied to captured CSS before it is handed to the
//! replay document:
//!
//! - `(max|min)-device-(width|height)` media features become
//!   `(max|min)-(width|height)`, since the replay viewport is an element
//!   sized like the recorded window, not the device.
//! - Every selector with a `:hover` pseudo-class gains a sibling selector
//!   where `:hover` is the literal class `.\:hover`, so replay can simulate
//!   hover by toggling a class.
//!
//! The scan is span based (see [`crate::scanner`]) and only preludes are
//! rewritten; declarations, comments and whitespace are left as written.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use replica_common::warning::warn_once;

use crate::scanner::{CssError, CssRule, CssScanner, Span, is_ident_code_point};

/// The literal class that stands in for `:hover` on replay.
pub const HOVER_CLASS_SELECTOR: &str = r".\:hover";

static MEDIA_DEVICE_FEATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*(max|min)-device-(width|height)").expect("valid media regex")
});

/// Memo of adapted stylesheet text, keyed by the captured text.
///
/// One cache is owned per replay session. A capture tends to re-observe the
/// same stylesheet many times, and a hit returns the previous result
/// without scanning.
#[derive(Debug, Default, Clone)]
pub struct BuildCache {
    stylesheets: HashMap<String, String>,
    hits: usize,
    misses: usize,
}

impl BuildCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookups answered from the cache.
    #[must_use]
    pub const fn hits(&self) -> usize {
        self.hits
    }

    /// Lookups that required a scan.
    #[must_use]
    pub const fn misses(&self) -> usize {
        self.misses
    }

    /// Number of cached stylesheets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stylesheets.len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty()
    }

    /// Drop every cached entry and reset the counters.
    pub fn clear(&mut self) {
        self.stylesheets.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Adapt captured CSS for replay, memoized through `cache`.
///
/// Text that cannot be scanned is returned unchanged and a warning is
/// logged once per distinct failure.
pub fn adapt_css_for_replay(css_text: &str, cache: &mut BuildCache) -> String {
    if let Some(adapted) = cache.stylesheets.get(css_text) {
        cache.hits += 1;
        return adapted.clone();
    }
    cache.misses += 1;

    let adapted = match try_adapt_css(css_text) {
        Ok(adapted) => adapted,
        Err(error) => {
            warn_once("css", &format!("failed to adapt stylesheet for replay: {error}"));
            css_text.to_string()
        }
    };
    let _ = cache
        .stylesheets
        .insert(css_text.to_string(), adapted.clone());
    adapted
}

/// Adapt captured CSS for replay without caching.
///
/// # Errors
///
/// Returns a [`CssError`] if the stylesheet cannot be scanned into rules.
pub fn try_adapt_css(css_text: &str) -> Result<String, CssError> {
    let mut scanner = CssScanner::new(css_text);
    let rules = scanner.scan_stylesheet()?;

    let mut edits = Vec::new();
    collect_edits(&scanner, &rules, &mut edits);
    if edits.is_empty() {
        return Ok(css_text.to_string());
    }

    // Spans never overlap: every edit replaces exactly one prelude.
    edits.sort_by_key(|(span, _)| span.start);
    let chars = scanner.chars();
    let mut output = String::with_capacity(css_text.len() + edits.len() * 16);
    let mut cursor = 0;
    for (span, replacement) in edits {
        output.extend(&chars[cursor..span.start]);
        output.push_str(&replacement);
        cursor = span.end;
    }
    output.extend(&chars[cursor..]);
    Ok(output)
}

fn collect_edits(scanner: &CssScanner, rules: &[CssRule], edits: &mut Vec<(Span, String)>) {
    for rule in rules {
        match rule {
            CssRule::Qualified { prelude, .. } => {
                if let Some(rewritten) = add_hover_branches(&scanner.slice(*prelude)) {
                    edits.push((*prelude, rewritten));
                }
            }
            CssRule::At {
                prelude, rules, ..
            } => {
                let text = scanner.slice(*prelude);
                if MEDIA_DEVICE_FEATURE.is_match(&text) {
                    let rewritten = MEDIA_DEVICE_FEATURE.replace_all(&text, "($1-$2");
                    edits.push((*prelude, rewritten.into_owned()));
                }
                collect_edits(scanner, rules, edits);
            }
        }
    }
}

/// Rewrite one selector list, or `None` when no selector needs a hover
/// branch.
///
/// `.a:hover, .b` becomes `.a:hover, .b, .a.\:hover`. A branch that is
/// already present is not added again, which keeps the rewrite idempotent.
fn add_hover_branches(prelude: &str) -> Option<String> {
    let selectors = split_selector_list(prelude);
    let existing: Vec<&str> = selectors.iter().map(|s| s.trim()).collect();

    let mut additions: Vec<String> = Vec::new();
    for selector in &existing {
        let Some(branch) = replace_hover(selector) else {
            continue;
        };
        if !existing.contains(&branch.as_str()) && !additions.contains(&branch) {
            additions.push(branch);
        }
    }
    if additions.is_empty() {
        return None;
    }

    let body = prelude.trim_end();
    let trailing = &prelude[body.len()..];
    Some(format!("{body}, {}{trailing}", additions.join(", ")))
}

/// [§ 4.3.3 Selector lists](https://www.w3.org/TR/selectors-4/#grouping)
///
/// Split at commas outside of parentheses, brackets and strings.
fn split_selector_list(prelude: &str) -> Vec<&str> {
    let mut selectors = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in prelude.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                selectors.push(&prelude[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    selectors.push(&prelude[start..]);
    selectors
}

/// Replace every unescaped `:hover` pseudo-class with `.\:hover`.
///
/// `::hover`-like pseudo-elements, `\:hover` (already escaped) and longer
/// names such as `:hovered` are left alone, as is anything inside quotes.
fn replace_hover(selector: &str) -> Option<String> {
    let chars: Vec<char> = selector.chars().collect();
    let pattern: Vec<char> = ":hover".chars().collect();
    let mut output = String::with_capacity(selector.len() + 2);
    let mut quote: Option<char> = None;
    let mut replaced = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            output.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    output.push(next);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                output.push(c);
                i += 1;
            }
            '\\' => {
                output.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    output.push(next);
                }
                i += 2;
            }
            ':' if chars[i..].starts_with(&pattern)
                && (i == 0 || chars[i - 1] != ':')
                && !chars
                    .get(i + pattern.len())
                    .is_some_and(|&next| is_ident_code_point(next) || next == '(') =>
            {
                output.push_str(HOVER_CLASS_SELECTOR);
                replaced = true;
                i += pattern.len();
            }
            _ => {
                output.push(c);
                i += 1;
            }
        }
    }

    replaced.then_some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_selector_list_respects_nesting() {
        assert_eq!(
            split_selector_list(r#"a, b:is(c, d), [title="e,f"]"#),
            vec!["a", " b:is(c, d)", r#" [title="e,f"]"#]
        );
    }

    #[test]
    fn test_replace_hover_variants() {
        assert_eq!(replace_hover(".a:hover").as_deref(), Some(r".a.\:hover"));
        assert_eq!(
            replace_hover("a:hover > b:hover").as_deref(),
            Some(r"a.\:hover > b.\:hover")
        );
        assert_eq!(replace_hover(r".a.\:hover"), None);
        assert_eq!(replace_hover(".a::after"), None);
        assert_eq!(replace_hover(".a:hovered"), None);
        assert_eq!(replace_hover(r#"[title=":hover"]"#), None);
    }

    #[test]
    fn test_media_feature_rewrite() {
        let css = "@media only screen and (max-device-width: 1200px) { a { b: c } }";
        assert_eq!(
            try_adapt_css(css).unwrap(),
            "@media only screen and (max-width: 1200px) { a { b: c } }"
        );
    }
}
