//! Style text split across several text nodes.
//!
//! A `<style>` element may hold its CSS in more than one text child (each
//! `appendChild` of a text node adds one). Capture records a single CSS
//! string with [`SPLIT_MARKER`] at every child boundary, and rebuild puts
//! the pieces back in as many text children, so that later incremental
//! mutations addressing a particular text child still line up.

use crate::adapt::{BuildCache, adapt_css_for_replay};

/// In-band boundary token between sibling style text nodes.
pub const SPLIT_MARKER: &str = "/* rr_split */";

/// Longest prefix of the following segment searched for when locating a
/// boundary.
const SEARCH_WINDOW: usize = 30;

/// Shortest prefix worth searching for.
const MIN_PREFIX: usize = 3;

/// Insert [`SPLIT_MARKER`] into `css_text` at the boundaries between
/// `child_texts`.
///
/// When the stylesheet text is exactly the concatenation of the children the
/// boundaries are known. Otherwise (the CSSOM was edited after parse) each
/// boundary is located by searching for a prefix of the next child's text;
/// once a boundary cannot be found the rest of the text stays unmarked.
#[must_use]
pub fn mark_css_splits(css_text: &str, child_texts: &[&str]) -> String {
    if child_texts.len() < 2 {
        return css_text.to_string();
    }
    if child_texts.concat() == css_text {
        return child_texts.join(SPLIT_MARKER);
    }

    let mut output = String::with_capacity(css_text.len() + SPLIT_MARKER.len() * child_texts.len());
    let mut rest = css_text;
    for next in &child_texts[1..] {
        let skip_first = rest.chars().next().map_or(0, char::len_utf8);
        let Some(offset) = find_segment_start(rest, next, skip_first) else {
            break;
        };
        output.push_str(&rest[..offset]);
        output.push_str(SPLIT_MARKER);
        rest = &rest[offset..];
    }
    output.push_str(rest);
    output
}

/// Spread split-marked `css_text` over `slot_count` text children.
///
/// Without `hack_css` each marked segment goes to its slot verbatim. With
/// it, the whole text is adapted (see [`adapt_css_for_replay`]) and each
/// boundary is re-located in the adapted text by the longest prefix of the
/// next original segment, falling back to the original segment length.
/// Surplus segments are joined into the last slot; surplus slots are left
/// empty.
pub fn apply_css_splits(
    css_text: &str,
    slot_count: usize,
    hack_css: bool,
    cache: &mut BuildCache,
) -> Vec<String> {
    let mut slots = vec![String::new(); slot_count];
    if slot_count == 0 {
        return slots;
    }

    let mut segments: Vec<String> = css_text.split(SPLIT_MARKER).map(str::to_string).collect();
    if segments.len() > slot_count {
        let tail = segments.split_off(slot_count - 1).concat();
        segments.push(tail);
    }

    if !hack_css {
        for (slot, segment) in slots.iter_mut().zip(segments) {
            *slot = segment;
        }
        return slots;
    }

    let adapted = adapt_css_for_replay(&segments.concat(), cache);
    let mut start = 0;
    for (i, slot) in slots.iter_mut().enumerate().take(segments.len()) {
        let Some(next) = segments.get(i + 1) else {
            adapted[start..].clone_into(slot);
            break;
        };
        let end = find_segment_start(&adapted[start..], next, 0).map_or_else(
            || floor_char_boundary(&adapted, start + segments[i].len()),
            |offset| start + offset,
        );
        adapted[start..end].clone_into(slot);
        start = end;
    }
    slots
}

/// Byte offset in `haystack` of the longest prefix (at most
/// [`SEARCH_WINDOW`] chars, at least [`MIN_PREFIX`]) of `segment`, searching
/// from byte `from`.
fn find_segment_start(haystack: &str, segment: &str, from: usize) -> Option<usize> {
    let prefix_lengths: Vec<usize> = segment
        .char_indices()
        .map(|(index, _)| index)
        .skip(1)
        .chain(std::iter::once(segment.len()))
        .take(SEARCH_WINDOW)
        .collect();

    let searchable = haystack.get(from..)?;
    prefix_lengths
        .iter()
        .enumerate()
        .rev()
        .take_while(|(count, _)| count + 1 >= MIN_PREFIX)
        .find_map(|(_, &len)| searchable.find(&segment[..len]))
        .map(|offset| offset + from)
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
