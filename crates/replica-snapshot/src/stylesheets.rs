//! Stylesheet resource manager.
//!
//! A cross-origin stylesheet loaded without CORS cannot be read, so its
//! rules are missing from a capture. The manager inserts a clone of the
//! `link` element with `crossorigin="anonymous"` next to the original; when
//! the clone's sheet loads, its text is cached and the original element is
//! touched so change detection re-serializes it with the cached text.
//!
//! Per URL: `unregistered -> cloned -> (resolved | failed) -> removed`.
//! Records survive their clone node: a resolved record serves
//! [`StylesheetManager::get_cached_css_text`], a failed one suppresses
//! another attempt. Navigation clears everything.

use std::collections::HashMap;

use replica_common::url::file_extension;
use replica_common::warning::clear_warnings;
use tracing::debug;

use crate::host::StylesheetHost;

/// Attribute tying a clone to its original.
pub const CLONE_TAG_ATTRIBUTE: &str = "data-rr-clone-tag";

/// Extensions that are never stylesheets, for non-`stylesheet` relations.
const NON_STYLESHEET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "json", "map", "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico",
    "bmp", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "webm", "ogg", "wav", "m4a", "mov",
    "zip", "gz", "tar", "rar", "7z", "pdf", "doc", "docx", "xls", "xlsx", "txt", "xml", "wasm",
];

/// One tracked stylesheet URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRecord<N> {
    /// The element the page inserted.
    pub original: N,
    /// The inserted clone, until it is removed.
    pub clone: Option<N>,
    /// Whether the clone's sheet loaded.
    pub loaded: bool,
    /// The clone's sheet text, once loaded.
    pub css_text: Option<String>,
    /// Value of [`CLONE_TAG_ATTRIBUTE`] on both elements.
    pub clone_tag: String,
}

/// A clone that was just inserted and needs a load listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration<N> {
    /// The stylesheet URL.
    pub url: String,
    /// The clone element to listen on.
    pub clone: N,
    /// Sweep generation armed by this registration.
    pub generation: u64,
}

/// Clone records for one capture session.
#[derive(Debug, Clone)]
pub struct StylesheetManager<N> {
    records: HashMap<String, CloneRecord<N>>,
    location: Option<String>,
    next_tag: u64,
    generation: u64,
}

impl<N> Default for StylesheetManager<N> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            location: None,
            next_tag: 1,
            generation: 0,
        }
    }
}

impl<N: Copy + Eq + std::hash::Hash + std::fmt::Debug> StylesheetManager<N> {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `link`'s stylesheet through a CORS clone.
    ///
    /// Returns the clone to listen on, or `None` when the URL is already
    /// tracked or should not be cloned. A change of page location clears
    /// all records first.
    pub fn register_clone<H>(&mut self, host: &mut H, link: N) -> Option<Registration<N>>
    where
        H: StylesheetHost<Node = N>,
    {
        let location = host.location();
        if self.location.as_deref() != Some(location.as_str()) {
            if self.location.is_some() {
                self.blow_cache(host);
            }
            self.location = Some(location);
        }

        let url = host.sheet_url(link)?;
        if self.records.contains_key(&url) {
            return None;
        }
        if host
            .get_attribute(link, "crossorigin")
            .is_some_and(|value| value.eq_ignore_ascii_case("use-credentials"))
        {
            return None;
        }
        let is_stylesheet = host
            .get_attribute(link, "rel")
            .is_some_and(|rel| rel.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")));
        if !is_stylesheet
            && file_extension(&url, None)
                .is_some_and(|ext| NON_STYLESHEET_EXTENSIONS.contains(&ext.as_str()))
        {
            return None;
        }

        let clone_tag = format!("rr-clone-{}", self.next_tag);
        self.next_tag += 1;

        let clone = host.clone_node(link);
        host.set_attribute(clone, "crossorigin", "anonymous");
        host.set_attribute(clone, CLONE_TAG_ATTRIBUTE, &clone_tag);
        host.set_attribute(link, CLONE_TAG_ATTRIBUTE, &clone_tag);
        host.insert_after(link, clone);
        debug!(%url, %clone_tag, "inserted stylesheet clone");

        let _ = self.records.insert(
            url.clone(),
            CloneRecord {
                original: link,
                clone: Some(clone),
                loaded: false,
                css_text: None,
                clone_tag,
            },
        );
        self.generation += 1;
        Some(Registration {
            url,
            clone,
            generation: self.generation,
        })
    }

    /// The clone for `url` loaded: cache its text, remove it, and touch the
    /// original. Returns the original element.
    pub fn on_load<H>(&mut self, host: &mut H, url: &str) -> Option<N>
    where
        H: StylesheetHost<Node = N>,
    {
        let css_text = host.find_sheet_text(url);
        let record = self.records.get_mut(url)?;
        if let Some(clone) = record.clone.take() {
            host.remove_node(clone);
        }
        record.loaded = css_text.is_some();
        record.css_text = css_text;
        debug!(%url, loaded = record.loaded, "stylesheet clone loaded");
        host.mark_mutated(record.original);
        Some(record.original)
    }

    /// The clone for `url` failed: remove it and keep the failed record.
    pub fn on_error<H>(&mut self, host: &mut H, url: &str)
    where
        H: StylesheetHost<Node = N>,
    {
        if let Some(record) = self.records.get_mut(url) {
            if let Some(clone) = record.clone.take() {
                host.remove_node(clone);
            }
            record.loaded = false;
            debug!(%url, "stylesheet clone failed");
        }
    }

    /// Cached text for `url`, only once its clone has loaded.
    #[must_use]
    pub fn get_cached_css_text(&self, url: &str) -> Option<&str> {
        self.records
            .get(url)
            .filter(|record| record.loaded)
            .and_then(|record| record.css_text.as_deref())
    }

    /// Whether `node` is a clone inserted by this manager.
    #[must_use]
    pub fn is_clone(&self, node: N) -> bool {
        self.records.values().any(|record| record.clone == Some(node))
    }

    /// The record for `url`.
    #[must_use]
    pub fn record(&self, url: &str) -> Option<&CloneRecord<N>> {
        self.records.get(url)
    }

    /// Number of tracked URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The sweep generation of the latest registration.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Remove every clone still waiting, if `generation` is still the
    /// latest (no registration since the sweep was armed).
    pub fn sweep<H>(&mut self, host: &mut H, generation: u64) -> usize
    where
        H: StylesheetHost<Node = N>,
    {
        if generation != self.generation {
            return 0;
        }
        let mut removed = 0;
        for record in self.records.values_mut() {
            if let Some(clone) = record.clone.take() {
                host.remove_node(clone);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept pending stylesheet clones");
        }
        removed
    }

    /// Remove every clone node and forget every record.
    pub fn blow_cache<H>(&mut self, host: &mut H)
    where
        H: StylesheetHost<Node = N>,
    {
        for record in self.records.values_mut() {
            if let Some(clone) = record.clone.take() {
                host.remove_node(clone);
            }
        }
        self.records.clear();
        clear_warnings();
        debug!("stylesheet cache invalidated");
    }
}
