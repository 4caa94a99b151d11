//! Capture and rebuild options.
//!
//! The data parts deserialize from JSON (every field has a default), so a
//! policy file can be handed to the command line tool. Closure hooks are
//! set in code.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Element-independent text masking: `(text) -> masked`.
pub type MaskTextFn = Rc<dyn Fn(&str) -> String>;
/// Input masking: `(value, input type or tag) -> masked`.
pub type MaskInputFn = Rc<dyn Fn(&str, &str) -> String>;
/// Frame `src` filter: `true` keeps the attribute.
pub type KeepSourceFn = Rc<dyn Fn(&str) -> bool>;

/// A class test: an exact class name, or a pattern any class must match.
#[derive(Clone)]
pub enum ClassMatcher {
    /// `classList.contains(name)`
    Name(String),
    /// Some class matches the pattern.
    Pattern(Regex),
}

impl ClassMatcher {
    /// Whether a `class` attribute value satisfies this matcher.
    #[must_use]
    pub fn matches(&self, class_attribute: &str) -> bool {
        let mut classes = class_attribute.split_ascii_whitespace();
        match self {
            Self::Name(name) => classes.any(|class| class == name),
            Self::Pattern(pattern) => classes.any(|class| pattern.is_match(class)),
        }
    }
}

impl fmt::Debug for ClassMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "Name({name:?})"),
            Self::Pattern(pattern) => write!(f, "Pattern({:?})", pattern.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ClassMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // "/pattern/" selects the regex form.
        match raw.strip_prefix('/').and_then(|rest| rest.strip_suffix('/')) {
            Some(pattern) => Regex::new(pattern)
                .map(Self::Pattern)
                .map_err(serde::de::Error::custom),
            None => Ok(Self::Name(raw)),
        }
    }
}

/// Which form controls have their value masked.
///
/// Keys are `input` types plus the `textarea` and `select` tags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MaskInputOptions {
    /// `input[type=color]`
    pub color: bool,
    /// `input[type=date]`
    pub date: bool,
    /// `input[type=datetime-local]`
    #[serde(rename = "datetime-local")]
    pub datetime_local: bool,
    /// `input[type=email]`
    pub email: bool,
    /// `input[type=month]`
    pub month: bool,
    /// `input[type=number]`
    pub number: bool,
    /// `input[type=range]`
    pub range: bool,
    /// `input[type=search]`
    pub search: bool,
    /// `input[type=tel]`
    pub tel: bool,
    /// `input[type=text]`
    pub text: bool,
    /// `input[type=time]`
    pub time: bool,
    /// `input[type=url]`
    pub url: bool,
    /// `input[type=week]`
    pub week: bool,
    /// `textarea`
    pub textarea: bool,
    /// `select`; also drops `option[selected]`.
    pub select: bool,
    /// `input[type=password]`, and inputs flagged `data-rr-is-password`.
    pub password: bool,
}

impl Default for MaskInputOptions {
    fn default() -> Self {
        Self {
            color: false,
            date: false,
            datetime_local: false,
            email: false,
            month: false,
            number: false,
            range: false,
            search: false,
            tel: false,
            text: false,
            time: false,
            url: false,
            week: false,
            textarea: false,
            select: false,
            password: true,
        }
    }
}

impl MaskInputOptions {
    /// Mask every kind of control.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            color: true,
            date: true,
            datetime_local: true,
            email: true,
            month: true,
            number: true,
            range: true,
            search: true,
            tel: true,
            text: true,
            time: true,
            url: true,
            week: true,
            textarea: true,
            select: true,
            password: true,
        }
    }

    /// Whether `key` (an input type or `textarea`/`select`) is masked.
    #[must_use]
    pub fn masks(&self, key: &str) -> bool {
        match key {
            "color" => self.color,
            "date" => self.date,
            "datetime-local" => self.datetime_local,
            "email" => self.email,
            "month" => self.month,
            "number" => self.number,
            "range" => self.range,
            "search" => self.search,
            "tel" => self.tel,
            "text" => self.text,
            "time" => self.time,
            "url" => self.url,
            "week" => self.week,
            "textarea" => self.textarea,
            "select" => self.select,
            "password" => self.password,
            _ => false,
        }
    }
}

/// Categories of nodes dropped from the capture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct SlimDomOptions {
    /// `<script>`, script preloads and `.js` prefetches.
    pub script: bool,
    /// Comments.
    pub comment: bool,
    /// Favicon links and tile/application metadata.
    pub head_favicon: bool,
    /// Whitespace-only text inside `<head>`.
    pub head_whitespace: bool,
    /// `meta[name=description|keywords]`
    pub head_meta_desc_keywords: bool,
    /// Open Graph, Twitter and Pinterest metadata.
    pub head_meta_social: bool,
    /// Robot directives.
    pub head_meta_robots: bool,
    /// `meta[http-equiv]`
    pub head_meta_http_equiv: bool,
    /// Author, generator and article/product metadata.
    pub head_meta_authorship: bool,
    /// Site verification tokens.
    pub head_meta_verification: bool,
}

impl SlimDomOptions {
    /// Every category on.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            script: true,
            comment: true,
            head_favicon: true,
            head_whitespace: true,
            head_meta_desc_keywords: true,
            head_meta_social: true,
            head_meta_robots: true,
            head_meta_http_equiv: true,
            head_meta_authorship: true,
            head_meta_verification: true,
        }
    }
}

/// `toDataURL(type, quality)` arguments for raster capture.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataUrlOptions {
    /// Image MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Encoder quality in `0..=1`, for lossy types.
    pub quality: Option<f64>,
}

impl Default for DataUrlOptions {
    fn default() -> Self {
        Self {
            mime_type: "image/png".to_string(),
            quality: None,
        }
    }
}

/// Capture policy.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct SerializePolicy {
    /// Elements with this class are blocked.
    pub block_class: Option<ClassMatcher>,
    /// Elements matching this selector are blocked.
    pub block_selector: Option<String>,
    /// Text under an element with this class is masked.
    pub mask_text_class: Option<ClassMatcher>,
    /// Text under an element matching this selector is masked.
    pub mask_text_selector: Option<String>,
    /// Which form controls are masked.
    pub mask_input_options: MaskInputOptions,
    /// What slim-DOM drops.
    pub slim_dom_options: SlimDomOptions,
    /// Inline readable stylesheets as `_cssText`.
    pub inline_stylesheet: bool,
    /// Capture loaded images as `rr_dataURL`.
    pub inline_images: bool,
    /// Capture non-blank canvases as `rr_dataURL`.
    pub record_canvas: bool,
    /// Raster encoding.
    pub data_url_options: DataUrlOptions,
    /// Keep whitespace-only text nodes.
    pub preserve_white_space: bool,
    /// Skip children of the starting node.
    pub skip_child: bool,
    /// The starting node was just inserted; do not read its scroll offset.
    pub newly_added_element: bool,
    /// Bound on waiting for a frame's document, in milliseconds.
    pub iframe_load_timeout: u64,
    /// Bound on waiting for a stylesheet, in milliseconds.
    pub stylesheet_load_timeout: u64,
    /// Bound on waiting for an image, in milliseconds.
    pub image_load_timeout: u64,
    /// Replaces masked text; default is one `*` per non-whitespace char.
    #[serde(skip)]
    pub mask_text_fn: Option<MaskTextFn>,
    /// Replaces masked input values; default is `*` per char.
    #[serde(skip)]
    pub mask_input_fn: Option<MaskInputFn>,
    /// Keeps a frame's `src` when it returns `true`.
    #[serde(skip)]
    pub keep_iframe_src_fn: Option<KeepSourceFn>,
}

impl Default for SerializePolicy {
    fn default() -> Self {
        Self {
            block_class: Some(ClassMatcher::Name("rr-block".to_string())),
            block_selector: None,
            mask_text_class: Some(ClassMatcher::Name("rr-mask".to_string())),
            mask_text_selector: None,
            mask_input_options: MaskInputOptions::default(),
            slim_dom_options: SlimDomOptions::default(),
            inline_stylesheet: true,
            inline_images: false,
            record_canvas: false,
            data_url_options: DataUrlOptions::default(),
            preserve_white_space: true,
            skip_child: false,
            newly_added_element: false,
            iframe_load_timeout: 5000,
            stylesheet_load_timeout: 5000,
            image_load_timeout: 5000,
            mask_text_fn: None,
            mask_input_fn: None,
            keep_iframe_src_fn: None,
        }
    }
}

impl fmt::Debug for SerializePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializePolicy")
            .field("block_class", &self.block_class)
            .field("block_selector", &self.block_selector)
            .field("mask_text_class", &self.mask_text_class)
            .field("mask_text_selector", &self.mask_text_selector)
            .field("mask_input_options", &self.mask_input_options)
            .field("slim_dom_options", &self.slim_dom_options)
            .field("inline_stylesheet", &self.inline_stylesheet)
            .field("inline_images", &self.inline_images)
            .field("record_canvas", &self.record_canvas)
            .field("preserve_white_space", &self.preserve_white_space)
            .field("iframe_load_timeout", &self.iframe_load_timeout)
            .field("stylesheet_load_timeout", &self.stylesheet_load_timeout)
            .finish_non_exhaustive()
    }
}

impl SerializePolicy {
    /// [`Self::iframe_load_timeout`] as a duration.
    #[must_use]
    pub const fn iframe_timeout(&self) -> Duration {
        Duration::from_millis(self.iframe_load_timeout)
    }

    /// [`Self::stylesheet_load_timeout`] as a duration.
    #[must_use]
    pub const fn stylesheet_timeout(&self) -> Duration {
        Duration::from_millis(self.stylesheet_load_timeout)
    }

    /// [`Self::image_load_timeout`] as a duration.
    #[must_use]
    pub const fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_load_timeout)
    }
}

/// Rebuild options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    /// Adapt style text for replay (hover classes, media quirks).
    pub hack_css: bool,
    /// Do not build children.
    pub skip_child: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            hack_css: true,
            skip_child: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = SerializePolicy::default();
        assert!(policy.mask_input_options.password);
        assert!(!policy.mask_input_options.text);
        assert!(policy.preserve_white_space);
        assert!(policy.inline_stylesheet);
        assert_eq!(policy.iframe_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_policy_from_json() {
        let policy: SerializePolicy = serde_json::from_str(
            r#"{
                "blockClass": "/^secret-/",
                "maskTextSelector": ".private",
                "maskInputOptions": { "email": true, "datetime-local": true },
                "slimDomOptions": { "script": true, "headMetaSocial": true },
                "dataUrlOptions": { "type": "image/webp", "quality": 0.5 },
                "preserveWhiteSpace": false
            }"#,
        )
        .unwrap();
        assert!(policy.block_class.unwrap().matches("a secret-x"));
        assert_eq!(policy.mask_text_selector.as_deref(), Some(".private"));
        assert!(policy.mask_input_options.masks("email"));
        assert!(policy.mask_input_options.masks("datetime-local"));
        assert!(policy.mask_input_options.masks("password"));
        assert!(policy.slim_dom_options.script);
        assert!(policy.slim_dom_options.head_meta_social);
        assert_eq!(policy.data_url_options.mime_type, "image/webp");
        assert!(!policy.preserve_white_space);
    }

    #[test]
    fn test_class_matcher_name() {
        let matcher = ClassMatcher::Name("rr-block".to_string());
        assert!(matcher.matches("x rr-block"));
        assert!(!matcher.matches("rr-blocked"));
    }
}
