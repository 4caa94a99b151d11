//! Element capture: tag, attributes and out-of-band state.

use replica_common::url::{absolute_srcset, absolutify_css_urls, file_extension, resolve_url};
use replica_common::warning::warn_once;
use replica_css::mark_css_splits;
use tracing::warn;

use super::Serializer;
use crate::host::{HostError, SheetAccess, SourceTree};
use crate::stylesheets::CLONE_TAG_ATTRIBUTE;
use crate::types::{AttributeValue, Attributes, ElementNode, RrAttribute};

/// Waits discovered while capturing one element.
#[derive(Debug, Default)]
pub(super) struct Pending {
    /// An `iframe` whose document is captured later.
    pub frame: bool,
    /// `(url, blocked)` for a `link` whose text is not available yet.
    pub stylesheet: Option<(String, bool)>,
    /// An image raster read; `true` retries under CORS.
    pub image: Option<bool>,
}

/// [§ 13.1.2 Elements](https://html.spec.whatwg.org/multipage/syntax.html#elements-2)
///
/// Tag names outside `[a-z0-9-_:]` are not reproducible with
/// `createElement` and are captured as `div`.
fn valid_tag_name(raw: &str) -> String {
    let tag = raw.to_ascii_lowercase();
    let valid = tag
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | ':'));
    if valid { tag } else { "div".to_string() }
}

fn ignore_attribute(tag_name: &str, name: &str) -> bool {
    (matches!(tag_name, "video" | "audio") && name == "autoplay") || name == CLONE_TAG_ATTRIBUTE
}

/// Make URL-bearing attribute values absolute against `base`.
fn transform_attribute(base_url: &str, tag_name: &str, name: &str, value: &str) -> String {
    let base = Some(base_url);
    match name {
        "src" => resolve_url(value, base),
        "href" if !(tag_name == "use" && value.starts_with('#')) => resolve_url(value, base),
        "xlink:href" if !value.starts_with('#') => resolve_url(value, base),
        "background" if matches!(tag_name, "table" | "td" | "th") => resolve_url(value, base),
        "srcset" => absolute_srcset(value, base),
        "style" => absolutify_css_urls(value, base_url),
        "data" if tag_name == "object" => resolve_url(value, base),
        _ => value.to_string(),
    }
}

/// `rel=stylesheet`, or a CSS preload.
fn is_stylesheet_link(attributes: &Attributes) -> bool {
    let rel = attributes.get("rel").and_then(AttributeValue::as_str);
    match rel {
        Some("stylesheet") => true,
        Some("preload") => attributes
            .get("href")
            .and_then(AttributeValue::as_str)
            .and_then(|href| file_extension(href, None))
            .is_some_and(|ext| ext == "css"),
        _ => false,
    }
}

fn insert_rr(attributes: &mut Attributes, name: RrAttribute, value: impl Into<AttributeValue>) {
    let _ = attributes.insert(name.as_ref().to_string(), value.into());
}

impl<H: SourceTree> Serializer<'_, H> {
    pub(super) fn serialize_element(
        &mut self,
        node: H::Node,
        newly_added: bool,
    ) -> (ElementNode, Pending) {
        let host = self.host;
        let policy = self.policy;
        let base = host.document_url(host.owner_document(node));
        let need_block = self.is_blocked(node);
        let tag_name = valid_tag_name(&host.tag_name(node).unwrap_or_default());
        let mut pending = Pending::default();

        let mut attributes = Attributes::new();
        for (name, value) in host.attributes(node) {
            let lower = name.to_ascii_lowercase();
            if ignore_attribute(&tag_name, &lower) {
                continue;
            }
            let value = transform_attribute(&base, &tag_name, &lower, &value);
            let _ = attributes.insert(name, AttributeValue::String(value));
        }

        // A blocked element exposes nothing beyond its box.
        if !need_block {
            match tag_name.as_str() {
                "link" if policy.inline_stylesheet => {
                    pending.stylesheet = self.capture_link(node, &base, &mut attributes);
                }
                "style" => self.capture_style(node, &base, &mut attributes),
                "input" | "textarea" | "select" => {
                    self.capture_form_value(node, &tag_name, &mut attributes);
                }
                "option" => {
                    if host.is_selected(node) && !policy.mask_input_options.select {
                        let _ = attributes.insert("selected".to_string(), true.into());
                    } else {
                        let _ = attributes.remove("selected");
                    }
                }
                "dialog" => {
                    if let Some(mode) = host.dialog_mode(node) {
                        insert_rr(&mut attributes, RrAttribute::OpenMode, mode.as_str());
                    }
                }
                "canvas" if policy.record_canvas => self.capture_canvas(node, &mut attributes),
                "img" if policy.inline_images => {
                    pending.image = self.capture_image(node, &mut attributes);
                }
                "audio" | "video" => {
                    if let Some(media) = host.media_state(node) {
                        let state = if media.paused { "paused" } else { "played" };
                        insert_rr(&mut attributes, RrAttribute::MediaState, state);
                        insert_rr(&mut attributes, RrAttribute::MediaCurrentTime, media.current_time);
                        insert_rr(&mut attributes, RrAttribute::MediaPlaybackRate, media.playback_rate);
                        insert_rr(&mut attributes, RrAttribute::MediaMuted, media.muted);
                        insert_rr(&mut attributes, RrAttribute::MediaLoop, media.looping);
                        insert_rr(&mut attributes, RrAttribute::MediaVolume, media.volume);
                    }
                }
                _ => {}
            }
        }

        if !newly_added {
            let (left, top) = host.scroll(node);
            if left.abs() > 0.0 {
                insert_rr(&mut attributes, RrAttribute::ScrollLeft, left);
            }
            if top.abs() > 0.0 {
                insert_rr(&mut attributes, RrAttribute::ScrollTop, top);
            }
        }

        if need_block {
            let (width, height) = host.bounding_size(node).unwrap_or((0.0, 0.0));
            let class = attributes.remove("class");
            attributes.clear();
            if let Some(class) = class {
                let _ = attributes.insert("class".to_string(), class);
            }
            insert_rr(&mut attributes, RrAttribute::Width, format!("{width}px"));
            insert_rr(&mut attributes, RrAttribute::Height, format!("{height}px"));
        }

        if tag_name == "iframe" {
            let src = attributes
                .get("src")
                .and_then(AttributeValue::as_str)
                .map(str::to_string);
            let keep = match (&policy.keep_iframe_src_fn, &src) {
                (Some(keep), Some(src)) => keep(src),
                _ => false,
            };
            if !keep {
                if host.content_document(node).is_none()
                    && let Some(src) = src
                {
                    insert_rr(&mut attributes, RrAttribute::Src, src);
                }
                let _ = attributes.remove("src");
            }
            pending.frame = !need_block;
        }

        let element = ElementNode {
            tag_name,
            attributes,
            child_nodes: Vec::new(),
            is_svg: host.is_svg(node),
            is_custom: host.is_custom_element(node),
            is_shadow_host: false,
            is_shadow: false,
            need_block,
        };
        (element, pending)
    }

    /// Inline a `link`'s sheet; returns the wait to arm when it cannot be
    /// read yet.
    fn capture_link(
        &self,
        node: H::Node,
        base: &str,
        attributes: &mut Attributes,
    ) -> Option<(String, bool)> {
        let href = self.host.attribute(node, "href")?;
        let url = resolve_url(&href, Some(base));
        let access = self.host.sheet(node);
        let css_text = match &access {
            SheetAccess::Text(css) => Some(css.clone()),
            SheetAccess::Blocked => self
                .state
                .stylesheets
                .get_cached_css_text(&url)
                .map(str::to_string),
            SheetAccess::None | SheetAccess::Pending => None,
        }
        .filter(|css| !css.is_empty());

        if let Some(css_text) = css_text {
            let _ = attributes.remove("rel");
            let _ = attributes.remove("href");
            let _ = attributes.insert(
                "_cssText".to_string(),
                absolutify_css_urls(&css_text, &url).into(),
            );
            return None;
        }
        if !is_stylesheet_link(attributes) {
            return None;
        }
        match access {
            // A tracked URL already has a clone in flight, or failed.
            SheetAccess::Blocked => self
                .state
                .stylesheets
                .record(&url)
                .is_none()
                .then_some((url, true)),
            SheetAccess::None | SheetAccess::Pending => Some((url, false)),
            SheetAccess::Text(_) => None,
        }
    }

    fn capture_style(&self, node: H::Node, base: &str, attributes: &mut Attributes) {
        let host = self.host;
        let SheetAccess::Text(css_text) = host.sheet(node) else {
            return;
        };
        if css_text.is_empty() {
            return;
        }
        let children = host.children(node);
        let css_text = if children.len() > 1 {
            let texts: Vec<String> = children.iter().map(|child| host.text(*child)).collect();
            let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
            mark_css_splits(&css_text, &texts)
        } else {
            css_text
        };
        let _ = attributes.insert(
            "_cssText".to_string(),
            absolutify_css_urls(&css_text, base).into(),
        );
    }

    fn capture_form_value(&self, node: H::Node, tag_name: &str, attributes: &mut Attributes) {
        let host = self.host;
        let declared_type = attributes
            .get("type")
            .and_then(AttributeValue::as_str)
            .map(str::to_ascii_lowercase);
        let is_toggle = matches!(
            declared_type.as_deref(),
            Some("radio" | "checkbox" | "submit" | "button")
        );
        let value = host.form_value(node).unwrap_or_default();
        if !is_toggle && !value.is_empty() {
            let input_type = if host.attribute(node, "data-rr-is-password").is_some() {
                Some("password".to_string())
            } else {
                host.input_type(node)
            };
            let masked = self.mask_input_value(tag_name, input_type.as_deref(), &value);
            let _ = attributes.insert("value".to_string(), masked.into());
        } else if host.is_checked(node) {
            let _ = attributes.insert("checked".to_string(), true.into());
        }
    }

    fn mask_input_value(&self, tag_name: &str, input_type: Option<&str>, value: &str) -> String {
        let options = &self.policy.mask_input_options;
        let masked = options.masks(tag_name) || input_type.is_some_and(|ty| options.masks(ty));
        if !masked {
            return value.to_string();
        }
        match &self.policy.mask_input_fn {
            Some(mask) => mask(value, input_type.unwrap_or(tag_name)),
            None => "*".repeat(value.chars().count()),
        }
    }

    fn capture_canvas(&self, node: H::Node, attributes: &mut Attributes) {
        let options = &self.policy.data_url_options;
        let canvas = self
            .host
            .canvas_data_url(node, &options.mime_type, options.quality);
        let blank = self
            .host
            .blank_canvas_data_url(node, &options.mime_type, options.quality);
        match (canvas, blank) {
            (Ok(data_url), Ok(blank)) if data_url != blank => {
                insert_rr(attributes, RrAttribute::DataUrl, data_url);
            }
            (Err(err), _) | (_, Err(err)) => {
                warn_once("serializer", &format!("canvas not captured: {err}"));
            }
            _ => {}
        }
    }

    /// Capture an image raster once per element. Returns the wait to arm
    /// when the read has to happen later.
    fn capture_image(&mut self, node: H::Node, attributes: &mut Attributes) -> Option<bool> {
        let host = self.host;
        match self.state.inlined_images.get(&node) {
            Some(Some(data_url)) => {
                insert_rr(attributes, RrAttribute::DataUrl, data_url.clone());
                return None;
            }
            Some(None) => return None,
            None => {}
        }
        let _ = self.state.inlined_images.insert(node, None);

        if !host.image_complete(node) {
            return Some(false);
        }
        let options = &self.policy.data_url_options;
        match host.image_data_url(node, &options.mime_type, options.quality) {
            Ok(data_url) => {
                insert_rr(attributes, RrAttribute::DataUrl, data_url.clone());
                self.state.record_inlined_image(node, data_url);
                None
            }
            Err(HostError::Security(_))
                if host.attribute(node, "crossorigin").as_deref() != Some("anonymous") =>
            {
                Some(true)
            }
            Err(err) => {
                warn!(?node, %err, "cannot inline image");
                None
            }
        }
    }

    fn is_blocked(&self, node: H::Node) -> bool {
        let host = self.host;
        if let Some(matcher) = &self.policy.block_class
            && host
                .attribute(node, "class")
                .is_some_and(|class| matcher.matches(&class))
        {
            return true;
        }
        self.policy
            .block_selector
            .as_deref()
            .is_some_and(|selector| host.matches_selector(node, selector).unwrap_or(false))
    }
}
