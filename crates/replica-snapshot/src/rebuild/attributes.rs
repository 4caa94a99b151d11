//! Element construction and attribute application.

use replica_css::{adapt_css_for_replay, apply_css_splits};
use replica_dom::XLINK_NAMESPACE;
use tracing::{debug, warn};

use super::Materializer;
use crate::host::{DialogMode, MediaCommand, NodeFactory};
use crate::types::{AttributeValue, ElementNode, NodeData, RrAttribute};

/// An element fresh from the factory.
pub(super) struct BuiltElement<N> {
    pub node: N,
    /// Split style text for the element's text children, in order.
    pub style_texts: Option<Vec<String>>,
    /// A `textarea` value replaced the serialized children.
    pub replaces_children: bool,
}

/// Tag name the host expects: SVG camel case restored, scripts made inert,
/// inlined `link` stylesheets turned into `style`.
pub(super) fn canonical_tag_name(element: &ElementNode) -> String {
    let tag = element.tag_name.as_str();
    let mapped = match tag {
        "script" => "noscript",
        "altglyph" => "altGlyph",
        "altglyphdef" => "altGlyphDef",
        "altglyphitem" => "altGlyphItem",
        "animatecolor" => "animateColor",
        "animatemotion" => "animateMotion",
        "animatetransform" => "animateTransform",
        "clippath" => "clipPath",
        "feblend" => "feBlend",
        "fecolormatrix" => "feColorMatrix",
        "fecomponenttransfer" => "feComponentTransfer",
        "fecomposite" => "feComposite",
        "feconvolvematrix" => "feConvolveMatrix",
        "fediffuselighting" => "feDiffuseLighting",
        "fedisplacementmap" => "feDisplacementMap",
        "fedistantlight" => "feDistantLight",
        "fedropshadow" => "feDropShadow",
        "feflood" => "feFlood",
        "fefunca" => "feFuncA",
        "fefuncb" => "feFuncB",
        "fefuncg" => "feFuncG",
        "fefuncr" => "feFuncR",
        "fegaussianblur" => "feGaussianBlur",
        "feimage" => "feImage",
        "femerge" => "feMerge",
        "femergenode" => "feMergeNode",
        "femorphology" => "feMorphology",
        "feoffset" => "feOffset",
        "fepointlight" => "fePointLight",
        "fespecularlighting" => "feSpecularLighting",
        "fespotlight" => "feSpotLight",
        "fetile" => "feTile",
        "feturbulence" => "feTurbulence",
        "foreignobject" => "foreignObject",
        "glyphref" => "glyphRef",
        "lineargradient" => "linearGradient",
        "radialgradient" => "radialGradient",
        other => other,
    };
    if mapped == "link" && element.attributes.contains_key("_cssText") {
        return "style".to_string();
    }
    mapped.to_string()
}

fn attribute_str<'a>(element: &'a ElementNode, name: &str) -> Option<&'a str> {
    element.attributes.get(name).and_then(AttributeValue::as_str)
}

/// Script preloads and `.js` prefetches must not fetch on replay.
fn is_inert_script_link(element: &ElementNode) -> bool {
    let rel = attribute_str(element, "rel");
    let preload = (rel == Some("preload") && attribute_str(element, "as") == Some("script"))
        || rel == Some("modulepreload");
    let prefetch = rel == Some("prefetch")
        && attribute_str(element, "href").is_some_and(|href| href.ends_with(".js"));
    preload || prefetch
}

impl<F: NodeFactory> Materializer<'_, F> {
    pub(super) fn build_element(&mut self, element: &ElementNode) -> BuiltElement<F::Node> {
        let tag_name = canonical_tag_name(element);
        if element.is_custom
            && !element.is_svg
            && !self.factory.is_custom_element_defined(&element.tag_name)
        {
            self.factory.define_custom_element(&element.tag_name);
        }
        let node = self.factory.create_element(&tag_name, element.is_svg);
        let mut built = BuiltElement {
            node,
            style_texts: None,
            replaces_children: false,
        };

        let mut special = Vec::new();
        for (name, value) in &element.attributes {
            if tag_name == "option" && name == "selected" && value.as_bool() == Some(false) {
                continue;
            }
            if let Some(rr) = RrAttribute::parse(name) {
                special.push((rr, value));
                continue;
            }
            if name.starts_with("rr_") {
                warn!(name, "unknown replay attribute skipped");
                continue;
            }
            let Some(text) = value.to_attribute_string() else {
                continue;
            };
            if matches!(value, AttributeValue::String(_)) {
                if tag_name == "style" && name == "_cssText" {
                    built.style_texts = self.build_style(element, node, &text);
                    continue;
                }
                if tag_name == "textarea" && name == "value" {
                    let child = self.factory.create_text(&text);
                    self.factory.append_child(node, child);
                    built.replaces_children = true;
                    continue;
                }
            }
            self.apply_attribute(element, &tag_name, node, name, &text);
        }

        for (rr, value) in special {
            self.apply_rr_attribute(element, &tag_name, node, rr, value);
        }

        if element.is_shadow_host {
            match self.factory.shadow_root(node) {
                None => {
                    let _ = self.factory.attach_shadow(node);
                }
                Some(root) => {
                    for child in self.factory.children(root) {
                        self.factory.remove_child(root, child);
                    }
                }
            }
        }
        built
    }

    fn apply_attribute(
        &mut self,
        element: &ElementNode,
        tag_name: &str,
        node: F::Node,
        name: &str,
        value: &str,
    ) {
        let result = if name == "onload" || name == "onclick" || name.starts_with("onmouse") {
            self.factory.set_attribute(node, &format!("_{name}"), value)
        } else if tag_name == "meta"
            && name == "content"
            && attribute_str(element, "http-equiv") == Some("Content-Security-Policy")
        {
            self.factory.set_attribute(node, "csp-content", value)
        } else if tag_name == "link" && name == "rel" && is_inert_script_link(element) {
            Ok(())
        } else if tag_name == "img"
            && name == "srcset"
            && element.attributes.contains_key(RrAttribute::DataUrl.as_ref())
        {
            self.factory.set_attribute(node, "rrweb-original-srcset", value)
        } else if name.starts_with("xlink:") {
            self.factory.set_attribute_ns(node, XLINK_NAMESPACE, name, value)
        } else {
            self.factory.set_attribute(node, name, value)
        };
        if let Err(err) = result {
            debug!(name, %err, "attribute skipped");
        }
    }

    /// Route `_cssText` into the style element. With text children the
    /// split pieces are returned for them; otherwise one text child is
    /// appended.
    fn build_style(
        &mut self,
        element: &ElementNode,
        node: F::Node,
        css_text: &str,
    ) -> Option<Vec<String>> {
        let text_slots = element
            .child_nodes
            .iter()
            .filter(|child| matches!(child.data, NodeData::Text { .. }))
            .count();
        if text_slots > 0 {
            return Some(apply_css_splits(
                css_text,
                text_slots,
                self.options.hack_css,
                self.cache,
            ));
        }
        let text = if self.options.hack_css {
            adapt_css_for_replay(css_text, self.cache)
        } else {
            css_text.to_string()
        };
        let child = self.factory.create_text(&text);
        self.factory.append_child(node, child);
        None
    }

    fn apply_rr_attribute(
        &mut self,
        element: &ElementNode,
        tag_name: &str,
        node: F::Node,
        rr: RrAttribute,
        value: &AttributeValue,
    ) {
        let command = match rr {
            RrAttribute::DataUrl => {
                self.restore_raster(element, tag_name, node, value);
                None
            }
            RrAttribute::Width | RrAttribute::Height => {
                if let Some(size) = value.to_attribute_string() {
                    let property = if rr == RrAttribute::Width { "width" } else { "height" };
                    self.factory.set_style_property(node, property, &size);
                }
                None
            }
            RrAttribute::MediaState => match value.as_str() {
                Some("played") => Some(MediaCommand::Play),
                Some("paused") => Some(MediaCommand::Pause),
                _ => None,
            },
            RrAttribute::MediaCurrentTime => value.as_f64().map(MediaCommand::Seek),
            RrAttribute::MediaPlaybackRate => value.as_f64().map(MediaCommand::PlaybackRate),
            RrAttribute::MediaMuted => value.as_bool().map(MediaCommand::Muted),
            RrAttribute::MediaLoop => value.as_bool().map(MediaCommand::Loop),
            RrAttribute::MediaVolume => value.as_f64().map(MediaCommand::Volume),
            RrAttribute::OpenMode => {
                if !self.factory.is_dialog_open(node) {
                    let mode = if value.as_str() == Some("modal") {
                        DialogMode::Modal
                    } else {
                        DialogMode::NonModal
                    };
                    self.factory.show_dialog(node, mode);
                }
                None
            }
            // Scroll is applied after the whole tree exists; rr_src only
            // documents what the frame pointed at.
            RrAttribute::ScrollLeft | RrAttribute::ScrollTop | RrAttribute::Src => None,
        };
        if let Some(command) = command
            && let Err(err) = self.factory.apply_media(node, command)
        {
            warn!(?command, %err, "media state not restored");
        }
    }

    fn restore_raster(
        &mut self,
        element: &ElementNode,
        tag_name: &str,
        node: F::Node,
        value: &AttributeValue,
    ) {
        let Some(data_url) = value.as_str() else {
            return;
        };
        match tag_name {
            "canvas" => {}
            "img" => {
                if self
                    .factory
                    .current_src(node)
                    .is_some_and(|src| src.starts_with("data:"))
                {
                    return;
                }
                if let Some(src) = attribute_str(element, "src")
                    && let Err(err) = self.factory.set_attribute(node, "rrweb-original-src", src)
                {
                    debug!(%err, "original src not kept");
                }
            }
            _ => return,
        }
        if let Err(err) = self.factory.load_raster(node, data_url) {
            warn!(tag_name, %err, "raster not restored");
        }
    }
}
