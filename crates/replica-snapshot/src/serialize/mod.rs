//! Capture: live tree to serialized graph.
//!
//! [`Serializer`] walks a [`SourceTree`] depth-first, assigning ids through
//! the capture [`Mirror`] and applying the [`SerializePolicy`]. Work that
//! has to wait for the host (frame documents, stylesheets, images) is
//! collected as [`Deferred`] items; [`crate::CaptureSession`] turns those
//! into timed waits.

mod element;
mod slim;

use std::collections::HashMap;

use replica_common::url::absolutify_css_urls;
use tracing::warn;

pub use slim::slim_dom_excluded;

use crate::host::{SourceKind, SourceTree};
use crate::mirror::Mirror;
use crate::policy::SerializePolicy;
use crate::stylesheets::StylesheetManager;
use crate::types::{IGNORED_NODE, NodeData, SCRIPT_PLACEHOLDER, SerializedNode};

/// Session-wide id counter. The first id handed out is `1`.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: i64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdGenerator {
    /// A counter starting at `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call returns.
    #[must_use]
    pub const fn peek(&self) -> i64 {
        self.next
    }
}

/// Everything a capture session carries between serializations.
#[derive(Debug)]
pub struct CaptureState<N> {
    /// Capture identity map.
    pub mirror: Mirror<N>,
    /// Cross-origin stylesheet clones.
    pub stylesheets: StylesheetManager<N>,
    /// Id counter.
    pub ids: IdGenerator,
    /// Images whose raster capture was attempted, with the captured data
    /// URL once there is one.
    pub(crate) inlined_images: HashMap<N, Option<String>>,
}

impl<N> Default for CaptureState<N> {
    fn default() -> Self {
        Self {
            mirror: Mirror::default(),
            stylesheets: StylesheetManager::default(),
            ids: IdGenerator::default(),
            inlined_images: HashMap::new(),
        }
    }
}

impl<N: Copy + Eq + std::hash::Hash + std::fmt::Debug> CaptureState<N> {
    /// Fresh state: empty mirror, ids from `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured data URL of `image`, if any.
    #[must_use]
    pub fn inlined_image(&self, image: N) -> Option<&str> {
        self.inlined_images.get(&image).and_then(Option::as_deref)
    }

    pub(crate) fn record_inlined_image(&mut self, image: N, data_url: String) {
        let _ = self.inlined_images.insert(image, Some(data_url));
    }
}

/// Work left over from a serialization pass that waits on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred<N> {
    /// A frame whose document should be captured once ready.
    Frame {
        /// The `iframe` element.
        frame: N,
    },
    /// A `link` whose sheet text was not available.
    Stylesheet {
        /// The `link` element.
        link: N,
        /// The resolved stylesheet URL.
        url: String,
        /// The sheet exists but is cross-origin; needs a CORS clone.
        blocked: bool,
    },
    /// An image whose raster should be captured.
    Image {
        /// The `img` element.
        image: N,
        /// Its serialized id.
        id: i64,
        /// Retry the read under `crossorigin="anonymous"`.
        cross_origin_retry: bool,
    },
}

/// Per-node options threaded through the walk.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
struct WalkContext {
    /// `Some(true)` when an ancestor already requires masking,
    /// `Some(false)` when ancestors were checked and do not, `None` when
    /// nothing is known yet.
    needs_mask: Option<bool>,
    preserve_white_space: bool,
    skip_child: bool,
    newly_added: bool,
    css_captured: bool,
}

/// Serializes nodes of one host tree.
///
/// A serializer borrows the host immutably; anything that mutates the host
/// is returned as [`Deferred`] work by [`Serializer::finish`].
pub struct Serializer<'a, H: SourceTree> {
    host: &'a H,
    state: &'a mut CaptureState<H::Node>,
    policy: &'a SerializePolicy,
    on_serialize: Option<&'a mut dyn FnMut(H::Node)>,
    deferred: Vec<Deferred<H::Node>>,
}

impl<'a, H: SourceTree> Serializer<'a, H> {
    /// A serializer over `host` that records into `state`.
    pub fn new(
        host: &'a H,
        state: &'a mut CaptureState<H::Node>,
        policy: &'a SerializePolicy,
    ) -> Self {
        Self {
            host,
            state,
            policy,
            on_serialize: None,
            deferred: Vec::new(),
        }
    }

    /// Call `hook` with every node that receives a real id.
    #[must_use]
    pub fn with_on_serialize(mut self, hook: &'a mut dyn FnMut(H::Node)) -> Self {
        self.on_serialize = Some(hook);
        self
    }

    /// Serialize `node` and its subtree.
    ///
    /// Returns `None` when the node is skipped: unsupported kinds,
    /// slim-DOM exclusions and ignorable whitespace. Skipped nodes are still
    /// recorded in the mirror with [`IGNORED_NODE`].
    pub fn serialize(&mut self, node: H::Node) -> Option<SerializedNode> {
        let context = WalkContext {
            needs_mask: None,
            preserve_white_space: self.policy.preserve_white_space,
            skip_child: self.policy.skip_child,
            newly_added: self.policy.newly_added_element,
            css_captured: false,
        };
        self.serialize_with_id(node, context)
    }

    /// The waits this pass left behind.
    #[must_use]
    pub fn finish(self) -> Vec<Deferred<H::Node>> {
        self.deferred
    }

    fn serialize_with_id(
        &mut self,
        node: H::Node,
        context: WalkContext,
    ) -> Option<SerializedNode> {
        let host = self.host;
        if self.state.stylesheets.is_clone(node) {
            return None;
        }

        let mut needs_mask = context.needs_mask;
        if needs_mask != Some(true) {
            needs_mask = Some(self.needs_masking_text(node, context.needs_mask.is_none()));
        }
        let needs_mask = needs_mask.unwrap_or(false);

        let Some((data, pending)) = self.serialize_node(node, needs_mask, context) else {
            warn!(?node, "node not serialized");
            return None;
        };

        let root_id = self.root_id(node);
        let mut serialized = SerializedNode {
            id: 0,
            root_id,
            data,
        };

        let id = if self.state.mirror.has_node(node) {
            self.state.mirror.get_id(node)
        } else if slim_dom_excluded(&serialized, &self.policy.slim_dom_options)
            || (!context.preserve_white_space && is_ignorable_whitespace(&serialized))
        {
            IGNORED_NODE
        } else {
            self.state.ids.next_id()
        };
        serialized.id = id;
        self.state.mirror.add(node, &serialized);
        if id == IGNORED_NODE {
            return None;
        }
        if let Some(hook) = self.on_serialize.as_deref_mut() {
            hook(node);
        }

        let mut record_child = !context.skip_child;
        let mut css_captured = false;
        let mut skip_light_children = false;
        let mut preserve_white_space = context.preserve_white_space;
        if let NodeData::Element(element) = &mut serialized.data {
            record_child = record_child && !element.need_block;
            element.need_block = false;
            if let Some(root) = host.shadow_root(node)
                && host.is_native_shadow_root(root)
            {
                element.is_shadow_host = true;
            }
            if self.policy.slim_dom_options.head_whitespace && element.tag_name == "head" {
                preserve_white_space = false;
            }
            skip_light_children =
                element.tag_name == "textarea" && element.attributes.contains_key("value");
            css_captured = element.attributes.contains_key("_cssText");
        }

        if record_child && serialized.child_nodes_mut().is_some() {
            let child_context = WalkContext {
                needs_mask: Some(needs_mask),
                preserve_white_space,
                skip_child: context.skip_child,
                newly_added: context.newly_added,
                css_captured,
            };
            let mut children = Vec::new();
            if !skip_light_children {
                for child in host.children(node) {
                    if let Some(child) = self.serialize_with_id(child, child_context) {
                        children.push(child);
                    }
                }
            }
            if host.kind(node) == SourceKind::Element
                && let Some(root) = host.shadow_root(node)
            {
                let native = host.is_native_shadow_root(root);
                for child in host.children(root) {
                    if let Some(mut child) = self.serialize_with_id(child, child_context) {
                        if native && let Some(element) = child.as_element_mut() {
                            element.is_shadow = true;
                        }
                        children.push(child);
                    }
                }
            }
            if let Some(child_nodes) = serialized.child_nodes_mut() {
                *child_nodes = children;
            }
        }

        if let Some(parent) = host.parent(node)
            && host.is_shadow_root(parent)
            && host.is_native_shadow_root(parent)
            && let Some(element) = serialized.as_element_mut()
        {
            element.is_shadow = true;
        }

        self.queue_pending(node, id, pending);
        Some(serialized)
    }

    fn queue_pending(&mut self, node: H::Node, id: i64, pending: element::Pending) {
        if pending.frame {
            self.deferred.push(Deferred::Frame { frame: node });
        }
        if let Some((url, blocked)) = pending.stylesheet {
            self.deferred.push(Deferred::Stylesheet {
                link: node,
                url,
                blocked,
            });
        }
        if let Some(cross_origin_retry) = pending.image {
            self.deferred.push(Deferred::Image {
                image: node,
                id,
                cross_origin_retry,
            });
        }
    }

    fn serialize_node(
        &mut self,
        node: H::Node,
        needs_mask: bool,
        context: WalkContext,
    ) -> Option<(NodeData, element::Pending)> {
        let host = self.host;
        let data = match host.kind(node) {
            SourceKind::Document => {
                let compat_mode = host.compat_mode(node);
                NodeData::Document {
                    child_nodes: Vec::new(),
                    compat_mode: (compat_mode != "CSS1Compat").then_some(compat_mode),
                }
            }
            SourceKind::DocumentType => {
                let doctype = host.doctype(node).unwrap_or_default();
                NodeData::DocumentType {
                    name: doctype.name,
                    public_id: doctype.public_id,
                    system_id: doctype.system_id,
                }
            }
            SourceKind::Element => {
                let (element, pending) = self.serialize_element(node, context.newly_added);
                return Some((NodeData::Element(element), pending));
            }
            SourceKind::Text => self.serialize_text(node, needs_mask, context.css_captured),
            SourceKind::CData => NodeData::CData {
                text_content: String::new(),
            },
            SourceKind::Comment => NodeData::Comment {
                text_content: host.text(node),
            },
            SourceKind::Other => return None,
        };
        Some((data, element::Pending::default()))
    }

    fn serialize_text(&self, node: H::Node, needs_mask: bool, css_captured: bool) -> NodeData {
        let host = self.host;
        let parent_tag = host.parent(node).and_then(|parent| host.tag_name(parent));
        let parent_tag = parent_tag.map(|tag| tag.to_ascii_lowercase());
        let is_style = parent_tag.as_deref() == Some("style");
        let is_script = parent_tag.as_deref() == Some("script");
        let mut text = host.text(node);

        if is_style && !text.is_empty() {
            if css_captured {
                text.clear();
            } else {
                let base = host.document_url(host.owner_document(node));
                text = absolutify_css_urls(&text, &base);
            }
        }
        if is_script {
            text = SCRIPT_PLACEHOLDER.to_string();
        }
        if !is_style && !is_script && !text.is_empty() && needs_mask {
            text = self.mask_text(&text);
        }
        NodeData::Text {
            text_content: text,
            is_style,
        }
    }

    fn mask_text(&self, text: &str) -> String {
        match &self.policy.mask_text_fn {
            Some(mask) => mask(text),
            None => text
                .chars()
                .map(|c| if c.is_whitespace() { c } else { '*' })
                .collect(),
        }
    }

    /// Whether text in or under `node` is masked. For text nodes the parent
    /// element is tested. `check_ancestors` extends the test up the tree.
    fn needs_masking_text(&self, node: H::Node, check_ancestors: bool) -> bool {
        let host = self.host;
        if self.policy.mask_text_class.is_none() && self.policy.mask_text_selector.is_none() {
            return false;
        }
        let mut current = if host.kind(node) == SourceKind::Element {
            Some(node)
        } else {
            host.parent(node)
                .filter(|parent| host.kind(*parent) == SourceKind::Element)
        };
        while let Some(element) = current {
            if let Some(matcher) = &self.policy.mask_text_class
                && host
                    .attribute(element, "class")
                    .is_some_and(|class| matcher.matches(&class))
            {
                return true;
            }
            if let Some(selector) = &self.policy.mask_text_selector {
                match host.matches_selector(element, selector) {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(_) => return false,
                }
            }
            if !check_ancestors {
                break;
            }
            current = host
                .parent(element)
                .filter(|parent| host.kind(*parent) == SourceKind::Element);
        }
        false
    }

    /// The id of the owning document when that document is a mirrored
    /// frame document.
    fn root_id(&self, node: H::Node) -> Option<i64> {
        let host = self.host;
        if host.kind(node) == SourceKind::Document {
            return None;
        }
        let document = host.owner_document(node);
        if host.frame_element(document).is_some() && self.state.mirror.has_node(document) {
            Some(self.state.mirror.get_id(document))
        } else {
            None
        }
    }
}

fn is_ignorable_whitespace(node: &SerializedNode) -> bool {
    matches!(
        &node.data,
        NodeData::Text { text_content, is_style: false } if text_content.trim().is_empty()
    )
}
