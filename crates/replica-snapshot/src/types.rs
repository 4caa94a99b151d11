//! The serialized node graph.
//!
//! This is the persisted artifact between capture and replay. It is a plain
//! tree of tagged nodes with integer ids and no back references, so it
//! serializes to JSON directly:
//!
//! ```json
//! { "type": 2, "tagName": "div", "attributes": { "class": "a" },
//!   "childNodes": [ { "type": 3, "textContent": "A", "id": 2 } ], "id": 1 }
//! ```

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, FromRepr};
use thiserror::Error;

/// Id assigned to nodes excluded by slim-DOM or whitespace policy.
pub const IGNORED_NODE: i64 = -2;

/// Returned by [`crate::Mirror::get_id`] for a node it does not know.
pub const UNKNOWN_NODE: i64 = -1;

/// Text that replaces the content of `<script>` text nodes.
pub const SCRIPT_PLACEHOLDER: &str = "SCRIPT_PLACEHOLDER";

/// Numeric `type` tag of a serialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u8)]
pub enum NodeKind {
    /// A document.
    Document = 0,
    /// A `<!DOCTYPE>`.
    DocumentType = 1,
    /// An element.
    Element = 2,
    /// A text node.
    Text = 3,
    /// A CDATA section.
    CData = 4,
    /// A comment.
    Comment = 5,
}

impl From<NodeKind> for u8 {
    fn from(kind: NodeKind) -> Self {
        kind as Self
    }
}

/// A `type` tag outside `0..=5`.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("unknown node type {0}")]
pub struct UnknownNodeKind(pub u8);

impl TryFrom<u8> for NodeKind {
    type Error = UnknownNodeKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(UnknownNodeKind(value))
    }
}

impl Serialize for NodeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*self))
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// An attribute value: markup attributes are strings, `rr_*` state and a
/// few reflected properties are booleans or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A boolean value, e.g. `checked`, `rr_mediaMuted`.
    Bool(bool),
    /// A numeric value, e.g. `rr_scrollTop`, `rr_mediaVolume`.
    Number(f64),
}

impl AttributeValue {
    /// The string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric value, if this is a number.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as it would be written with `setAttribute`: `true` becomes
    /// the empty string, numbers use their shortest form. `false` has no
    /// attribute form.
    #[must_use]
    pub fn to_attribute_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Bool(true) => Some(String::new()),
            Self::Bool(false) => None,
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Element attributes, ordered by name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Out-of-band element state carried in reserved `rr_*` attributes.
///
/// These never become markup attributes on rebuild; each one is matched and
/// applied explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString)]
pub enum RrAttribute {
    /// Horizontal scroll offset, applied after the tree is built.
    #[strum(serialize = "rr_scrollLeft")]
    ScrollLeft,
    /// Vertical scroll offset, applied after the tree is built.
    #[strum(serialize = "rr_scrollTop")]
    ScrollTop,
    /// Placeholder width of a blocked element, e.g. `"120px"`.
    #[strum(serialize = "rr_width")]
    Width,
    /// Placeholder height of a blocked element.
    #[strum(serialize = "rr_height")]
    Height,
    /// Raster snapshot of a canvas or image.
    #[strum(serialize = "rr_dataURL")]
    DataUrl,
    /// `"played"` or `"paused"`.
    #[strum(serialize = "rr_mediaState")]
    MediaState,
    /// `media.currentTime`
    #[strum(serialize = "rr_mediaCurrentTime")]
    MediaCurrentTime,
    /// `media.playbackRate`
    #[strum(serialize = "rr_mediaPlaybackRate")]
    MediaPlaybackRate,
    /// `media.muted`
    #[strum(serialize = "rr_mediaMuted")]
    MediaMuted,
    /// `media.loop`
    #[strum(serialize = "rr_mediaLoop")]
    MediaLoop,
    /// `media.volume`
    #[strum(serialize = "rr_mediaVolume")]
    MediaVolume,
    /// The `src` of a frame whose document was not captured.
    #[strum(serialize = "rr_src")]
    Src,
    /// `"modal"` or `"non-modal"` for an open dialog.
    #[strum(serialize = "rr_open_mode")]
    OpenMode,
}

impl RrAttribute {
    /// Parse a reserved attribute name; `None` for ordinary attributes and
    /// unknown `rr_` names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

/// Element payload of a [`SerializedNode`].
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ElementNode {
    /// Lower-cased, validated tag name.
    pub tag_name: String,
    /// Attributes, including `rr_*` and `_cssText`.
    pub attributes: Attributes,
    /// Children in tree order (light children first, then shadow children).
    pub child_nodes: Vec<SerializedNode>,
    /// In the SVG namespace.
    pub is_svg: bool,
    /// An autonomous custom element.
    pub is_custom: bool,
    /// Has a native shadow root.
    pub is_shadow_host: bool,
    /// A child of its parent's shadow root.
    pub is_shadow: bool,
    /// Matched the block policy. Cleared before the node leaves the
    /// serializer.
    pub need_block: bool,
}

/// The kind-specific part of a [`SerializedNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// A document.
    Document {
        /// Children in tree order.
        child_nodes: Vec<SerializedNode>,
        /// `document.compatMode` when it is not `CSS1Compat`.
        compat_mode: Option<String>,
    },
    /// A `<!DOCTYPE>`.
    DocumentType {
        /// The doctype name.
        name: String,
        /// The public identifier.
        public_id: String,
        /// The system identifier.
        system_id: String,
    },
    /// An element.
    Element(ElementNode),
    /// A text node.
    Text {
        /// The (possibly masked or emptied) text.
        text_content: String,
        /// A child of a `<style>` element.
        is_style: bool,
    },
    /// A CDATA section; content is not kept.
    CData {
        /// Always empty when produced by the serializer.
        text_content: String,
    },
    /// A comment.
    Comment {
        /// The comment text.
        text_content: String,
    },
}

/// One node of the serialized graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireNode", try_from = "WireNode")]
pub struct SerializedNode {
    /// Session-unique id, or [`IGNORED_NODE`].
    pub id: i64,
    /// Id of the owning document when that is a nested (frame) document.
    pub root_id: Option<i64>,
    /// Kind-specific data.
    pub data: NodeData,
}

impl SerializedNode {
    /// The node's `type` tag.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Document { .. } => NodeKind::Document,
            NodeData::DocumentType { .. } => NodeKind::DocumentType,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text { .. } => NodeKind::Text,
            NodeData::CData { .. } => NodeKind::CData,
            NodeData::Comment { .. } => NodeKind::Comment,
        }
    }

    /// Children of a document or element; empty for other kinds.
    #[must_use]
    pub fn child_nodes(&self) -> &[SerializedNode] {
        match &self.data {
            NodeData::Document { child_nodes, .. } => child_nodes,
            NodeData::Element(element) => &element.child_nodes,
            _ => &[],
        }
    }

    /// Mutable children of a document or element.
    pub fn child_nodes_mut(&mut self) -> Option<&mut Vec<SerializedNode>> {
        match &mut self.data {
            NodeData::Document { child_nodes, .. } => Some(child_nodes),
            NodeData::Element(element) => Some(&mut element.child_nodes),
            _ => None,
        }
    }

    /// The element payload, if this is an element.
    #[must_use]
    pub const fn as_element(&self) -> Option<&ElementNode> {
        match &self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutable element payload, if this is an element.
    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match &mut self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Text of a text, CDATA or comment node.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { text_content, .. }
            | NodeData::CData { text_content }
            | NodeData::Comment { text_content } => Some(text_content),
            _ => None,
        }
    }

    /// A copy without children, as kept in a [`crate::Mirror`].
    #[must_use]
    pub fn shallow(&self) -> Self {
        let data = match &self.data {
            NodeData::Document { compat_mode, .. } => NodeData::Document {
                child_nodes: Vec::new(),
                compat_mode: compat_mode.clone(),
            },
            NodeData::Element(element) => NodeData::Element(ElementNode {
                tag_name: element.tag_name.clone(),
                attributes: element.attributes.clone(),
                child_nodes: Vec::new(),
                is_svg: element.is_svg,
                is_custom: element.is_custom,
                is_shadow_host: element.is_shadow_host,
                is_shadow: element.is_shadow,
                need_block: element.need_block,
            }),
            other => other.clone(),
        };
        Self {
            id: self.id,
            root_id: self.root_id,
            data,
        }
    }

    /// Meta-equality: whether a node built from `other` may be reused for
    /// `self`.
    ///
    /// Same kind, and then: compat mode for documents; name and ids for
    /// doctypes; text for text, CDATA and comments; tag and attribute set
    /// (order-insensitive) for elements. Children never take part.
    #[must_use]
    pub fn meta_equal(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (
                NodeData::Document { compat_mode: a, .. },
                NodeData::Document { compat_mode: b, .. },
            ) => a == b,
            (
                NodeData::DocumentType {
                    name: a_name,
                    public_id: a_public,
                    system_id: a_system,
                },
                NodeData::DocumentType {
                    name: b_name,
                    public_id: b_public,
                    system_id: b_system,
                },
            ) => a_name == b_name && a_public == b_public && a_system == b_system,
            (NodeData::Element(a), NodeData::Element(b)) => {
                a.tag_name == b.tag_name && a.attributes == b.attributes
            }
            (NodeData::Text { text_content: a, .. }, NodeData::Text { text_content: b, .. })
            | (NodeData::CData { text_content: a }, NodeData::CData { text_content: b })
            | (NodeData::Comment { text_content: a }, NodeData::Comment { text_content: b }) => {
                a == b
            }
            _ => false,
        }
    }
}

/// Flat JSON shape of a node: `type` plus whichever fields that kind uses.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNode {
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    child_nodes: Option<Vec<SerializedNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compat_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_content: Option<String>,
    #[serde(default, rename = "isSVG", skip_serializing_if = "is_false")]
    is_svg: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    is_custom: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    is_shadow_host: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    is_shadow: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    need_block: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    is_style: bool,
    id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root_id: Option<i64>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl WireNode {
    const fn empty(kind: NodeKind, id: i64, root_id: Option<i64>) -> Self {
        Self {
            kind,
            child_nodes: None,
            compat_mode: None,
            name: None,
            public_id: None,
            system_id: None,
            tag_name: None,
            attributes: None,
            text_content: None,
            is_svg: false,
            is_custom: false,
            is_shadow_host: false,
            is_shadow: false,
            need_block: false,
            is_style: false,
            id,
            root_id,
        }
    }
}

impl From<SerializedNode> for WireNode {
    fn from(node: SerializedNode) -> Self {
        let mut wire = Self::empty(node.kind(), node.id, node.root_id);
        match node.data {
            NodeData::Document {
                child_nodes,
                compat_mode,
            } => {
                wire.child_nodes = Some(child_nodes);
                wire.compat_mode = compat_mode;
            }
            NodeData::DocumentType {
                name,
                public_id,
                system_id,
            } => {
                wire.name = Some(name);
                wire.public_id = Some(public_id);
                wire.system_id = Some(system_id);
            }
            NodeData::Element(element) => {
                wire.tag_name = Some(element.tag_name);
                wire.attributes = Some(element.attributes);
                wire.child_nodes = Some(element.child_nodes);
                wire.is_svg = element.is_svg;
                wire.is_custom = element.is_custom;
                wire.is_shadow_host = element.is_shadow_host;
                wire.is_shadow = element.is_shadow;
                wire.need_block = element.need_block;
            }
            NodeData::Text {
                text_content,
                is_style,
            } => {
                wire.text_content = Some(text_content);
                wire.is_style = is_style;
            }
            NodeData::CData { text_content } | NodeData::Comment { text_content } => {
                wire.text_content = Some(text_content);
            }
        }
        wire
    }
}

/// A wire node missing a field its kind requires.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("serialized node is missing `{0}`")]
pub struct MissingField(&'static str);

impl TryFrom<WireNode> for SerializedNode {
    type Error = MissingField;

    fn try_from(wire: WireNode) -> Result<Self, Self::Error> {
        let data = match wire.kind {
            NodeKind::Document => NodeData::Document {
                child_nodes: wire.child_nodes.unwrap_or_default(),
                compat_mode: wire.compat_mode,
            },
            NodeKind::DocumentType => NodeData::DocumentType {
                name: wire.name.ok_or(MissingField("name"))?,
                public_id: wire.public_id.unwrap_or_default(),
                system_id: wire.system_id.unwrap_or_default(),
            },
            NodeKind::Element => NodeData::Element(ElementNode {
                tag_name: wire.tag_name.ok_or(MissingField("tagName"))?,
                attributes: wire.attributes.unwrap_or_default(),
                child_nodes: wire.child_nodes.unwrap_or_default(),
                is_svg: wire.is_svg,
                is_custom: wire.is_custom,
                is_shadow_host: wire.is_shadow_host,
                is_shadow: wire.is_shadow,
                need_block: wire.need_block,
            }),
            NodeKind::Text => NodeData::Text {
                text_content: wire.text_content.ok_or(MissingField("textContent"))?,
                is_style: wire.is_style,
            },
            NodeKind::CData => NodeData::CData {
                text_content: wire.text_content.unwrap_or_default(),
            },
            NodeKind::Comment => NodeData::Comment {
                text_content: wire.text_content.ok_or(MissingField("textContent"))?,
            },
        };
        Ok(Self {
            id: wire.id,
            root_id: wire.root_id,
            data,
        })
    }
}
