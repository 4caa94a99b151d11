//! Arena DOM host tree for the replica snapshot engine.
//!
//! This crate provides an arena-based DOM tree structure following the
//! [DOM Living Standard](https://dom.spec.whatwg.org/), carrying the live
//! state a snapshot needs to observe or restore: form values, scroll
//! offsets, geometry, media transport, raster surfaces and stylesheets.
//!
//! # Design
//!
//! The tree uses arena allocation with [`NodeId`] indices for all relationships,
//! providing O(1) access and traversal without borrow checker issues. One
//! arena can hold several documents (a top-level document plus the nested
//! documents of its frames); every node records its owner document.

use std::collections::{HashMap, HashSet};

pub mod print;
pub mod raster;
pub mod selector;

pub use print::{format_tree, print_tree};
pub use raster::{Raster, RasterAccess, RasterError};
pub use selector::{SelectorError, SelectorList, parse_selector};

/// Map of attribute names to values for an element.
pub type AttributesMap = HashMap<String, String>;

/// The HTML namespace.
pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
/// The SVG namespace.
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
/// The XLink namespace, for `xlink:` attributes on SVG elements.
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// A type-safe index into the DOM tree.
///
/// [§ 4.4 Interface Node](https://dom.spec.whatwg.org/#interface-node)
/// "Each node has an associated node document..."
///
/// NodeId provides O(1) access to any node in the tree without borrowing issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The top-level document node is always at index 0.
    pub const ROOT: NodeId = NodeId(0);
}

/// [§ 4.4 Interface Node](https://dom.spec.whatwg.org/#interface-node)
///
/// "Node is an abstract interface that is used by all nodes in a tree."
/// "Each node has an associated node document... and parent (null or an element)."
#[derive(Debug, Clone)]
pub struct Node {
    /// "Each node has an associated node type"
    pub node_type: NodeType,

    /// [§ 4.4](https://dom.spec.whatwg.org/#concept-tree-parent)
    /// "An object that participates in a tree has a parent, which is either
    /// null or an object."
    pub parent: Option<NodeId>,

    /// [§ 4.4](https://dom.spec.whatwg.org/#concept-tree-child)
    /// "A node has an associated list of children"
    pub children: Vec<NodeId>,

    /// [§ 4.4](https://dom.spec.whatwg.org/#concept-tree-next-sibling)
    pub next_sibling: Option<NodeId>,

    /// [§ 4.4](https://dom.spec.whatwg.org/#concept-tree-previous-sibling)
    pub prev_sibling: Option<NodeId>,

    /// [§ 4.4](https://dom.spec.whatwg.org/#concept-node-document)
    /// "Each node has an associated node document, set upon creation"
    pub owner_document: NodeId,
}

/// [§ 4.4 Interface Node](https://dom.spec.whatwg.org/#interface-node)
///
/// "Each node has an associated node type"
#[derive(Debug, Clone)]
pub enum NodeType {
    /// [§ 4.5 Interface Document](https://dom.spec.whatwg.org/#interface-document)
    Document(DocumentData),
    /// [§ 4.6 Interface DocumentType](https://dom.spec.whatwg.org/#interface-documenttype)
    /// "Doctypes have an associated name, public ID, and system ID."
    DocumentType {
        /// The doctype name, e.g. `html`.
        name: String,
        /// The public identifier.
        public_id: String,
        /// The system identifier.
        system_id: String,
    },
    /// [§ 4.9 Interface Element](https://dom.spec.whatwg.org/#interface-element)
    Element(ElementData),
    /// [§ 4.10 Interface Text](https://dom.spec.whatwg.org/#interface-text)
    Text(String),
    /// [§ 4.12 Interface CDATASection](https://dom.spec.whatwg.org/#interface-cdatasection)
    CData(String),
    /// [§ 4.7 Interface Comment](https://dom.spec.whatwg.org/#interface-comment)
    Comment(String),
    /// [§ 4.8 Interface ShadowRoot](https://dom.spec.whatwg.org/#interface-shadowroot)
    /// "Shadow roots have an associated host"
    ShadowRoot {
        /// The element this shadow root is attached to.
        host: NodeId,
        /// Whether the root was created by the platform (`attachShadow`)
        /// rather than emulated by a script library.
        native: bool,
    },
}

/// [§ 4.5 Interface Document](https://dom.spec.whatwg.org/#interface-document)
///
/// "Each document has an associated URL, mode, and ... browsing context."
#[derive(Debug, Clone, Default)]
pub struct DocumentData {
    /// "A document has an associated URL"; also serves as the base URL.
    pub url: String,
    /// "Each document has an associated mode"
    pub mode: DocumentMode,
    /// The frame element whose nested browsing context shows this document,
    /// or `None` for a top-level document.
    pub frame: Option<NodeId>,
    /// `document.readyState === "complete"`
    pub ready: bool,
    /// Markup written through the open write stream, in order.
    pub written: Vec<String>,
    /// Whether the write stream is currently open.
    pub stream_open: bool,
}

/// [§ 4.5](https://dom.spec.whatwg.org/#concept-document-mode)
///
/// "Unless stated otherwise, a document's mode is "no-quirks"."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentMode {
    /// `CSS1Compat`
    #[default]
    NoQuirks,
    /// `CSS1Compat` with limited quirks.
    LimitedQuirks,
    /// `BackCompat`
    Quirks,
}

impl DocumentMode {
    /// The `document.compatMode` string for this mode.
    #[must_use]
    pub const fn compat_mode(self) -> &'static str {
        match self {
            Self::NoQuirks | Self::LimitedQuirks => "CSS1Compat",
            Self::Quirks => "BackCompat",
        }
    }
}

/// Element-specific data.
///
/// Per [§ 4.9 Interface Element](https://dom.spec.whatwg.org/#interface-element):
/// - "Elements have an associated namespace, namespace prefix, local name, custom element state,
///    custom element definition, is value."
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    /// "An element's local name", as written (host trees may upper-case it).
    pub tag_name: String,
    /// "An element has an associated attribute list"
    pub attrs: AttributesMap,
    /// "An element's namespace"; `None` means the HTML namespace.
    pub namespace: Option<String>,
    /// Namespaces of attributes set with `setAttributeNS`, by qualified name.
    pub attr_namespaces: AttributesMap,
    /// "custom element state" is "custom"
    pub custom: bool,
    /// The attached shadow root, if any.
    pub shadow_root: Option<NodeId>,
    /// For frame elements: the document of the nested browsing context.
    pub content_document: Option<NodeId>,
    /// Live state that is not reflected in attributes.
    pub state: ElementState,
}

/// Live element state that markup alone does not capture.
#[derive(Debug, Clone, Default)]
pub struct ElementState {
    /// Current form control value (`input.value`, `textarea.value`, `select.value`).
    pub value: Option<String>,
    /// `input.checked`
    pub checked: bool,
    /// `option.selected`
    pub selected: bool,
    /// `element.scrollLeft`
    pub scroll_left: f64,
    /// `element.scrollTop`
    pub scroll_top: f64,
    /// Border-box width from `getBoundingClientRect()`.
    pub width: f64,
    /// Border-box height from `getBoundingClientRect()`.
    pub height: f64,
    /// Inline style sizing applied by a replayer (`style.width`, `style.height`).
    pub style_size: (Option<String>, Option<String>),
    /// Media transport state for `audio` / `video`.
    pub media: Option<MediaState>,
    /// Pixels for `canvas` and decoded `img` elements.
    pub raster: Option<Raster>,
    /// Whether reading the raster is allowed (cross-origin rules).
    pub raster_access: RasterAccess,
    /// Whether the image has finished loading (`img.complete`).
    pub complete: bool,
    /// Dialog state for `dialog` elements.
    pub dialog: Option<DialogState>,
    /// The associated CSS style sheet for `link` / `style` elements.
    pub sheet: Option<SheetState>,
}

/// [§ 4.8.11 Media elements](https://html.spec.whatwg.org/multipage/media.html#media-elements)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    /// `media.paused`
    pub paused: bool,
    /// `media.currentTime`
    pub current_time: f64,
    /// `media.playbackRate`
    pub playback_rate: f64,
    /// `media.muted`
    pub muted: bool,
    /// `media.loop`
    pub looping: bool,
    /// `media.volume`
    pub volume: f64,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            paused: true,
            current_time: 0.0,
            playback_rate: 1.0,
            muted: false,
            looping: false,
            volume: 1.0,
        }
    }
}

/// [§ 4.11.4 The dialog element](https://html.spec.whatwg.org/multipage/interactive-elements.html#the-dialog-element)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// Opened with `show()`.
    NonModal,
    /// Opened with `showModal()`; matches `:modal`.
    Modal,
}

/// The CSSOM view of a `link` or `style` element's sheet.
#[derive(Debug, Clone, Default)]
pub struct SheetState {
    /// The serialized rules, once the sheet has loaded.
    pub css_text: Option<String>,
    /// `false` when reading `cssRules` throws a `SecurityError`.
    pub readable: bool,
}

/// Arena-based DOM tree with O(1) node access and traversal.
///
/// [§ 4 Nodes](https://dom.spec.whatwg.org/#nodes)
///
/// "The DOM represents a document as a tree. A tree is a finite hierarchical
/// tree structure."
#[derive(Debug, Clone)]
pub struct DomTree {
    /// All nodes in the tree, indexed by NodeId.
    /// The top-level Document node is always at index 0 (NodeId::ROOT).
    nodes: Vec<Node>,
    /// [§ 4.13.4 Custom element registry](https://html.spec.whatwg.org/multipage/custom-elements.html#customelementregistry)
    custom_elements: HashSet<String>,
    /// Nodes whose attributes were touched, in order, for change detection.
    mutations: Vec<NodeId>,
}

impl DomTree {
    /// Create a new DOM tree with just the top-level Document node.
    #[must_use]
    pub fn new() -> Self {
        Self::with_url("about:blank")
    }

    /// Create a new DOM tree whose top-level document has the given URL.
    #[must_use]
    pub fn with_url(url: &str) -> Self {
        let document = Node {
            node_type: NodeType::Document(DocumentData {
                url: url.to_string(),
                ready: true,
                ..DocumentData::default()
            }),
            parent: None,
            children: Vec::new(),
            next_sibling: None,
            prev_sibling: None,
            owner_document: NodeId::ROOT,
        };
        Self {
            nodes: vec![document],
            custom_elements: HashSet::new(),
            mutations: Vec::new(),
        }
    }

    /// Get the top-level document node ID.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by its ID.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Get a mutable reference to a node by its ID.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Get the number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the arena is empty (should always have at least the Document).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a new node owned by the top-level document and return its ID.
    /// The node is not yet attached to the tree.
    pub fn alloc(&mut self, node_type: NodeType) -> NodeId {
        self.alloc_in(NodeId::ROOT, node_type)
    }

    /// Allocate a new node owned by `document`.
    pub fn alloc_in(&mut self, document: NodeId, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            node_type,
            parent: None,
            children: Vec::new(),
            next_sibling: None,
            prev_sibling: None,
            owner_document: document,
        });
        id
    }

    /// Allocate a nested document for the frame element `frame`, and link it
    /// as the frame's content document.
    pub fn create_frame_document(&mut self, frame: NodeId, url: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            node_type: NodeType::Document(DocumentData {
                url: url.to_string(),
                frame: Some(frame),
                ..DocumentData::default()
            }),
            parent: None,
            children: Vec::new(),
            next_sibling: None,
            prev_sibling: None,
            owner_document: id,
        });
        if let Some(el) = self.as_element_mut(frame) {
            el.content_document = Some(id);
        }
        id
    }

    /// Allocate a detached HTML element owned by `document`.
    pub fn create_element(&mut self, document: NodeId, tag: &str) -> NodeId {
        self.alloc_in(
            document,
            NodeType::Element(ElementData {
                tag_name: tag.to_string(),
                ..ElementData::default()
            }),
        )
    }

    /// Allocate a detached text node owned by `document`.
    pub fn create_text(&mut self, document: NodeId, text: &str) -> NodeId {
        self.alloc_in(document, NodeType::Text(text.to_string()))
    }

    /// [§ 4.2.2 Append](https://dom.spec.whatwg.org/#concept-node-append)
    ///
    /// "To append a node to a parent, pre-insert node into parent before null."
    ///
    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        self.relink_children(parent);
    }

    /// [§ 4.2.3 Pre-insert](https://dom.spec.whatwg.org/#concept-node-pre-insert)
    ///
    /// Inserts `child` into `parent` immediately before `reference`. Falls
    /// back to appending when `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == reference);
        match position {
            Some(index) => self.nodes[parent.0].children.insert(index, child),
            None => self.nodes[parent.0].children.push(child),
        }
        self.nodes[child.0].parent = Some(parent);
        self.relink_children(parent);
    }

    /// Inserts `child` immediately after `reference` in `reference`'s parent.
    /// Does nothing when `reference` is detached.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        match self.next_sibling(reference) {
            Some(next) => self.insert_before(parent, child, next),
            None => self.append_child(parent, child),
        }
    }

    /// [§ 4.2.4 Remove](https://dom.spec.whatwg.org/#concept-node-remove)
    ///
    /// Removes `child` from `parent`. Does nothing if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.parent(child) == Some(parent) {
            self.detach(child);
        }
    }

    /// Detach a node from its parent, if it has one.
    pub fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes[child.0].parent else {
            return;
        };
        self.nodes[parent.0].children.retain(|&c| c != child);
        let node = &mut self.nodes[child.0];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        self.relink_children(parent);
    }

    /// Rebuild sibling links of `parent`'s children after a list change.
    fn relink_children(&mut self, parent: NodeId) {
        let children = self.nodes[parent.0].children.clone();
        for (index, &child) in children.iter().enumerate() {
            let prev = index.checked_sub(1).map(|i| children[i]);
            let next = children.get(index + 1).copied();
            let node = &mut self.nodes[child.0];
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
    }

    /// [§ 4.4 cloneNode](https://dom.spec.whatwg.org/#dom-node-clonenode)
    ///
    /// Shallow clone: same node type and data, no children, detached.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let source = &self.nodes[id.0];
        let node_type = match &source.node_type {
            NodeType::Element(data) => NodeType::Element(ElementData {
                shadow_root: None,
                content_document: None,
                ..data.clone()
            }),
            other => other.clone(),
        };
        let owner = source.owner_document;
        self.alloc_in(owner, node_type)
    }

    /// Get the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Get all children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Get the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.children.first().copied())
    }

    /// Get the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.children.last().copied())
    }

    /// Get the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.next_sibling)
    }

    /// Get the previous sibling of a node.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.prev_sibling)
    }

    /// The node document of `id`.
    #[must_use]
    pub fn owner_document(&self, id: NodeId) -> NodeId {
        self.get(id).map_or(NodeId::ROOT, |n| n.owner_document)
    }

    /// [§ 4.2.6 Descendant](https://dom.spec.whatwg.org/#concept-tree-descendant)
    ///
    /// Check if `descendant` is a descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, descendant: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(descendant).any(|id| id == ancestor)
    }

    /// Iterate over all ancestors of a node, from parent to root.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> AncestorIterator<'_> {
        AncestorIterator {
            tree: self,
            current: self.parent(id),
        }
    }

    /// Iterate over preceding siblings (from immediately before to first child).
    #[must_use]
    pub fn preceding_siblings(&self, id: NodeId) -> PrecedingSiblingIterator<'_> {
        PrecedingSiblingIterator {
            tree: self,
            current: self.prev_sibling(id),
        }
    }

    /// Get element data if this node is an element.
    #[must_use]
    pub fn as_element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(|n| match &n.node_type {
            NodeType::Element(data) => Some(data),
            _ => None,
        })
    }

    /// Get mutable element data if this node is an element.
    pub fn as_element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(|n| match &mut n.node_type {
            NodeType::Element(data) => Some(data),
            _ => None,
        })
    }

    /// Get document data if this node is a document.
    #[must_use]
    pub fn as_document(&self, id: NodeId) -> Option<&DocumentData> {
        self.get(id).and_then(|n| match &n.node_type {
            NodeType::Document(data) => Some(data),
            _ => None,
        })
    }

    /// Get mutable document data if this node is a document.
    pub fn as_document_mut(&mut self, id: NodeId) -> Option<&mut DocumentData> {
        self.get_mut(id).and_then(|n| match &mut n.node_type {
            NodeType::Document(data) => Some(data),
            _ => None,
        })
    }

    /// Get text content if this node is a text node.
    #[must_use]
    pub fn as_text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.node_type {
            NodeType::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Lower-cased local name if this node is an element.
    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        self.as_element(id).map(|e| e.tag_name.to_ascii_lowercase())
    }

    /// [§ 4.4 textContent](https://dom.spec.whatwg.org/#dom-node-textcontent)
    ///
    /// "the descendant text content of this" for elements and fragments, the
    /// data for character data nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        match self.get(id).map(|n| &n.node_type) {
            Some(NodeType::Text(s) | NodeType::CData(s) | NodeType::Comment(s)) => s.clone(),
            Some(NodeType::Element(_) | NodeType::ShadowRoot { .. }) => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            _ => String::new(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match self.get(child).map(|n| &n.node_type) {
                Some(NodeType::Text(s) | NodeType::CData(s)) => out.push_str(s),
                Some(NodeType::Element(_)) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Replace the data of a text, CDATA or comment node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.get_mut(id) {
            match &mut node.node_type {
                NodeType::Text(s) | NodeType::CData(s) | NodeType::Comment(s) => {
                    *s = text.to_string();
                }
                _ => {}
            }
        }
    }

    /// `element.getAttribute(name)`
    #[must_use]
    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.as_element(id)
            .and_then(|e| e.attrs.get(name))
            .map(String::as_str)
    }

    /// `element.setAttribute(name, value)`; no-op on non-elements.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.as_element_mut(id) {
            let _ = el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    /// `element.setAttributeNS(namespace, name, value)`; no-op on non-elements.
    ///
    /// [§ 4.9 setAttributeNS](https://dom.spec.whatwg.org/#dom-element-setattributens)
    pub fn set_attribute_ns(&mut self, id: NodeId, namespace: &str, name: &str, value: &str) {
        if let Some(el) = self.as_element_mut(id) {
            let _ = el.attrs.insert(name.to_string(), value.to_string());
            let _ = el
                .attr_namespaces
                .insert(name.to_string(), namespace.to_string());
        }
    }

    /// The namespace an attribute was set in, if any.
    #[must_use]
    pub fn attribute_namespace(&self, id: NodeId, name: &str) -> Option<&str> {
        self.as_element(id)
            .and_then(|e| e.attr_namespaces.get(name))
            .map(String::as_str)
    }

    /// `element.removeAttribute(name)`
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.as_element_mut(id) {
            let _ = el.attrs.remove(name);
            let _ = el.attr_namespaces.remove(name);
        }
    }

    /// [§ 4.8.2.1 attachShadow](https://dom.spec.whatwg.org/#dom-element-attachshadow)
    ///
    /// Returns the existing shadow root when one is already attached.
    pub fn attach_shadow(&mut self, host: NodeId, native: bool) -> NodeId {
        if let Some(existing) = self.as_element(host).and_then(|e| e.shadow_root) {
            return existing;
        }
        let owner = self.owner_document(host);
        let root = self.alloc_in(owner, NodeType::ShadowRoot { host, native });
        if let Some(el) = self.as_element_mut(host) {
            el.shadow_root = Some(root);
        }
        root
    }

    /// The shadow root attached to `host`, if any.
    #[must_use]
    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.as_element(host).and_then(|e| e.shadow_root)
    }

    /// Register a custom element name. Returns `false` if it was already defined.
    pub fn define_custom_element(&mut self, name: &str) -> bool {
        self.custom_elements.insert(name.to_string())
    }

    /// Whether `name` has a custom element definition.
    #[must_use]
    pub fn is_defined_custom_element(&self, name: &str) -> bool {
        self.custom_elements.contains(name)
    }

    /// Record that `id` was mutated, so change detection picks it up.
    pub fn mark_mutated(&mut self, id: NodeId) {
        self.mutations.push(id);
    }

    /// Drain the mutation log.
    pub fn take_mutations(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.mutations)
    }

    /// [CSSOM § 6.1](https://drafts.csswg.org/cssom/#the-linkstyle-interface)
    ///
    /// The text of the sheet associated with a `link` or `style` element.
    /// `style` elements without an explicit sheet reflect their text
    /// children.
    #[must_use]
    pub fn sheet_text(&self, id: NodeId) -> SheetRead {
        let Some(el) = self.as_element(id) else {
            return SheetRead::NoSheet;
        };
        match &el.state.sheet {
            Some(sheet) if !sheet.readable => SheetRead::Blocked,
            Some(SheetState {
                css_text: Some(text),
                ..
            }) => SheetRead::Text(text.clone()),
            Some(_) => SheetRead::Pending,
            None if el.tag_name.eq_ignore_ascii_case("style") => {
                SheetRead::Text(self.text_content(id))
            }
            None => SheetRead::NoSheet,
        }
    }

    /// [CSSOM § 6.2](https://drafts.csswg.org/cssom/#dom-documentorshadowroot-stylesheets)
    ///
    /// Scan the document's `link` elements from the end and return the text
    /// of the last readable, loaded sheet whose `href` resolves to `url`.
    #[must_use]
    pub fn find_sheet_text(&self, document: NodeId, url: &str) -> Option<String> {
        let mut links = Vec::new();
        self.collect_elements(document, "link", &mut links);
        links.iter().rev().find_map(|&link| {
            let href = self.get_attribute(link, "href")?;
            if href != url {
                return None;
            }
            match self.sheet_text(link) {
                SheetRead::Text(text) => Some(text),
                _ => None,
            }
        })
    }

    /// Collect descendants of `root` with the given tag, in tree order.
    pub fn collect_elements(&self, root: NodeId, tag: &str, out: &mut Vec<NodeId>) {
        for &child in self.children(root) {
            if self
                .as_element(child)
                .is_some_and(|e| e.tag_name.eq_ignore_ascii_case(tag))
            {
                out.push(child);
            }
            self.collect_elements(child, tag, out);
        }
    }

    /// [§ 3.1.1 The document element](https://html.spec.whatwg.org/multipage/dom.html#the-html-element-2)
    ///
    /// "The document element of a document is the element whose parent is that
    /// document, if it exists; otherwise null."
    #[must_use]
    pub fn document_element(&self, document: NodeId) -> Option<NodeId> {
        self.children(document)
            .iter()
            .find(|&&id| self.as_element(id).is_some())
            .copied()
    }

    /// [§ 3.1.3 The body element](https://html.spec.whatwg.org/multipage/dom.html#the-body-element-2)
    ///
    /// "The body element of a document is the first of the html element's children
    /// that is either a body element or a frameset element, or null if there is
    /// no such element."
    #[must_use]
    pub fn body(&self, document: NodeId) -> Option<NodeId> {
        let html = self.document_element(document)?;

        self.children(html)
            .iter()
            .find(|&&id| {
                self.tag_name(id)
                    .is_some_and(|tag| tag == "body" || tag == "frameset")
            })
            .copied()
    }
}

/// Result of reading a `link`/`style` element's sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRead {
    /// The element has no associated sheet.
    NoSheet,
    /// The sheet exists but has not loaded yet.
    Pending,
    /// Reading `cssRules` throws (cross-origin sheet).
    Blocked,
    /// The serialized sheet text.
    Text(String),
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over ancestors of a node.
pub struct AncestorIterator<'a> {
    tree: &'a DomTree,
    current: Option<NodeId>,
}

impl Iterator for AncestorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.tree.parent(id);
        Some(id)
    }
}

/// Iterator over preceding siblings of a node.
pub struct PrecedingSiblingIterator<'a> {
    tree: &'a DomTree,
    current: Option<NodeId>,
}

impl Iterator for PrecedingSiblingIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.tree.prev_sibling(id);
        Some(id)
    }
}
