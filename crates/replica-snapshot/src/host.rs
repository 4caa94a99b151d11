//! Host tree interfaces.
//!
//! The engine never owns real nodes. Capture reads a [`SourceTree`], replay
//! builds through a [`NodeFactory`], and the stylesheet manager mutates a
//! [`StylesheetHost`]. [`crate::arena::ArenaHost`] implements all three over
//! a [`replica_dom::DomTree`].

use std::fmt::Debug;
use std::hash::Hash;

use smol::channel::Receiver;
use thiserror::Error;

/// Failure of a host query or command.
///
/// These never escape past one node: the engine treats them as "not
/// applicable" and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The node does not exist or has the wrong kind.
    #[error("node not found or not applicable")]
    NotFound,
    /// The host refused for security reasons (tainted canvas, cross-origin
    /// sheet).
    #[error("security error: {0}")]
    Security(String),
    /// A selector the host cannot parse or match.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    /// An attribute name the host rejects.
    #[error("invalid attribute name: {0}")]
    InvalidAttribute(String),
    /// The host does not support this operation.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// How a one-shot resource wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The `load` event fired.
    Loaded,
    /// The `error` event fired.
    Failed,
}

/// Readiness of an asynchronous sub-resource when it is observed.
#[derive(Debug)]
pub enum Readiness {
    /// Already settled. The completion is still delivered on a later turn.
    Settled(LoadOutcome),
    /// Not settled yet; the receiver yields the outcome once.
    Pending(Receiver<LoadOutcome>),
}

/// [§ 4.4 nodeType](https://dom.spec.whatwg.org/#dom-node-nodetype)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `DOCUMENT_NODE`
    Document,
    /// `DOCUMENT_TYPE_NODE`
    DocumentType,
    /// `ELEMENT_NODE`
    Element,
    /// `TEXT_NODE`
    Text,
    /// `CDATA_SECTION_NODE`
    CData,
    /// `COMMENT_NODE`
    Comment,
    /// Anything else (processing instructions, fragments, shadow roots).
    Other,
}

/// A document type's three fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Doctype {
    /// The doctype name.
    pub name: String,
    /// The public identifier.
    pub public_id: String,
    /// The system identifier.
    pub system_id: String,
}

/// What reading a `link`/`style` element's sheet yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetAccess {
    /// No sheet is associated.
    None,
    /// The sheet has not loaded.
    Pending,
    /// Reading `cssRules` throws (cross-origin).
    Blocked,
    /// The serialized rules.
    Text(String),
}

/// Media transport state of an `audio` or `video` element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaSnapshot {
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

/// How a `dialog` element is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogMode {
    /// `show()`
    NonModal,
    /// `showModal()`
    Modal,
}

impl DialogMode {
    /// The `rr_open_mode` value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonModal => "non-modal",
            Self::Modal => "modal",
        }
    }
}

/// A media command issued on rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaCommand {
    /// `media.play()`
    Play,
    /// `media.pause()`
    Pause,
    /// Set `currentTime`.
    Seek(f64),
    /// Set `playbackRate`.
    PlaybackRate(f64),
    /// Set `muted`.
    Muted(bool),
    /// Set `loop`.
    Loop(bool),
    /// Set `volume`.
    Volume(f64),
}

/// Read access to a live tree for capture.
///
/// Queries that can throw in a real host return `Result`; the serializer
/// treats an error as "not applicable".
pub trait SourceTree {
    /// Host node handle.
    type Node: Copy + Eq + Hash + Debug;

    /// The node's kind.
    fn kind(&self, node: Self::Node) -> SourceKind;
    /// Light children in tree order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
    /// Parent node (a shadow root's parent is `None`).
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    /// Whether `node` is a shadow root.
    fn is_shadow_root(&self, node: Self::Node) -> bool;
    /// Whether the shadow root `root` was attached natively.
    fn is_native_shadow_root(&self, root: Self::Node) -> bool;
    /// The shadow root attached to `element`.
    fn shadow_root(&self, element: Self::Node) -> Option<Self::Node>;
    /// The node document.
    fn owner_document(&self, node: Self::Node) -> Self::Node;
    /// The frame element hosting `document`, for nested documents.
    fn frame_element(&self, document: Self::Node) -> Option<Self::Node>;
    /// The document's URL, used as the base for relative URLs.
    fn document_url(&self, document: Self::Node) -> String;
    /// `document.compatMode`
    fn compat_mode(&self, document: Self::Node) -> String;
    /// Fields of a doctype node.
    fn doctype(&self, node: Self::Node) -> Option<Doctype>;
    /// The element's tag name as the host reports it.
    fn tag_name(&self, element: Self::Node) -> Option<String>;
    /// Whether the element is in the SVG namespace.
    fn is_svg(&self, element: Self::Node) -> bool;
    /// Whether a custom element definition exists for the element's name.
    fn is_custom_element(&self, element: Self::Node) -> bool;
    /// Attributes in host order.
    fn attributes(&self, element: Self::Node) -> Vec<(String, String)>;
    /// One attribute.
    fn attribute(&self, element: Self::Node, name: &str) -> Option<String>;
    /// Data of a text, CDATA or comment node.
    fn text(&self, node: Self::Node) -> String;
    /// The sheet of a `style` element, or of the `link` element `element`.
    fn sheet(&self, element: Self::Node) -> SheetAccess;
    /// The element's `input.type`, lower-cased.
    fn input_type(&self, element: Self::Node) -> Option<String>;
    /// Current form control value.
    fn form_value(&self, element: Self::Node) -> Option<String>;
    /// `input.checked`
    fn is_checked(&self, element: Self::Node) -> bool;
    /// `option.selected`
    fn is_selected(&self, element: Self::Node) -> bool;
    /// `(scrollLeft, scrollTop)`
    fn scroll(&self, element: Self::Node) -> (f64, f64);
    /// Border-box `(width, height)`.
    ///
    /// # Errors
    ///
    /// Fails when the host cannot lay out the element.
    fn bounding_size(&self, element: Self::Node) -> Result<(f64, f64), HostError>;
    /// `element.matches(selector)`
    ///
    /// # Errors
    ///
    /// Fails for selectors the host cannot parse.
    fn matches_selector(&self, element: Self::Node, selector: &str) -> Result<bool, HostError>;
    /// `canvas.toDataURL(type, quality)`
    ///
    /// # Errors
    ///
    /// Fails for tainted canvases.
    fn canvas_data_url(
        &self,
        canvas: Self::Node,
        mime_type: &str,
        quality: Option<f64>,
    ) -> Result<String, HostError>;
    /// Data URL of a blank canvas the size of `canvas`.
    ///
    /// # Errors
    ///
    /// Fails when the host cannot create a canvas.
    fn blank_canvas_data_url(
        &self,
        canvas: Self::Node,
        mime_type: &str,
        quality: Option<f64>,
    ) -> Result<String, HostError>;
    /// Whether the image has loaded with a non-zero natural width.
    fn image_complete(&self, image: Self::Node) -> bool;
    /// Data URL of the image drawn onto a canvas.
    ///
    /// # Errors
    ///
    /// Fails when drawing taints the canvas.
    fn image_data_url(
        &self,
        image: Self::Node,
        mime_type: &str,
        quality: Option<f64>,
    ) -> Result<String, HostError>;
    /// Media transport state.
    fn media_state(&self, element: Self::Node) -> Option<MediaSnapshot>;
    /// How an open dialog was opened; `None` when closed.
    fn dialog_mode(&self, element: Self::Node) -> Option<DialogMode>;
    /// A frame's nested document, when it can be inspected.
    fn content_document(&self, frame: Self::Node) -> Option<Self::Node>;
    /// One-shot readiness of a frame's document. `None` when the frame has
    /// no browsing context.
    fn frame_readiness(&self, frame: Self::Node) -> Option<Readiness>;
    /// One-shot readiness of an image.
    fn image_readiness(&self, image: Self::Node) -> Readiness;
    /// Set or clear `crossorigin`, reissuing the request when it changes.
    fn set_cross_origin(&mut self, element: Self::Node, value: Option<&str>);
}

/// Tree-building target for rebuild.
pub trait NodeFactory {
    /// Host node handle.
    type Node: Copy + Eq + Hash + Debug;

    /// The document content is installed into.
    fn document(&self) -> Self::Node;
    /// `createDocumentType(name, publicId, systemId)`
    fn create_document_type(&mut self, doctype: &Doctype) -> Self::Node;
    /// `createElement` or `createElementNS(SVG_NS, ...)`.
    fn create_element(&mut self, tag_name: &str, svg: bool) -> Self::Node;
    /// `createTextNode`
    fn create_text(&mut self, text: &str) -> Self::Node;
    /// `createCDATASection`
    fn create_cdata(&mut self, text: &str) -> Self::Node;
    /// `createComment`
    fn create_comment(&mut self, text: &str) -> Self::Node;
    /// `setAttribute`
    ///
    /// # Errors
    ///
    /// Fails for names the host rejects.
    fn set_attribute(&mut self, element: Self::Node, name: &str, value: &str)
    -> Result<(), HostError>;
    /// `setAttributeNS`, used for `xlink:` names.
    ///
    /// # Errors
    ///
    /// Fails for names the host rejects.
    fn set_attribute_ns(
        &mut self,
        element: Self::Node,
        namespace: &str,
        name: &str,
        value: &str,
    ) -> Result<(), HostError>;
    /// `attachShadow({ mode: "open" })`
    fn attach_shadow(&mut self, host: Self::Node) -> Self::Node;
    /// The attached shadow root.
    fn shadow_root(&self, host: Self::Node) -> Option<Self::Node>;
    /// Children in tree order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
    /// Lower-cased tag name of an element.
    fn tag_name(&self, node: Self::Node) -> Option<String>;
    /// `appendChild`
    fn append_child(&mut self, parent: Self::Node, child: Self::Node);
    /// `removeChild`
    fn remove_child(&mut self, parent: Self::Node, child: Self::Node);
    /// Whether `customElements.get(name)` is defined.
    fn is_custom_element_defined(&self, name: &str) -> bool;
    /// Define an empty custom element class for `name`.
    fn define_custom_element(&mut self, name: &str);
    /// `document.open()`
    fn open_document(&mut self);
    /// `document.close()`
    fn close_document(&mut self);
    /// `document.write(markup)`
    fn write_document(&mut self, markup: &str);
    /// Set `scrollLeft` / `scrollTop`.
    fn set_scroll(&mut self, element: Self::Node, left: Option<f64>, top: Option<f64>);
    /// `style.setProperty(property, value)` for `width` / `height`.
    fn set_style_property(&mut self, element: Self::Node, property: &str, value: &str);
    /// Apply a media command.
    ///
    /// # Errors
    ///
    /// Fails when playback is refused.
    fn apply_media(&mut self, element: Self::Node, command: MediaCommand) -> Result<(), HostError>;
    /// Load `data_url` into an offscreen image and draw it into a canvas, or
    /// set it as an image's source.
    ///
    /// # Errors
    ///
    /// Fails when the data URL cannot be decoded.
    fn load_raster(&mut self, element: Self::Node, data_url: &str) -> Result<(), HostError>;
    /// `img.currentSrc`
    fn current_src(&self, image: Self::Node) -> Option<String>;
    /// `dialog.open`
    fn is_dialog_open(&self, dialog: Self::Node) -> bool;
    /// `dialog.show()` or `dialog.showModal()`.
    fn show_dialog(&mut self, dialog: Self::Node, mode: DialogMode);
}

/// Mutation access used by the stylesheet manager.
pub trait StylesheetHost {
    /// Host node handle.
    type Node: Copy + Eq + Hash + Debug;

    /// The current page location; a change means navigation.
    fn location(&self) -> String;
    /// `link.href`, resolved.
    fn sheet_url(&self, link: Self::Node) -> Option<String>;
    /// Read an attribute.
    fn get_attribute(&self, element: Self::Node, name: &str) -> Option<String>;
    /// Shallow `cloneNode()`, with any loaded sheet discarded.
    fn clone_node(&mut self, node: Self::Node) -> Self::Node;
    /// `setAttribute`
    fn set_attribute(&mut self, element: Self::Node, name: &str, value: &str);
    /// Insert `node` right after `reference`.
    fn insert_after(&mut self, reference: Self::Node, node: Self::Node);
    /// Detach `node` from its parent.
    fn remove_node(&mut self, node: Self::Node);
    /// Touch `node` so change detection re-serializes it.
    fn mark_mutated(&mut self, node: Self::Node);
    /// Text of the most recently inserted readable sheet loaded from `url`.
    fn find_sheet_text(&self, url: &str) -> Option<String>;
    /// One-shot readiness of a `link` element's sheet.
    fn stylesheet_readiness(&self, link: Self::Node) -> Readiness;
}
