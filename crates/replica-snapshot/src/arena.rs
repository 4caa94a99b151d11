//! [`ArenaHost`]: the capture and replay host over a [`DomTree`].
//!
//! Resource events never fire on their own. A test or driver changes the
//! element state and calls [`ArenaHost::fire_load`] (or one of the
//! `load_*` helpers), which wakes whatever waits were armed on that node.

use std::cell::RefCell;
use std::collections::HashMap;

use replica_common::url::resolve_url;
use replica_dom::{
    DialogState, DocumentMode, DomTree, ElementData, MediaState, NodeId, NodeType, Raster,
    RasterAccess, SVG_NAMESPACE, SheetRead, SheetState, parse_selector,
};
use smol::channel::{Sender, bounded};
use tracing::trace;

use crate::host::{
    DialogMode, Doctype, HostError, LoadOutcome, MediaCommand, MediaSnapshot, NodeFactory,
    Readiness, SheetAccess, SourceKind, SourceTree, StylesheetHost,
};

/// A [`DomTree`] plus the listeners of pending resource waits.
///
/// Capture reads any document in the arena. Replay builds into the
/// *target* document, the arena root unless [`ArenaHost::with_target`]
/// says otherwise.
#[derive(Debug)]
pub struct ArenaHost {
    tree: DomTree,
    target: NodeId,
    listeners: RefCell<HashMap<NodeId, Vec<Sender<LoadOutcome>>>>,
}

impl ArenaHost {
    /// Host over `tree`, replaying into its top-level document.
    #[must_use]
    pub fn new(tree: DomTree) -> Self {
        Self::with_target(tree, NodeId::ROOT)
    }

    /// Host over `tree`, replaying into `document`.
    #[must_use]
    pub fn with_target(tree: DomTree, document: NodeId) -> Self {
        Self {
            tree,
            target: document,
            listeners: RefCell::new(HashMap::new()),
        }
    }

    /// The underlying tree.
    #[must_use]
    pub const fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// The underlying tree, mutably.
    pub const fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    /// Give the tree back.
    #[must_use]
    pub fn into_tree(self) -> DomTree {
        self.tree
    }

    /// Deliver `outcome` to every wait armed on `node`. Returns how many
    /// listeners received it.
    pub fn fire_load(&self, node: NodeId, outcome: LoadOutcome) -> usize {
        let listeners = self
            .listeners
            .borrow_mut()
            .remove(&node)
            .unwrap_or_default();
        let delivered = listeners
            .iter()
            .filter(|listener| listener.try_send(outcome).is_ok())
            .count();
        trace!(?node, ?outcome, delivered, "load event");
        delivered
    }

    /// Number of waits currently armed on `node`.
    #[must_use]
    pub fn listener_count(&self, node: NodeId) -> usize {
        self.listeners.borrow().get(&node).map_or(0, Vec::len)
    }

    /// Give `link` a sheet and fire its `load` event. `None` makes the sheet
    /// cross-origin (unreadable).
    pub fn load_stylesheet(&mut self, link: NodeId, css_text: Option<&str>) -> usize {
        if let Some(element) = self.tree.as_element_mut(link) {
            element.state.sheet = Some(SheetState {
                css_text: css_text.map(str::to_string),
                readable: css_text.is_some(),
            });
        }
        self.fire_load(link, LoadOutcome::Loaded)
    }

    /// Mark the document of `frame` complete and fire the frame's `load`.
    pub fn load_frame(&mut self, frame: NodeId) -> usize {
        let document = self.tree.as_element(frame).and_then(|e| e.content_document);
        if let Some(data) = document.and_then(|doc| self.tree.as_document_mut(doc)) {
            data.ready = true;
        }
        self.fire_load(frame, LoadOutcome::Loaded)
    }

    /// Decode `raster` into `image` and fire its `load`.
    pub fn load_image(&mut self, image: NodeId, raster: Raster, access: RasterAccess) -> usize {
        if let Some(element) = self.tree.as_element_mut(image) {
            element.state.raster = Some(raster);
            element.state.raster_access = access;
            element.state.complete = true;
        }
        self.fire_load(image, LoadOutcome::Loaded)
    }

    fn listen(&self, node: NodeId) -> Readiness {
        let (sender, receiver) = bounded(1);
        self.listeners
            .borrow_mut()
            .entry(node)
            .or_default()
            .push(sender);
        Readiness::Pending(receiver)
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.tree.as_element(node)
    }

    fn document_base(&self, node: NodeId) -> String {
        let document = self.tree.owner_document(node);
        self.tree
            .as_document(document)
            .map(|data| data.url.clone())
            .unwrap_or_default()
    }

    /// `link.href` resolved against the link's document.
    fn resolved_href(&self, link: NodeId) -> Option<String> {
        let href = self.tree.get_attribute(link, "href")?;
        Some(resolve_url(href, Some(&self.document_base(link))))
    }

    /// Whether drawing `node` onto a canvas leaves it readable.
    fn raster_readable(&self, node: NodeId) -> Result<(), HostError> {
        let element = self.element(node).ok_or(HostError::NotFound)?;
        match element.state.raster_access {
            RasterAccess::Open => Ok(()),
            RasterAccess::CorsEnabled
                if element.attrs.get("crossorigin").map(String::as_str) == Some("anonymous") =>
            {
                Ok(())
            }
            RasterAccess::CorsEnabled | RasterAccess::Opaque => Err(HostError::Security(
                "the canvas has been tainted by cross-origin data".to_string(),
            )),
        }
    }

    fn raster(&self, node: NodeId) -> Option<&Raster> {
        self.element(node).and_then(|e| e.state.raster.as_ref())
    }

    /// `value` before any user edit: the attribute, the text, or the
    /// selected option.
    fn default_value(&self, node: NodeId, tag_name: &str) -> Option<String> {
        match tag_name {
            "input" => self.tree.get_attribute(node, "value").map(str::to_string),
            "textarea" => Some(self.tree.text_content(node)),
            "select" => {
                let mut options = Vec::new();
                self.tree.collect_elements(node, "option", &mut options);
                let selected = options
                    .iter()
                    .copied()
                    .find(|&option| self.element(option).is_some_and(|e| e.state.selected))
                    .or_else(|| options.first().copied())?;
                Some(
                    self.tree
                        .get_attribute(selected, "value")
                        .map_or_else(|| self.tree.text_content(selected), str::to_string),
                )
            }
            _ => None,
        }
    }
}

impl Default for ArenaHost {
    fn default() -> Self {
        Self::new(DomTree::new())
    }
}

impl SourceTree for ArenaHost {
    type Node = NodeId;

    fn kind(&self, node: NodeId) -> SourceKind {
        match self.tree.get(node).map(|n| &n.node_type) {
            Some(NodeType::Document(_)) => SourceKind::Document,
            Some(NodeType::DocumentType { .. }) => SourceKind::DocumentType,
            Some(NodeType::Element(_)) => SourceKind::Element,
            Some(NodeType::Text(_)) => SourceKind::Text,
            Some(NodeType::CData(_)) => SourceKind::CData,
            Some(NodeType::Comment(_)) => SourceKind::Comment,
            Some(NodeType::ShadowRoot { .. }) | None => SourceKind::Other,
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.children(node).to_vec()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.parent(node)
    }

    fn is_shadow_root(&self, node: NodeId) -> bool {
        matches!(
            self.tree.get(node).map(|n| &n.node_type),
            Some(NodeType::ShadowRoot { .. })
        )
    }

    fn is_native_shadow_root(&self, root: NodeId) -> bool {
        matches!(
            self.tree.get(root).map(|n| &n.node_type),
            Some(NodeType::ShadowRoot { native: true, .. })
        )
    }

    fn shadow_root(&self, element: NodeId) -> Option<NodeId> {
        self.tree.shadow_root(element)
    }

    fn owner_document(&self, node: NodeId) -> NodeId {
        self.tree.owner_document(node)
    }

    fn frame_element(&self, document: NodeId) -> Option<NodeId> {
        self.tree.as_document(document).and_then(|data| data.frame)
    }

    fn document_url(&self, document: NodeId) -> String {
        self.tree
            .as_document(document)
            .map(|data| data.url.clone())
            .unwrap_or_default()
    }

    fn compat_mode(&self, document: NodeId) -> String {
        self.tree
            .as_document(document)
            .map_or(DocumentMode::NoQuirks, |data| data.mode)
            .compat_mode()
            .to_string()
    }

    fn doctype(&self, node: NodeId) -> Option<Doctype> {
        match self.tree.get(node).map(|n| &n.node_type) {
            Some(NodeType::DocumentType {
                name,
                public_id,
                system_id,
            }) => Some(Doctype {
                name: name.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            }),
            _ => None,
        }
    }

    fn tag_name(&self, element: NodeId) -> Option<String> {
        self.element(element).map(|e| e.tag_name.clone())
    }

    fn is_svg(&self, element: NodeId) -> bool {
        self.element(element)
            .is_some_and(|e| e.namespace.as_deref() == Some(SVG_NAMESPACE))
    }

    fn is_custom_element(&self, element: NodeId) -> bool {
        self.element(element).is_some_and(|e| {
            e.custom
                || self
                    .tree
                    .is_defined_custom_element(&e.tag_name.to_ascii_lowercase())
        })
    }

    fn attributes(&self, element: NodeId) -> Vec<(String, String)> {
        let mut attributes: Vec<(String, String)> = self
            .element(element)
            .map(|e| {
                e.attrs
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        // The arena stores attributes unordered.
        attributes.sort();
        attributes
    }

    fn attribute(&self, element: NodeId, name: &str) -> Option<String> {
        self.tree.get_attribute(element, name).map(str::to_string)
    }

    fn text(&self, node: NodeId) -> String {
        self.tree.text_content(node)
    }

    fn sheet(&self, element: NodeId) -> SheetAccess {
        match self.tree.sheet_text(element) {
            SheetRead::NoSheet => SheetAccess::None,
            SheetRead::Pending => SheetAccess::Pending,
            SheetRead::Blocked => SheetAccess::Blocked,
            SheetRead::Text(text) => SheetAccess::Text(text),
        }
    }

    fn input_type(&self, element: NodeId) -> Option<String> {
        match self.tree.tag_name(element)?.as_str() {
            "input" => Some(
                self.tree
                    .get_attribute(element, "type")
                    .map_or_else(|| "text".to_string(), str::to_ascii_lowercase),
            ),
            "textarea" => Some("textarea".to_string()),
            "select" if self.tree.get_attribute(element, "multiple").is_some() => {
                Some("select-multiple".to_string())
            }
            "select" => Some("select-one".to_string()),
            _ => None,
        }
    }

    fn form_value(&self, element: NodeId) -> Option<String> {
        let tag_name = self.tree.tag_name(element)?;
        let data = self.element(element)?;
        data.state
            .value
            .clone()
            .or_else(|| self.default_value(element, &tag_name))
    }

    fn is_checked(&self, element: NodeId) -> bool {
        self.element(element).is_some_and(|e| e.state.checked)
    }

    fn is_selected(&self, element: NodeId) -> bool {
        self.element(element).is_some_and(|e| e.state.selected)
    }

    fn scroll(&self, element: NodeId) -> (f64, f64) {
        self.element(element)
            .map_or((0.0, 0.0), |e| (e.state.scroll_left, e.state.scroll_top))
    }

    fn bounding_size(&self, element: NodeId) -> Result<(f64, f64), HostError> {
        self.element(element)
            .map(|e| (e.state.width, e.state.height))
            .ok_or(HostError::NotFound)
    }

    fn matches_selector(&self, element: NodeId, selector: &str) -> Result<bool, HostError> {
        let list =
            parse_selector(selector).map_err(|err| HostError::InvalidSelector(err.to_string()))?;
        Ok(list.matches(&self.tree, element))
    }

    fn canvas_data_url(
        &self,
        canvas: NodeId,
        mime_type: &str,
        _quality: Option<f64>,
    ) -> Result<String, HostError> {
        self.raster_readable(canvas)?;
        Ok(self.raster(canvas).map_or_else(
            || Raster::blank(0, 0).to_data_url(mime_type),
            |raster| raster.to_data_url(mime_type),
        ))
    }

    fn blank_canvas_data_url(
        &self,
        canvas: NodeId,
        mime_type: &str,
        _quality: Option<f64>,
    ) -> Result<String, HostError> {
        let (width, height) = self.raster(canvas).map_or((0, 0), |r| (r.width, r.height));
        Ok(Raster::blank(width, height).to_data_url(mime_type))
    }

    fn image_complete(&self, image: NodeId) -> bool {
        self.element(image)
            .is_some_and(|e| e.state.complete && e.state.raster.as_ref().is_some_and(|r| r.width > 0))
    }

    fn image_data_url(
        &self,
        image: NodeId,
        mime_type: &str,
        _quality: Option<f64>,
    ) -> Result<String, HostError> {
        let raster = self.raster(image).ok_or(HostError::NotFound)?;
        self.raster_readable(image)?;
        Ok(raster.to_data_url(mime_type))
    }

    fn media_state(&self, element: NodeId) -> Option<MediaSnapshot> {
        self.element(element)?.state.media.map(|media| MediaSnapshot {
            paused: media.paused,
            current_time: media.current_time,
            playback_rate: media.playback_rate,
            muted: media.muted,
            looping: media.looping,
            volume: media.volume,
        })
    }

    fn dialog_mode(&self, element: NodeId) -> Option<DialogMode> {
        self.element(element)?.state.dialog.map(|dialog| match dialog {
            DialogState::NonModal => DialogMode::NonModal,
            DialogState::Modal => DialogMode::Modal,
        })
    }

    fn content_document(&self, frame: NodeId) -> Option<NodeId> {
        self.element(frame)?.content_document
    }

    fn frame_readiness(&self, frame: NodeId) -> Option<Readiness> {
        let document = self.element(frame)?.content_document?;
        let ready = self.tree.as_document(document).is_some_and(|d| d.ready);
        Some(if ready {
            Readiness::Settled(LoadOutcome::Loaded)
        } else {
            self.listen(frame)
        })
    }

    fn image_readiness(&self, image: NodeId) -> Readiness {
        if self.image_complete(image) {
            Readiness::Settled(LoadOutcome::Loaded)
        } else {
            self.listen(image)
        }
    }

    /// The arena keeps the decoded raster; only the attribute changes.
    fn set_cross_origin(&mut self, element: NodeId, value: Option<&str>) {
        match value {
            Some(value) => self.tree.set_attribute(element, "crossorigin", value),
            None => self.tree.remove_attribute(element, "crossorigin"),
        }
    }
}

/// Attribute names `setAttribute` rejects with `InvalidCharacterError`.
fn valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'))
}

impl NodeFactory for ArenaHost {
    type Node = NodeId;

    fn document(&self) -> NodeId {
        self.target
    }

    fn create_document_type(&mut self, doctype: &Doctype) -> NodeId {
        self.tree.alloc_in(
            self.target,
            NodeType::DocumentType {
                name: doctype.name.clone(),
                public_id: doctype.public_id.clone(),
                system_id: doctype.system_id.clone(),
            },
        )
    }

    fn create_element(&mut self, tag_name: &str, svg: bool) -> NodeId {
        self.tree.alloc_in(
            self.target,
            NodeType::Element(ElementData {
                tag_name: tag_name.to_string(),
                namespace: svg.then(|| SVG_NAMESPACE.to_string()),
                ..ElementData::default()
            }),
        )
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.create_text(self.target, text)
    }

    fn create_cdata(&mut self, text: &str) -> NodeId {
        self.tree
            .alloc_in(self.target, NodeType::CData(text.to_string()))
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.tree
            .alloc_in(self.target, NodeType::Comment(text.to_string()))
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), HostError> {
        if !valid_attribute_name(name) {
            return Err(HostError::InvalidAttribute(name.to_string()));
        }
        if self.tree.as_element(element).is_none() {
            return Err(HostError::NotFound);
        }
        self.tree.set_attribute(element, name, value);
        Ok(())
    }

    fn set_attribute_ns(
        &mut self,
        element: NodeId,
        namespace: &str,
        name: &str,
        value: &str,
    ) -> Result<(), HostError> {
        if !valid_attribute_name(name) {
            return Err(HostError::InvalidAttribute(name.to_string()));
        }
        if self.tree.as_element(element).is_none() {
            return Err(HostError::NotFound);
        }
        self.tree.set_attribute_ns(element, namespace, name, value);
        Ok(())
    }

    fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        self.tree.attach_shadow(host, true)
    }

    fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.tree.shadow_root(host)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.children(node).to_vec()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.tree.tag_name(node)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.tree.append_child(parent, child);
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.tree.remove_child(parent, child);
    }

    fn is_custom_element_defined(&self, name: &str) -> bool {
        self.tree.is_defined_custom_element(name)
    }

    fn define_custom_element(&mut self, name: &str) {
        let _ = self.tree.define_custom_element(name);
    }

    /// [§ 8.4.2 document.open()](https://html.spec.whatwg.org/multipage/dynamic-markup-insertion.html#dom-document-open)
    ///
    /// "Replace all with null within document"
    fn open_document(&mut self) {
        let children = self.tree.children(self.target).to_vec();
        for child in children {
            self.tree.remove_child(self.target, child);
        }
        if let Some(data) = self.tree.as_document_mut(self.target) {
            data.stream_open = true;
            data.written.clear();
            data.mode = DocumentMode::NoQuirks;
        }
    }

    fn close_document(&mut self) {
        if let Some(data) = self.tree.as_document_mut(self.target) {
            data.stream_open = false;
        }
    }

    /// Records the markup. A written doctype switches the document to
    /// quirks mode, which is all replay ever writes.
    fn write_document(&mut self, markup: &str) {
        let Some(data) = self.tree.as_document_mut(self.target) else {
            return;
        };
        if !data.stream_open {
            return;
        }
        if markup
            .get(..9)
            .is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"))
        {
            data.mode = DocumentMode::Quirks;
        }
        data.written.push(markup.to_string());
    }

    fn set_scroll(&mut self, element: NodeId, left: Option<f64>, top: Option<f64>) {
        if let Some(data) = self.tree.as_element_mut(element) {
            if let Some(left) = left {
                data.state.scroll_left = left;
            }
            if let Some(top) = top {
                data.state.scroll_top = top;
            }
        }
    }

    fn set_style_property(&mut self, element: NodeId, property: &str, value: &str) {
        let Some(data) = self.tree.as_element_mut(element) else {
            return;
        };
        match property {
            "width" => data.state.style_size.0 = Some(value.to_string()),
            "height" => data.state.style_size.1 = Some(value.to_string()),
            _ => {}
        }
    }

    fn apply_media(&mut self, element: NodeId, command: MediaCommand) -> Result<(), HostError> {
        let data = self
            .tree
            .as_element_mut(element)
            .ok_or(HostError::NotFound)?;
        let media = data.state.media.get_or_insert_with(MediaState::default);
        match command {
            MediaCommand::Play => media.paused = false,
            MediaCommand::Pause => media.paused = true,
            MediaCommand::Seek(time) => media.current_time = time,
            MediaCommand::PlaybackRate(rate) => media.playback_rate = rate,
            MediaCommand::Muted(muted) => media.muted = muted,
            MediaCommand::Loop(looping) => media.looping = looping,
            MediaCommand::Volume(volume) => media.volume = volume,
        }
        Ok(())
    }

    fn load_raster(&mut self, element: NodeId, data_url: &str) -> Result<(), HostError> {
        let raster = Raster::from_data_url(data_url)
            .map_err(|_| HostError::Unsupported("undecodable raster data URL"))?;
        let is_image = self.tree.tag_name(element).as_deref() == Some("img");
        let data = self
            .tree
            .as_element_mut(element)
            .ok_or(HostError::NotFound)?;
        data.state.raster = Some(raster);
        if is_image {
            data.state.complete = true;
            let _ = data
                .attrs
                .insert("src".to_string(), data_url.to_string());
        }
        Ok(())
    }

    fn current_src(&self, image: NodeId) -> Option<String> {
        self.tree.get_attribute(image, "src").map(str::to_string)
    }

    fn is_dialog_open(&self, dialog: NodeId) -> bool {
        self.element(dialog).is_some_and(|e| e.state.dialog.is_some())
    }

    fn show_dialog(&mut self, dialog: NodeId, mode: DialogMode) {
        if let Some(data) = self.tree.as_element_mut(dialog) {
            data.state.dialog = Some(match mode {
                DialogMode::NonModal => DialogState::NonModal,
                DialogMode::Modal => DialogState::Modal,
            });
        }
    }
}

impl StylesheetHost for ArenaHost {
    type Node = NodeId;

    fn location(&self) -> String {
        self.document_url(NodeId::ROOT)
    }

    fn sheet_url(&self, link: NodeId) -> Option<String> {
        self.resolved_href(link)
    }

    fn get_attribute(&self, element: NodeId, name: &str) -> Option<String> {
        self.tree.get_attribute(element, name).map(str::to_string)
    }

    fn clone_node(&mut self, node: NodeId) -> NodeId {
        let clone = self.tree.clone_node(node);
        if let Some(data) = self.tree.as_element_mut(clone) {
            data.state.sheet = Some(SheetState {
                css_text: None,
                readable: true,
            });
        }
        clone
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        self.tree.set_attribute(element, name, value);
    }

    fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        self.tree.insert_after(reference, node);
    }

    fn remove_node(&mut self, node: NodeId) {
        self.tree.detach(node);
    }

    fn mark_mutated(&mut self, node: NodeId) {
        self.tree.mark_mutated(node);
    }

    fn find_sheet_text(&self, url: &str) -> Option<String> {
        let mut links = Vec::new();
        self.tree.collect_elements(NodeId::ROOT, "link", &mut links);
        links.iter().rev().find_map(|&link| {
            if self.resolved_href(link).as_deref() != Some(url) {
                return None;
            }
            match self.tree.sheet_text(link) {
                SheetRead::Text(text) => Some(text),
                _ => None,
            }
        })
    }

    fn stylesheet_readiness(&self, link: NodeId) -> Readiness {
        match self.tree.sheet_text(link) {
            SheetRead::Text(_) | SheetRead::Blocked => Readiness::Settled(LoadOutcome::Loaded),
            SheetRead::Pending | SheetRead::NoSheet => self.listen(link),
        }
    }
}
