//! Replay: serialized graph to live nodes.
//!
//! [`Materializer`] builds host nodes through a [`NodeFactory`], registering
//! each one in the replay [`Mirror`]. A node whose id is already bound to a
//! meta-equal node is reused as is, so rebuilding the same graph twice
//! builds nothing the second time.

mod attributes;

use replica_css::{BuildCache, adapt_css_for_replay};
use tracing::warn;

use crate::host::{Doctype, NodeFactory};
use crate::mirror::Mirror;
use crate::policy::BuildOptions;
use crate::types::{AttributeValue, NodeData, NodeKind, RrAttribute, SerializedNode};

/// `document.write` payloads forcing quirks mode.
const XHTML_QUIRKS_DOCTYPE: &str =
    r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "">"#;
const HTML4_QUIRKS_DOCTYPE: &str =
    r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.0 Transitional//EN" "">"#;
const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Builds host nodes from serialized nodes.
pub struct Materializer<'a, F: NodeFactory> {
    factory: &'a mut F,
    mirror: &'a mut Mirror<F::Node>,
    cache: &'a mut BuildCache,
    options: &'a BuildOptions,
    after_append: Option<&'a mut dyn FnMut(F::Node, i64)>,
}

impl<'a, F: NodeFactory> Materializer<'a, F> {
    /// A materializer building into `factory` and registering in `mirror`.
    pub fn new(
        factory: &'a mut F,
        mirror: &'a mut Mirror<F::Node>,
        cache: &'a mut BuildCache,
        options: &'a BuildOptions,
    ) -> Self {
        Self {
            factory,
            mirror,
            cache,
            options,
            after_append: None,
        }
    }

    /// Call `hook(child, id)` after every child is appended.
    #[must_use]
    pub fn with_after_append(mut self, hook: &'a mut dyn FnMut(F::Node, i64)) -> Self {
        self.after_append = Some(hook);
        self
    }

    /// Build `node` and its subtree; returns the built (or reused) node.
    pub fn build(&mut self, node: &SerializedNode) -> Option<F::Node> {
        let skip_child = self.options.skip_child;
        self.build_with_sn(node, skip_child, true)
    }

    /// Build `node`, then apply deferred scroll offsets to every node in
    /// the mirror and call `on_visit` with each.
    pub fn rebuild(
        &mut self,
        node: &SerializedNode,
        mut on_visit: Option<&mut dyn FnMut(F::Node)>,
    ) -> Option<F::Node> {
        let built = self.build(node);
        for id in self.mirror.get_ids() {
            let Some(visited) = self.mirror.get_node(id) else {
                continue;
            };
            if let Some(visit) = on_visit.as_deref_mut() {
                visit(visited);
            }
            self.apply_scroll(visited);
        }
        built
    }

    fn apply_scroll(&mut self, node: F::Node) {
        let Some(element) = self.mirror.get_meta(node).and_then(SerializedNode::as_element) else {
            return;
        };
        let offset = |attribute: RrAttribute| {
            element
                .attributes
                .get(attribute.as_ref())
                .and_then(AttributeValue::as_f64)
        };
        let left = offset(RrAttribute::ScrollLeft);
        let top = offset(RrAttribute::ScrollTop);
        if left.is_some() || top.is_some() {
            self.factory.set_scroll(node, left, top);
        }
    }

    fn build_with_sn(
        &mut self,
        node: &SerializedNode,
        skip_child: bool,
        outermost: bool,
    ) -> Option<F::Node> {
        if let Some(existing) = self.mirror.get_node(node.id)
            && self
                .mirror
                .get_meta(existing)
                .is_some_and(|meta| meta.meta_equal(node))
        {
            return Some(existing);
        }

        let (mut built, style_texts, skip_children) = self.build_node(node);

        let document = self.factory.document();
        if let Some(root_id) = node.root_id
            && self.mirror.get_node(root_id) != Some(document)
        {
            self.mirror.replace(root_id, document);
        }

        if let NodeData::Document {
            child_nodes,
            compat_mode,
        } = &node.data
        {
            self.factory.close_document();
            self.factory.open_document();
            if compat_mode.as_deref() == Some("BackCompat")
                && let Some(first) = child_nodes.first()
                && first.kind() != NodeKind::DocumentType
            {
                let xhtml = first.as_element().is_some_and(|element| {
                    element.attributes.get("xmlns").and_then(AttributeValue::as_str)
                        == Some(XHTML_NAMESPACE)
                });
                self.factory.write_document(if xhtml {
                    XHTML_QUIRKS_DOCTYPE
                } else {
                    HTML4_QUIRKS_DOCTYPE
                });
            }
            built = document;
            if self.mirror.get_node(node.id).is_some_and(|bound| bound != document) {
                self.mirror.replace(node.id, document);
            }
        }

        self.mirror.add(built, node);

        let builds_children = matches!(node.kind(), NodeKind::Document | NodeKind::Element);
        if builds_children && !skip_child && !skip_children {
            self.build_children(node, built, style_texts, outermost);
        }
        Some(built)
    }

    fn build_children(
        &mut self,
        node: &SerializedNode,
        built: F::Node,
        style_texts: Option<Vec<String>>,
        outermost: bool,
    ) {
        let mut style_texts = style_texts.map(Vec::into_iter);
        let is_document = node.kind() == NodeKind::Document;
        for child in node.child_nodes() {
            let child_node = match (&mut style_texts, &child.data) {
                (Some(texts), NodeData::Text { .. }) => {
                    let text = texts.next().unwrap_or_default();
                    self.build_style_text(child, &text)
                }
                _ => self.build_with_sn(child, false, false),
            };
            let Some(child_node) = child_node else {
                warn!(id = child.id, "failed to rebuild node");
                continue;
            };

            let is_shadow = child.as_element().is_some_and(|element| element.is_shadow);
            if is_shadow && let Some(root) = self.factory.shadow_root(built) {
                self.factory.append_child(root, child_node);
            } else if is_document && outermost && child.kind() == NodeKind::Element {
                self.append_root_element(built, child_node);
            } else {
                self.factory.append_child(built, child_node);
            }
            if let Some(hook) = self.after_append.as_deref_mut() {
                hook(child_node, child.id);
            }
        }
    }

    /// Append a document's root element with `body` detached around the
    /// append, so `body` is inserted into an attached tree.
    fn append_root_element(&mut self, document: F::Node, root: F::Node) {
        let body = self
            .factory
            .children(root)
            .into_iter()
            .find(|child| self.factory.tag_name(*child).as_deref() == Some("body"));
        match body {
            Some(body) => {
                self.factory.remove_child(root, body);
                self.factory.append_child(document, root);
                self.factory.append_child(root, body);
            }
            None => self.factory.append_child(document, root),
        }
    }

    /// A style text child whose content came from splitting the parent's
    /// `_cssText`. The text is already adapted.
    fn build_style_text(&mut self, child: &SerializedNode, text: &str) -> Option<F::Node> {
        if let Some(existing) = self.mirror.get_node(child.id)
            && self
                .mirror
                .get_meta(existing)
                .is_some_and(|meta| meta.meta_equal(child))
        {
            return Some(existing);
        }
        let built = self.factory.create_text(text);
        self.mirror.add(built, child);
        Some(built)
    }

    /// Create the host node for `node` without children. Also returns the
    /// split style texts for its text children, and whether serialized
    /// children are replaced.
    fn build_node(&mut self, node: &SerializedNode) -> (F::Node, Option<Vec<String>>, bool) {
        let built = match &node.data {
            NodeData::Document { .. } => self.factory.document(),
            NodeData::DocumentType {
                name,
                public_id,
                system_id,
            } => self.factory.create_document_type(&Doctype {
                name: if name.is_empty() { "html".to_string() } else { name.clone() },
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            }),
            NodeData::Element(element) => {
                let built = self.build_element(element);
                return (built.node, built.style_texts, built.replaces_children);
            }
            NodeData::Text {
                text_content,
                is_style,
            } => {
                if *is_style && self.options.hack_css {
                    let adapted = adapt_css_for_replay(text_content, self.cache);
                    self.factory.create_text(&adapted)
                } else {
                    self.factory.create_text(text_content)
                }
            }
            NodeData::CData { text_content } => self.factory.create_cdata(text_content),
            NodeData::Comment { text_content } => self.factory.create_comment(text_content),
        };
        (built, None, false)
    }
}

/// Build `node` into `factory` and apply scroll offsets.
///
/// A convenience over [`Materializer::rebuild`] without hooks.
pub fn rebuild<F: NodeFactory>(
    node: &SerializedNode,
    factory: &mut F,
    mirror: &mut Mirror<F::Node>,
    cache: &mut BuildCache,
    options: &BuildOptions,
) -> Option<F::Node> {
    Materializer::new(factory, mirror, cache, options).rebuild(node, None)
}
