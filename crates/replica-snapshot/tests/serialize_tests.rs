//! Capture tests over the arena host: ids, slim DOM, blocking, masking,
//! frames, styles and shadow roots.

use replica_dom::{DomTree, NodeId, NodeType, Raster, SheetState};
use replica_snapshot::{
    ArenaHost, AttributeValue, CaptureState, ClassMatcher, IGNORED_NODE, NodeData,
    SCRIPT_PLACEHOLDER, SerializePolicy, SerializedNode, Serializer, SlimDomOptions,
};

const PAGE_URL: &str = "https://site.test/dir/page.html";

/// Append an element with attributes under `parent`.
fn element(tree: &mut DomTree, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let document = tree.owner_document(parent);
    let id = tree.create_element(document, tag);
    for (name, value) in attrs {
        tree.set_attribute(id, name, value);
    }
    tree.append_child(parent, id);
    id
}

/// Append a text node under `parent`.
fn text(tree: &mut DomTree, parent: NodeId, data: &str) -> NodeId {
    let document = tree.owner_document(parent);
    let id = tree.create_text(document, data);
    tree.append_child(parent, id);
    id
}

/// `<html><body></body></html>` at [`PAGE_URL`]; returns the tree and body.
fn page() -> (DomTree, NodeId) {
    let mut tree = DomTree::with_url(PAGE_URL);
    let html = element(&mut tree, NodeId::ROOT, "html", &[]);
    let body = element(&mut tree, html, "body", &[]);
    (tree, body)
}

fn capture(host: &ArenaHost, node: NodeId, policy: &SerializePolicy) -> SerializedNode {
    let mut state = CaptureState::new();
    Serializer::new(host, &mut state, policy)
        .serialize(node)
        .expect("node should serialize")
}

fn attr<'a>(node: &'a SerializedNode, name: &str) -> Option<&'a AttributeValue> {
    node.as_element()?.attributes.get(name)
}

fn attr_str<'a>(node: &'a SerializedNode, name: &str) -> Option<&'a str> {
    attr(node, name)?.as_str()
}

// ========== ids ==========

#[test]
fn test_ids_are_consecutive_in_document_order() {
    let (mut tree, body) = page();
    let div = element(&mut tree, body, "div", &[]);
    let first = element(&mut tree, div, "h1", &[]);
    let _ = text(&mut tree, first, "A");
    let second = element(&mut tree, div, "h1", &[]);
    let _ = text(&mut tree, second, "B");
    let host = ArenaHost::new(tree);

    let node = capture(&host, div, &SerializePolicy::default());

    assert_eq!(node.id, 1);
    let children = node.child_nodes();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].id, 2);
    assert_eq!(children[0].child_nodes()[0].id, 3);
    assert_eq!(children[0].child_nodes()[0].text_content(), Some("A"));
    assert_eq!(children[1].id, 4);
    assert_eq!(children[1].child_nodes()[0].id, 5);
    assert_eq!(children[1].child_nodes()[0].text_content(), Some("B"));
}

#[test]
fn test_ids_are_stable_across_serializations() {
    let (mut tree, body) = page();
    let div = element(&mut tree, body, "div", &[("class", "a")]);
    let _ = text(&mut tree, div, "hello");
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy::default();
    let mut state = CaptureState::new();

    let first = Serializer::new(&host, &mut state, &policy)
        .serialize(body)
        .unwrap();
    let second = Serializer::new(&host, &mut state, &policy)
        .serialize(body)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(state.mirror.get_id(div), 2);
    assert_eq!(state.mirror.get_node(2), Some(div));
    assert_eq!(state.ids.peek(), 4);
}

#[test]
fn test_on_serialize_sees_every_identified_node() {
    let (mut tree, body) = page();
    let p = element(&mut tree, body, "p", &[]);
    let _ = text(&mut tree, p, "x");
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy::default();
    let mut state = CaptureState::new();
    let mut seen = Vec::new();
    let mut hook = |node: NodeId| seen.push(node);

    let _ = Serializer::new(&host, &mut state, &policy)
        .with_on_serialize(&mut hook)
        .serialize(body);

    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], body);
    assert_eq!(seen[1], p);
}

// ========== slim DOM and whitespace ==========

#[test]
fn test_slim_dom_excluded_nodes_get_sentinel() {
    let (mut tree, body) = page();
    let first = element(&mut tree, body, "p", &[]);
    let comment = tree.alloc(NodeType::Comment("note".to_string()));
    tree.append_child(body, comment);
    let script = element(&mut tree, body, "script", &[]);
    let _ = text(&mut tree, script, "alert(1)");
    let last = element(&mut tree, body, "p", &[]);
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        slim_dom_options: SlimDomOptions {
            comment: true,
            script: true,
            ..SlimDomOptions::default()
        },
        ..SerializePolicy::default()
    };
    let mut state = CaptureState::new();

    let node = Serializer::new(&host, &mut state, &policy)
        .serialize(body)
        .unwrap();

    let ids: Vec<i64> = node.child_nodes().iter().map(|child| child.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(state.mirror.get_id(comment), IGNORED_NODE);
    assert_eq!(state.mirror.get_id(script), IGNORED_NODE);
    assert_eq!(state.mirror.get_id(first), 2);
    assert_eq!(state.mirror.get_id(last), 3);
}

#[test]
fn test_whitespace_text_dropped_without_preserve() {
    let (mut tree, body) = page();
    let whitespace = text(&mut tree, body, "\n   ");
    let _ = text(&mut tree, body, " kept ");
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        preserve_white_space: false,
        ..SerializePolicy::default()
    };
    let mut state = CaptureState::new();

    let node = Serializer::new(&host, &mut state, &policy)
        .serialize(body)
        .unwrap();

    assert_eq!(node.child_nodes().len(), 1);
    assert_eq!(node.child_nodes()[0].text_content(), Some(" kept "));
    assert_eq!(state.mirror.get_id(whitespace), IGNORED_NODE);
}

// ========== blocking ==========

#[test]
fn test_blocked_element_keeps_only_its_box() {
    let (mut tree, body) = page();
    let secret = element(
        &mut tree,
        body,
        "div",
        &[("class", "rr-block card"), ("title", "private"), ("style", "color: red")],
    );
    let _ = text(&mut tree, secret, "do not capture");
    if let Some(data) = tree.as_element_mut(secret) {
        data.state.width = 120.0;
        data.state.height = 40.5;
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, secret, &SerializePolicy::default());

    let element = node.as_element().unwrap();
    assert_eq!(element.attributes.len(), 3);
    assert_eq!(attr_str(&node, "class"), Some("rr-block card"));
    assert_eq!(attr_str(&node, "rr_width"), Some("120px"));
    assert_eq!(attr_str(&node, "rr_height"), Some("40.5px"));
    assert!(element.child_nodes.is_empty());
    assert!(!element.need_block);
}

#[test]
fn test_block_selector() {
    let (mut tree, body) = page();
    let video = element(&mut tree, body, "video", &[("id", "player")]);
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        block_selector: Some("#player".to_string()),
        ..SerializePolicy::default()
    };

    let node = capture(&host, video, &policy);

    assert_eq!(attr_str(&node, "rr_width"), Some("0px"));
    assert!(attr(&node, "id").is_none());
    assert!(attr(&node, "rr_mediaState").is_none());
}

// ========== masking ==========

#[test]
fn test_text_masked_under_mask_class() {
    let (mut tree, body) = page();
    let private = element(&mut tree, body, "p", &[("class", "rr-mask")]);
    let _ = text(&mut tree, private, "hello world");
    let span = element(&mut tree, private, "span", &[]);
    let _ = text(&mut tree, span, "nested");
    let public = element(&mut tree, body, "p", &[]);
    let _ = text(&mut tree, public, "visible");
    let host = ArenaHost::new(tree);

    let node = capture(&host, body, &SerializePolicy::default());

    let private = &node.child_nodes()[0];
    assert_eq!(private.child_nodes()[0].text_content(), Some("***** *****"));
    assert_eq!(
        private.child_nodes()[1].child_nodes()[0].text_content(),
        Some("******")
    );
    let public = &node.child_nodes()[1];
    assert_eq!(public.child_nodes()[0].text_content(), Some("visible"));
}

#[test]
fn test_mask_text_pattern_and_custom_fn() {
    let (mut tree, body) = page();
    let private = element(&mut tree, body, "p", &[("class", "pii-name")]);
    let _ = text(&mut tree, private, "Ada");
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        mask_text_class: Some(ClassMatcher::Pattern(regex::Regex::new("^pii-").unwrap())),
        mask_text_fn: Some(std::rc::Rc::new(|text: &str| format!("[{}]", text.len()))),
        ..SerializePolicy::default()
    };

    let node = capture(&host, private, &policy);

    assert_eq!(node.child_nodes()[0].text_content(), Some("[3]"));
}

#[test]
fn test_input_values_masked_by_type() {
    let (mut tree, body) = page();
    let password = element(&mut tree, body, "input", &[("type", "password")]);
    let email = element(&mut tree, body, "input", &[("type", "email")]);
    let flagged = element(&mut tree, body, "input", &[("data-rr-is-password", "")]);
    for (input, value) in [(password, "secret"), (email, "a@b.c"), (flagged, "hunter2")] {
        if let Some(data) = tree.as_element_mut(input) {
            data.state.value = Some(value.to_string());
        }
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, body, &SerializePolicy::default());

    let values: Vec<Option<&str>> = node
        .child_nodes()
        .iter()
        .map(|child| attr_str(child, "value"))
        .collect();
    assert_eq!(values, vec![Some("******"), Some("a@b.c"), Some("*******")]);
}

#[test]
fn test_checkbox_and_selected_option() {
    let (mut tree, body) = page();
    let checkbox = element(&mut tree, body, "input", &[("type", "checkbox"), ("value", "on")]);
    let select = element(&mut tree, body, "select", &[]);
    let first = element(&mut tree, select, "option", &[("value", "a")]);
    let _ = element(&mut tree, select, "option", &[("value", "b"), ("selected", "")]);
    if let Some(data) = tree.as_element_mut(checkbox) {
        data.state.checked = true;
    }
    if let Some(data) = tree.as_element_mut(first) {
        data.state.selected = true;
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, body, &SerializePolicy::default());

    let checkbox = &node.child_nodes()[0];
    assert_eq!(attr(checkbox, "checked"), Some(&AttributeValue::Bool(true)));
    assert_eq!(attr_str(checkbox, "value"), Some("on"));
    let select = &node.child_nodes()[1];
    assert_eq!(attr_str(select, "value"), Some("a"));
    assert_eq!(
        attr(&select.child_nodes()[0], "selected"),
        Some(&AttributeValue::Bool(true))
    );
    assert!(attr(&select.child_nodes()[1], "selected").is_none());
}

// ========== frames ==========

#[test]
fn test_iframe_without_document_records_rr_src() {
    let (mut tree, body) = page();
    let frame = element(&mut tree, body, "iframe", &[("src", "frame.html")]);
    let host = ArenaHost::new(tree);

    let node = capture(&host, frame, &SerializePolicy::default());

    assert!(attr(&node, "src").is_none());
    assert_eq!(
        attr_str(&node, "rr_src"),
        Some("https://site.test/dir/frame.html")
    );
}

#[test]
fn test_iframe_src_kept_by_policy() {
    let (mut tree, body) = page();
    let frame = element(&mut tree, body, "iframe", &[("src", "https://embed.test/x")]);
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        keep_iframe_src_fn: Some(std::rc::Rc::new(|src: &str| src.starts_with("https://embed."))),
        ..SerializePolicy::default()
    };

    let node = capture(&host, frame, &policy);

    assert_eq!(attr_str(&node, "src"), Some("https://embed.test/x"));
    assert!(attr(&node, "rr_src").is_none());
}

// ========== styles, scripts and URLs ==========

#[test]
fn test_script_text_replaced() {
    let (mut tree, body) = page();
    let script = element(&mut tree, body, "script", &[]);
    let _ = text(&mut tree, script, "track()");
    let host = ArenaHost::new(tree);

    let node = capture(&host, script, &SerializePolicy::default());

    assert_eq!(node.child_nodes()[0].text_content(), Some(SCRIPT_PLACEHOLDER));
}

#[test]
fn test_style_text_split_across_children() {
    let (mut tree, body) = page();
    let style = element(&mut tree, body, "style", &[]);
    let _ = text(&mut tree, style, "a { color: red; }");
    let _ = text(&mut tree, style, "b { background: url(bg.png); }");
    let host = ArenaHost::new(tree);

    let node = capture(&host, style, &SerializePolicy::default());

    let css = attr_str(&node, "_cssText").unwrap();
    assert_eq!(
        css,
        "a { color: red; }/* rr_split */b { background: url(https://site.test/dir/bg.png); }"
    );
    for child in node.child_nodes() {
        assert_eq!(child.text_content(), Some(""));
        assert!(matches!(child.data, NodeData::Text { is_style: true, .. }));
    }
}

#[test]
fn test_readable_link_inlined() {
    let (mut tree, body) = page();
    let link = element(
        &mut tree,
        body,
        "link",
        &[("rel", "stylesheet"), ("href", "css/site.css")],
    );
    if let Some(data) = tree.as_element_mut(link) {
        data.state.sheet = Some(SheetState {
            css_text: Some("p { background: url(../img/p.png); }".to_string()),
            readable: true,
        });
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, link, &SerializePolicy::default());

    assert!(attr(&node, "rel").is_none());
    assert!(attr(&node, "href").is_none());
    assert_eq!(
        attr_str(&node, "_cssText"),
        Some("p { background: url(https://site.test/dir/img/p.png); }")
    );
}

#[test]
fn test_url_attributes_absolutized() {
    let (mut tree, body) = page();
    let _ = element(
        &mut tree,
        body,
        "img",
        &[("src", "a.png"), ("srcset", "a.png 1x, b.png 2x")],
    );
    let _ = element(&mut tree, body, "a", &[("href", "/top")]);
    let host = ArenaHost::new(tree);

    let node = capture(&host, body, &SerializePolicy::default());

    let image_node = &node.child_nodes()[0];
    assert_eq!(attr_str(image_node, "src"), Some("https://site.test/dir/a.png"));
    assert_eq!(
        attr_str(image_node, "srcset"),
        Some("https://site.test/dir/a.png 1x, https://site.test/dir/b.png 2x")
    );
    assert_eq!(attr_str(&node.child_nodes()[1], "href"), Some("https://site.test/top"));
}

// ========== element state ==========

#[test]
fn test_scroll_media_and_dialog_state() {
    let (mut tree, body) = page();
    let scroller = element(&mut tree, body, "div", &[]);
    let video = element(&mut tree, body, "video", &[("autoplay", "")]);
    let dialog = element(&mut tree, body, "dialog", &[]);
    if let Some(data) = tree.as_element_mut(scroller) {
        data.state.scroll_top = 250.0;
    }
    if let Some(data) = tree.as_element_mut(video) {
        data.state.media = Some(replica_dom::MediaState {
            paused: false,
            current_time: 12.5,
            ..replica_dom::MediaState::default()
        });
    }
    if let Some(data) = tree.as_element_mut(dialog) {
        data.state.dialog = Some(replica_dom::DialogState::Modal);
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, body, &SerializePolicy::default());

    let children = node.child_nodes();
    assert_eq!(attr(&children[0], "rr_scrollTop"), Some(&AttributeValue::Number(250.0)));
    assert!(attr(&children[0], "rr_scrollLeft").is_none());
    assert!(attr(&children[1], "autoplay").is_none());
    assert_eq!(attr_str(&children[1], "rr_mediaState"), Some("played"));
    assert_eq!(
        attr(&children[1], "rr_mediaCurrentTime"),
        Some(&AttributeValue::Number(12.5))
    );
    assert_eq!(attr_str(&children[2], "rr_open_mode"), Some("modal"));
}

#[test]
fn test_newly_added_skips_scroll() {
    let (mut tree, body) = page();
    if let Some(data) = tree.as_element_mut(body) {
        data.state.scroll_left = 10.0;
    }
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        newly_added_element: true,
        ..SerializePolicy::default()
    };

    let node = capture(&host, body, &policy);

    assert!(attr(&node, "rr_scrollLeft").is_none());
}

#[test]
fn test_canvas_recorded_only_when_drawn() {
    let (mut tree, body) = page();
    let drawn = element(&mut tree, body, "canvas", &[]);
    let empty = element(&mut tree, body, "canvas", &[]);
    if let Some(data) = tree.as_element_mut(drawn) {
        data.state.raster = Some(Raster::filled(2, 2, [255, 0, 0, 255]));
    }
    if let Some(data) = tree.as_element_mut(empty) {
        data.state.raster = Some(Raster::blank(2, 2));
    }
    let host = ArenaHost::new(tree);
    let policy = SerializePolicy {
        record_canvas: true,
        ..SerializePolicy::default()
    };

    let node = capture(&host, body, &policy);

    let data_url = attr_str(&node.child_nodes()[0], "rr_dataURL").unwrap();
    assert_eq!(
        Raster::from_data_url(data_url).unwrap(),
        Raster::filled(2, 2, [255, 0, 0, 255])
    );
    assert!(attr(&node.child_nodes()[1], "rr_dataURL").is_none());
}

// ========== documents and shadow roots ==========

#[test]
fn test_document_and_doctype() {
    let mut tree = DomTree::with_url(PAGE_URL);
    let doctype = tree.alloc(NodeType::DocumentType {
        name: "html".to_string(),
        public_id: String::new(),
        system_id: String::new(),
    });
    tree.append_child(NodeId::ROOT, doctype);
    let _ = element(&mut tree, NodeId::ROOT, "html", &[]);
    if let Some(data) = tree.as_document_mut(NodeId::ROOT) {
        data.mode = replica_dom::DocumentMode::Quirks;
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, NodeId::ROOT, &SerializePolicy::default());

    match &node.data {
        NodeData::Document {
            child_nodes,
            compat_mode,
        } => {
            assert_eq!(compat_mode.as_deref(), Some("BackCompat"));
            assert!(matches!(
                &child_nodes[0].data,
                NodeData::DocumentType { name, .. } if name == "html"
            ));
        }
        other => panic!("expected a document, got {other:?}"),
    }
}

#[test]
fn test_native_shadow_children_follow_light_children() {
    let (mut tree, body) = page();
    let host_element = element(&mut tree, body, "my-card", &[]);
    let _ = text(&mut tree, host_element, "light");
    let root = tree.attach_shadow(host_element, true);
    let _ = element(&mut tree, root, "span", &[]);
    let _ = tree.define_custom_element("my-card");
    let host = ArenaHost::new(tree);

    let node = capture(&host, host_element, &SerializePolicy::default());

    let element = node.as_element().unwrap();
    assert!(element.is_shadow_host);
    assert!(element.is_custom);
    assert_eq!(element.child_nodes.len(), 2);
    assert_eq!(element.child_nodes[0].text_content(), Some("light"));
    assert!(element.child_nodes[1].as_element().unwrap().is_shadow);
}

#[test]
fn test_emulated_shadow_root_not_marked() {
    let (mut tree, body) = page();
    let host_element = element(&mut tree, body, "div", &[]);
    let root = tree.attach_shadow(host_element, false);
    let _ = element(&mut tree, root, "span", &[]);
    let host = ArenaHost::new(tree);

    let node = capture(&host, host_element, &SerializePolicy::default());

    let element = node.as_element().unwrap();
    assert!(!element.is_shadow_host);
    assert!(!element.child_nodes[0].as_element().unwrap().is_shadow);
}

#[test]
fn test_snapshot_json_round_trip() {
    let (mut tree, body) = page();
    let div = element(&mut tree, body, "div", &[("class", "a"), ("data-n", "1")]);
    let _ = text(&mut tree, div, "text");
    if let Some(data) = tree.as_element_mut(div) {
        data.state.scroll_top = 3.0;
    }
    let host = ArenaHost::new(tree);

    let node = capture(&host, NodeId::ROOT, &SerializePolicy::default());
    let json = serde_json::to_string(&node).unwrap();
    let back: SerializedNode = serde_json::from_str(&json).unwrap();

    assert_eq!(back, node);
    assert!(json.contains(r#""rr_scrollTop":3.0"#));
}
