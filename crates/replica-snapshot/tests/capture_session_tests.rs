//! Capture session tests: waits on frames, stylesheets, cross-origin sheet
//! clones and images, driven through the arena host's load events.

use replica_dom::{DomTree, NodeId, Raster, RasterAccess};
use replica_snapshot::{
    ArenaHost, CLONE_TAG_ATTRIBUTE, CaptureSession, Completion, LoadOutcome, RrAttribute,
    SerializePolicy, SerializedNode,
};

const PAGE_URL: &str = "https://site.test/dir/page.html";
const THEME_URL: &str = "https://cdn.test/theme.css";

fn element(tree: &mut DomTree, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let document = tree.owner_document(parent);
    let id = tree.create_element(document, tag);
    for (name, value) in attrs {
        tree.set_attribute(id, name, value);
    }
    tree.append_child(parent, id);
    id
}

/// `<html><head></head><body></body></html>`; returns the tree, head and
/// body.
fn page() -> (DomTree, NodeId, NodeId) {
    let mut tree = DomTree::with_url(PAGE_URL);
    let html = element(&mut tree, NodeId::ROOT, "html", &[]);
    let head = element(&mut tree, html, "head", &[]);
    let body = element(&mut tree, html, "body", &[]);
    (tree, head, body)
}

fn policy_with(adjust: impl FnOnce(&mut SerializePolicy)) -> SerializePolicy {
    let mut policy = SerializePolicy::default();
    adjust(&mut policy);
    policy
}

fn attr_str<'a>(node: &'a SerializedNode, name: &str) -> Option<&'a str> {
    node.as_element()?.attributes.get(name)?.as_str()
}

fn red_pixel() -> Raster {
    Raster::filled(1, 1, [255, 0, 0, 255])
}

// ========== frames ==========

/// A page with an `iframe` whose document holds `<html></html>`.
fn framed_page(ready: bool) -> (ArenaHost, NodeId, NodeId) {
    let (mut tree, _, body) = page();
    let frame = element(&mut tree, body, "iframe", &[("src", "frame.html")]);
    let frame_document = tree.create_frame_document(frame, "https://site.test/dir/frame.html");
    let _ = element(&mut tree, frame_document, "html", &[]);
    if let Some(data) = tree.as_document_mut(frame_document) {
        data.ready = ready;
    }
    (ArenaHost::new(tree), frame, frame_document)
}

#[test]
fn test_ready_frame_is_serialized_with_root_ids() {
    let (mut host, frame, frame_document) = framed_page(true);
    let mut session = CaptureSession::new(SerializePolicy::default());

    let top = session.serialize(&mut host, NodeId::ROOT).expect("captured");
    assert_eq!(session.pending(), 1);
    let completions = session.settle(&mut host);

    assert_eq!(session.pending(), 0);
    let [Completion::FrameLoaded { frame: loaded, document }] = completions.as_slice() else {
        panic!("expected one frame completion, got {completions:?}");
    };
    assert_eq!(*loaded, frame);
    assert_eq!(document.id, session.state().mirror.get_id(frame_document));
    assert!(document.id > top.id);
    assert_eq!(document.root_id, None);
    let html = &document.child_nodes()[0];
    assert_eq!(html.root_id, Some(document.id));
}

#[test]
fn test_frame_loaded_later_is_serialized_on_load() {
    let (mut host, frame, _) = framed_page(false);
    let mut session = CaptureSession::new(SerializePolicy::default());

    let _ = session.serialize(&mut host, NodeId::ROOT);
    assert!(session.poll_completions(&mut host).is_empty());
    assert_eq!(host.listener_count(frame), 1);

    assert_eq!(host.load_frame(frame), 1);
    let completions = session.settle(&mut host);

    assert!(matches!(
        completions.as_slice(),
        [Completion::FrameLoaded { frame: loaded, .. }] if *loaded == frame
    ));
}

#[test]
fn test_frame_timeout_still_serializes_document() {
    let (mut host, frame, _) = framed_page(false);
    let policy = policy_with(|policy| policy.iframe_load_timeout = 20);
    let mut session = CaptureSession::new(policy);

    let _ = session.serialize(&mut host, NodeId::ROOT);
    let completions = session.settle(&mut host);

    assert_eq!(session.pending(), 0);
    assert!(matches!(
        completions.as_slice(),
        [Completion::FrameLoaded { frame: loaded, .. }] if *loaded == frame
    ));
}

#[test]
fn test_poll_delivers_settled_frame_without_blocking() {
    let (mut host, frame, _) = framed_page(true);
    let mut session = CaptureSession::new(SerializePolicy::default());

    let _ = session.serialize(&mut host, NodeId::ROOT);
    let completions = session.poll_completions(&mut host);

    assert_eq!(completions.len(), 1);
    assert!(matches!(&completions[0], Completion::FrameLoaded { frame: loaded, .. } if *loaded == frame));
    assert_eq!(session.pending(), 0);
}

// ========== stylesheets ==========

#[test]
fn test_late_stylesheet_is_inlined_on_load() {
    let (mut tree, head, _) = page();
    let link = element(
        &mut tree,
        head,
        "link",
        &[("rel", "stylesheet"), ("href", "style.css")],
    );
    let mut host = ArenaHost::new(tree);
    let mut session = CaptureSession::new(SerializePolicy::default());

    let captured = session.serialize(&mut host, link).expect("captured");
    assert_eq!(attr_str(&captured, "_cssText"), None);
    assert_eq!(session.pending(), 1);

    let _ = host.load_stylesheet(link, Some("body { color: red; }"));
    let completions = session.settle(&mut host);

    let [Completion::StylesheetLoaded { link: loaded, node }] = completions.as_slice() else {
        panic!("expected one stylesheet completion, got {completions:?}");
    };
    assert_eq!(*loaded, link);
    assert_eq!(node.id, captured.id);
    assert_eq!(attr_str(node, "_cssText"), Some("body { color: red; }"));
    assert_eq!(attr_str(node, "href"), None);
}

#[test]
fn test_stylesheet_timeout_waits_only_once() {
    let (mut tree, head, _) = page();
    let link = element(
        &mut tree,
        head,
        "link",
        &[("rel", "stylesheet"), ("href", "never.css")],
    );
    let mut host = ArenaHost::new(tree);
    let policy = policy_with(|policy| policy.stylesheet_load_timeout = 20);
    let mut session = CaptureSession::new(policy);

    let _ = session.serialize(&mut host, link);
    let completions = session.settle(&mut host);

    assert_eq!(session.pending(), 0);
    let [Completion::StylesheetLoaded { node, .. }] = completions.as_slice() else {
        panic!("expected one stylesheet completion, got {completions:?}");
    };
    assert_eq!(
        attr_str(node, "href"),
        Some("https://site.test/dir/never.css")
    );
    assert_eq!(attr_str(node, "_cssText"), None);
}

// ========== cross-origin clones ==========

/// A head with a cross-origin (unreadable) stylesheet link.
fn cross_origin_page() -> (ArenaHost, NodeId, NodeId) {
    let (mut tree, head, _) = page();
    let link = element(
        &mut tree,
        head,
        "link",
        &[("rel", "stylesheet"), ("href", THEME_URL)],
    );
    let mut host = ArenaHost::new(tree);
    let _ = host.load_stylesheet(link, None);
    (host, head, link)
}

fn clone_of(session: &CaptureSession<NodeId>) -> NodeId {
    session
        .state()
        .stylesheets
        .record(THEME_URL)
        .and_then(|record| record.clone)
        .expect("clone registered")
}

#[test]
fn test_clone_load_inlines_cross_origin_sheet() {
    let (mut host, head, link) = cross_origin_page();
    let mut session = CaptureSession::new(SerializePolicy::default());

    let captured = session.serialize(&mut host, head).expect("captured");
    assert_eq!(captured.child_nodes().len(), 1);
    let clone = clone_of(&session);
    assert_eq!(host.tree().parent(clone), Some(head));
    assert_eq!(
        host.tree().get_attribute(clone, "crossorigin"),
        Some("anonymous")
    );
    assert_eq!(
        host.tree().get_attribute(clone, CLONE_TAG_ATTRIBUTE),
        host.tree().get_attribute(link, CLONE_TAG_ATTRIBUTE)
    );

    let _ = host.load_stylesheet(clone, Some(".theme { color: teal; }"));
    let completions = session.settle(&mut host);

    let [Completion::StylesheetLoaded { link: loaded, node }] = completions.as_slice() else {
        panic!("expected one stylesheet completion, got {completions:?}");
    };
    assert_eq!(*loaded, link);
    assert_eq!(attr_str(node, "_cssText"), Some(".theme { color: teal; }"));
    assert_eq!(host.tree().parent(clone), None);
    assert!(host.tree_mut().take_mutations().contains(&link));
    assert_eq!(
        session.state().stylesheets.get_cached_css_text(THEME_URL),
        Some(".theme { color: teal; }")
    );
}

#[test]
fn test_clone_is_excluded_from_capture_while_pending() {
    let (mut host, head, _) = cross_origin_page();
    let mut session = CaptureSession::new(SerializePolicy::default());

    let _ = session.serialize(&mut host, head);
    let clone = clone_of(&session);
    assert_eq!(host.tree().children(head).len(), 2);

    let again = session.serialize(&mut host, head).expect("captured");

    assert_eq!(again.child_nodes().len(), 1);
    assert!(!session.state().mirror.has_node(clone));
    assert_eq!(session.pending(), 1);
}

#[test]
fn test_clone_failure_removes_clone_and_is_not_retried() {
    let (mut host, head, link) = cross_origin_page();
    let mut session = CaptureSession::new(SerializePolicy::default());

    let _ = session.serialize(&mut host, head);
    let clone = clone_of(&session);
    assert_eq!(host.fire_load(clone, LoadOutcome::Failed), 1);
    let completions = session.settle(&mut host);

    assert!(completions.is_empty());
    assert_eq!(host.tree().parent(clone), None);
    let record = session.state().stylesheets.record(THEME_URL).expect("record kept");
    assert!(!record.loaded);
    assert_eq!(record.clone, None);

    let node = session.serialize(&mut host, link).expect("captured");
    assert_eq!(attr_str(&node, "_cssText"), None);
    assert_eq!(session.pending(), 0);
}

// ========== images ==========

fn image_page(src: &str) -> (ArenaHost, NodeId) {
    let (mut tree, _, body) = page();
    let image = element(&mut tree, body, "img", &[("src", src)]);
    (ArenaHost::new(tree), image)
}

fn inline_images() -> SerializePolicy {
    policy_with(|policy| policy.inline_images = true)
}

#[test]
fn test_loaded_image_is_inlined_immediately() {
    let (mut host, image) = image_page("a.png");
    if let Some(data) = host.tree_mut().as_element_mut(image) {
        data.state.raster = Some(red_pixel());
        data.state.complete = true;
    }
    let mut session = CaptureSession::new(inline_images());

    let node = session.serialize(&mut host, image).expect("captured");

    let expected = red_pixel().to_data_url("image/png");
    assert_eq!(
        attr_str(&node, RrAttribute::DataUrl.as_ref()),
        Some(expected.as_str())
    );
    assert_eq!(session.pending(), 0);
}

#[test]
fn test_image_inlined_after_load() {
    let (mut host, image) = image_page("a.png");
    let mut session = CaptureSession::new(inline_images());

    let node = session.serialize(&mut host, image).expect("captured");
    assert_eq!(attr_str(&node, RrAttribute::DataUrl.as_ref()), None);

    let _ = host.load_image(image, red_pixel(), RasterAccess::Open);
    let completions = session.settle(&mut host);

    let expected = red_pixel().to_data_url("image/png");
    assert_eq!(
        completions,
        vec![Completion::ImageInlined {
            image,
            id: node.id,
            data_url: expected.clone(),
        }]
    );
    assert_eq!(session.state().inlined_image(image), Some(expected.as_str()));

    let again = session.serialize(&mut host, image).expect("captured");
    assert_eq!(
        attr_str(&again, RrAttribute::DataUrl.as_ref()),
        Some(expected.as_str())
    );
}

#[test]
fn test_cors_image_retried_anonymously() {
    let (mut host, image) = image_page("https://cdn.test/a.png");
    let mut session = CaptureSession::new(inline_images());

    let _ = session.serialize(&mut host, image);
    let _ = host.load_image(image, red_pixel(), RasterAccess::CorsEnabled);
    let completions = session.settle(&mut host);

    assert!(matches!(
        completions.as_slice(),
        [Completion::ImageInlined { image: inlined, .. }] if *inlined == image
    ));
    assert_eq!(host.tree().get_attribute(image, "crossorigin"), None);
}

#[test]
fn test_opaque_image_gives_up_after_retry() {
    let (mut host, image) = image_page("https://cdn.test/a.png");
    let mut session = CaptureSession::new(inline_images());

    let _ = session.serialize(&mut host, image);
    let _ = host.load_image(image, red_pixel(), RasterAccess::Opaque);
    let completions = session.settle(&mut host);

    assert!(completions.is_empty());
    assert_eq!(session.pending(), 0);
    assert_eq!(session.state().inlined_image(image), None);
    assert_eq!(host.tree().get_attribute(image, "crossorigin"), None);
}

// ========== hooks ==========

#[test]
fn test_serialize_hook_sees_frame_nodes_too() {
    let (mut host, frame, frame_document) = framed_page(true);
    let mut session = CaptureSession::new(SerializePolicy::default());
    let mut seen = Vec::new();

    let _ = session.serialize_with_hook(&mut host, frame, &mut |node| seen.push(node));
    assert_eq!(seen, vec![frame]);
    let _ = session.settle(&mut host);

    assert!(session.state().mirror.has_node(frame_document));
}
