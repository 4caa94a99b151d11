//! Tests for replay adaptation: hover selectors, media features, caching and
//! parse-failure passthrough.

use replica_css::{BuildCache, adapt_css_for_replay, try_adapt_css};

#[test]
fn test_hover_selector_gains_class_branch() {
    let mut cache = BuildCache::new();
    let adapted = adapt_css_for_replay(".a:hover { color: white }", &mut cache);
    assert_eq!(adapted, r".a:hover, .a.\:hover { color: white }");
}

#[test]
fn test_hover_branch_follows_original() {
    let mut cache = BuildCache::new();
    let adapted = adapt_css_for_replay(".a:hover { color: white }", &mut cache);
    let plain = adapted.find(".a:hover").unwrap();
    let class = adapted.find(r".a.\:hover").unwrap();
    assert!(plain < class);
}

#[test]
fn test_adaptation_is_idempotent() {
    let inputs = [
        ".a:hover { color: white }",
        "a:hover, b { c: d } @media (min-device-width: 10px) { e:hover > f { g: h } }",
        r".x.\:hover, .x:hover { color: red }",
        "ul li:hover::after { content: ':hover' }",
    ];
    for input in inputs {
        let once = try_adapt_css(input).unwrap();
        let twice = try_adapt_css(&once).unwrap();
        assert_eq!(once, twice, "input: {input}");
    }
}

#[test]
fn test_existing_class_branch_not_duplicated() {
    let css = r".a:hover, .a.\:hover { color: white }";
    assert_eq!(try_adapt_css(css).unwrap(), css);
}

#[test]
fn test_every_hover_selector_in_list() {
    let css = "a:hover, b, c:hover span { x: y }";
    assert_eq!(
        try_adapt_css(css).unwrap(),
        r"a:hover, b, c:hover span, a.\:hover, c.\:hover span { x: y }"
    );
}

#[test]
fn test_pseudo_elements_untouched() {
    let css = "p::after { content: 'x' } p::before { content: 'y' }";
    assert_eq!(try_adapt_css(css).unwrap(), css);
}

#[test]
fn test_hover_inside_media_rule() {
    let css = "@media screen { a:hover { b: c } }";
    assert_eq!(
        try_adapt_css(css).unwrap(),
        r"@media screen { a:hover, a.\:hover { b: c } }"
    );
}

#[test]
fn test_device_media_features_unprefixed() {
    let css = "@media (max-device-width: 600px) and (min-device-height: 100px) { a { b: c } }";
    assert_eq!(
        try_adapt_css(css).unwrap(),
        "@media (max-width: 600px) and (min-height: 100px) { a { b: c } }"
    );
}

#[test]
fn test_keyframes_selectors_untouched() {
    let css = "@keyframes pulse { from { opacity: 0 } to { opacity: 1 } } a:hover { b: c }";
    assert_eq!(
        try_adapt_css(css).unwrap(),
        r"@keyframes pulse { from { opacity: 0 } to { opacity: 1 } } a:hover, a.\:hover { b: c }"
    );
}

#[test]
fn test_comments_and_whitespace_preserved() {
    let css = "/* header */\n.a:hover {\n  color: white; /* note */\n}\n";
    assert_eq!(
        try_adapt_css(css).unwrap(),
        "/* header */\n.a:hover, .a.\\:hover {\n  color: white; /* note */\n}\n"
    );
}

#[test]
fn test_parse_failure_returns_original() {
    let mut cache = BuildCache::new();
    let broken = "a:hover { color: red";
    assert!(try_adapt_css(broken).is_err());
    assert_eq!(adapt_css_for_replay(broken, &mut cache), broken);
}

#[test]
fn test_second_lookup_is_a_cache_hit() {
    let mut cache = BuildCache::new();
    let css = ".a:hover { color: white } ".repeat(200);

    let first = adapt_css_for_replay(&css, &mut cache);
    assert_eq!((cache.hits(), cache.misses()), (0, 1));

    let second = adapt_css_for_replay(&css, &mut cache);
    assert_eq!((cache.hits(), cache.misses()), (1, 1));
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_clear_resets_cache() {
    let mut cache = BuildCache::new();
    let _ = adapt_css_for_replay("a { b: c }", &mut cache);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.misses(), 0);
}
