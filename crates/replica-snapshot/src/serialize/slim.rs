//! Slim-DOM exclusion rules.

use replica_common::url::file_extension;

use crate::policy::SlimDomOptions;
use crate::types::{AttributeValue, ElementNode, NodeData, SerializedNode};

const ROBOT_NAMES: &[&str] = &["robots", "googlebot", "bingbot"];
const AUTHORSHIP_NAMES: &[&str] = &["author", "generator", "framework", "publisher", "progid"];
const VERIFICATION_NAMES: &[&str] = &[
    "google-site-verification",
    "yandex-verification",
    "csrf-token",
    "p:domain_verify",
    "verify-v1",
    "verification",
    "shopify-checkout-api-token",
];

/// Lower-cased string attribute, or `""`.
fn lower(element: &ElementNode, name: &str) -> String {
    element
        .attributes
        .get(name)
        .and_then(AttributeValue::as_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn raw<'a>(element: &'a ElementNode, name: &str) -> Option<&'a str> {
    element.attributes.get(name).and_then(AttributeValue::as_str)
}

/// Whether `node` is dropped under `options`.
#[must_use]
pub fn slim_dom_excluded(node: &SerializedNode, options: &SlimDomOptions) -> bool {
    match &node.data {
        NodeData::Comment { .. } => options.comment,
        NodeData::Element(element) => element_excluded(element, options),
        _ => false,
    }
}

fn element_excluded(element: &ElementNode, options: &SlimDomOptions) -> bool {
    let tag = element.tag_name.as_str();
    let rel = raw(element, "rel");

    if options.script {
        let preload_script = tag == "link"
            && matches!(rel, Some("preload" | "modulepreload"))
            && raw(element, "as") == Some("script");
        let prefetch_js = tag == "link"
            && rel == Some("prefetch")
            && raw(element, "href")
                .and_then(|href| file_extension(href, None))
                .is_some_and(|ext| ext == "js");
        if tag == "script" || preload_script || prefetch_js {
            return true;
        }
    }

    if options.head_favicon {
        let favicon_link = tag == "link" && rel == Some("shortcut icon");
        let name = lower(element, "name");
        let meta_rel = lower(element, "rel");
        let favicon_meta = tag == "meta"
            && (name == "msapplication-tileimage"
                || name == "msapplication-tilecolor"
                || name == "application-name"
                || matches!(meta_rel.as_str(), "icon" | "apple-touch-icon" | "shortcut icon"));
        if favicon_link || favicon_meta {
            return true;
        }
    }

    if tag != "meta" {
        return false;
    }
    let name = lower(element, "name");
    let property = lower(element, "property");

    if options.head_meta_desc_keywords
        && (name.starts_with("description") || name.ends_with("keywords"))
    {
        return true;
    }
    if options.head_meta_social
        && (["og:", "twitter:", "fb:"].iter().any(|p| property.starts_with(p))
            || ["og:", "twitter:"].iter().any(|p| name.starts_with(p))
            || name == "pinterest")
    {
        return true;
    }
    if options.head_meta_robots && ROBOT_NAMES.contains(&name.as_str()) {
        return true;
    }
    if options.head_meta_http_equiv && element.attributes.contains_key("http-equiv") {
        return true;
    }
    if options.head_meta_authorship
        && (AUTHORSHIP_NAMES.contains(&name.as_str())
            || property.starts_with("article:")
            || property.starts_with("product:"))
    {
        return true;
    }
    options.head_meta_verification && VERIFICATION_NAMES.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, attributes: &[(&str, &str)]) -> SerializedNode {
        SerializedNode {
            id: 0,
            root_id: None,
            data: NodeData::Element(ElementNode {
                tag_name: tag.to_string(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), AttributeValue::from(*v)))
                    .collect(),
                ..ElementNode::default()
            }),
        }
    }

    #[test]
    fn test_nothing_excluded_by_default() {
        let options = SlimDomOptions::default();
        assert!(!slim_dom_excluded(&element("script", &[]), &options));
        assert!(!slim_dom_excluded(
            &SerializedNode {
                id: 0,
                root_id: None,
                data: NodeData::Comment {
                    text_content: "x".to_string()
                },
            },
            &options
        ));
    }

    #[test]
    fn test_script_category() {
        let options = SlimDomOptions {
            script: true,
            ..SlimDomOptions::default()
        };
        assert!(slim_dom_excluded(&element("script", &[]), &options));
        assert!(slim_dom_excluded(
            &element("link", &[("rel", "modulepreload"), ("as", "script")]),
            &options
        ));
        assert!(slim_dom_excluded(
            &element("link", &[("rel", "prefetch"), ("href", "https://a.test/x.js")]),
            &options
        ));
        assert!(!slim_dom_excluded(
            &element("link", &[("rel", "stylesheet"), ("href", "https://a.test/x.css")]),
            &options
        ));
    }

    #[test]
    fn test_meta_categories() {
        let options = SlimDomOptions::all();
        assert!(slim_dom_excluded(&element("meta", &[("name", "Description")]), &options));
        assert!(slim_dom_excluded(&element("meta", &[("property", "og:title")]), &options));
        assert!(slim_dom_excluded(&element("meta", &[("name", "googlebot")]), &options));
        assert!(slim_dom_excluded(&element("meta", &[("http-equiv", "refresh")]), &options));
        assert!(slim_dom_excluded(&element("meta", &[("property", "article:author")]), &options));
        assert!(slim_dom_excluded(&element("meta", &[("name", "csrf-token")]), &options));
        assert!(!slim_dom_excluded(&element("meta", &[("charset", "utf-8")]), &options));
        assert!(!slim_dom_excluded(&element("meta", &[("name", "viewport")]), &options));
    }
}
