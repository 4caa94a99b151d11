//! Indented text dumps of a [`DomTree`], for debugging and the CLI.

use std::fmt::Write;

use crate::{DomTree, NodeId, NodeType};

/// Print the subtree at `id` to stdout, two spaces per level.
pub fn print_tree(tree: &DomTree, id: NodeId, indent: usize) {
    print!("{}", format_tree(tree, id, indent));
}

/// Render the subtree at `id`.
///
/// Attributes are sorted by name. Whitespace in text is made visible.
/// Shadow roots and frame documents are nested under their host element.
#[must_use]
pub fn format_tree(tree: &DomTree, id: NodeId, indent: usize) -> String {
    let mut out = String::new();
    write_node(tree, id, indent, &mut out);
    out
}

fn write_node(tree: &DomTree, id: NodeId, indent: usize, out: &mut String) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let prefix = "  ".repeat(indent);
    let _ = match &node.node_type {
        NodeType::Document(data) => {
            writeln!(out, "{prefix}Document ({}, {})", data.url, data.mode.compat_mode())
        }
        NodeType::DocumentType { name, .. } => writeln!(out, "{prefix}<!DOCTYPE {name}>"),
        NodeType::Element(data) => {
            let mut attrs: Vec<(&String, &String)> = data.attrs.iter().collect();
            attrs.sort();
            let attrs: Vec<String> = attrs
                .into_iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{k}=\"{v}\"")
                    }
                })
                .collect();
            if attrs.is_empty() {
                writeln!(out, "{prefix}<{}>", data.tag_name)
            } else {
                writeln!(out, "{prefix}<{} {}>", data.tag_name, attrs.join(" "))
            }
        }
        NodeType::Text(data) => {
            let display = data.replace('\n', "\\n").replace(' ', "\u{00B7}");
            writeln!(out, "{prefix}\"{display}\"")
        }
        NodeType::CData(data) => writeln!(out, "{prefix}<![CDATA[{data}]]>"),
        NodeType::Comment(data) => writeln!(out, "{prefix}<!-- {data} -->"),
        NodeType::ShadowRoot { native, .. } => {
            writeln!(out, "{prefix}#shadow-root ({})", if *native { "open" } else { "emulated" })
        }
    };

    for &child in tree.children(id) {
        write_node(tree, child, indent + 1, out);
    }
    if let Some(element) = tree.as_element(id) {
        if let Some(root) = element.shadow_root {
            write_node(tree, root, indent + 1, out);
        }
        if let Some(document) = element.content_document {
            write_node(tree, document, indent + 1, out);
        }
    }
}
