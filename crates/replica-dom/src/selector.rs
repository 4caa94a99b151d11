//! Selector parsing and matching for the arena host.
//!
//! Implements the subset of [Selectors Level 4](https://www.w3.org/TR/selectors-4/)
//! a snapshot policy needs to test block and mask rules: type, class, ID,
//! universal and attribute selectors, compounds, descendant and child
//! combinators, and comma-separated lists. Anything else is reported as
//! unsupported, which the host surfaces as a query failure.

use thiserror::Error;

use crate::{DomTree, ElementData, NodeId};

/// A selector could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// "A selector is invalid if it contains any syntax errors"
    #[error("invalid selector: {0}")]
    Invalid(String),
    /// Valid syntax this matcher does not implement (pseudo-classes etc.).
    #[error("unsupported selector syntax in {0:?}")]
    Unsupported(String),
}

/// [§ 5 Elemental selectors](https://www.w3.org/TR/selectors-4/#elemental-selectors)
/// [§ 6 Attribute selectors](https://www.w3.org/TR/selectors-4/#attribute-selectors)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    /// `div`
    Type(String),
    /// `.class`
    Class(String),
    /// `#id`
    Id(String),
    /// `*`
    Universal,
    /// `[attr]`, `[attr=value]` and friends.
    Attribute(AttributeSelector),
}

/// [§ 6.4 Attribute selectors](https://www.w3.org/TR/selectors-4/#attribute-selectors)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSelector {
    /// `[attr]`
    Exists(String),
    /// `[attr=value]`
    Equals(String, String),
    /// `[attr~=value]`
    Includes(String, String),
    /// `[attr^=value]`
    PrefixMatch(String, String),
    /// `[attr$=value]`
    SuffixMatch(String, String),
    /// `[attr*=value]`
    SubstringMatch(String, String),
}

/// [§ 16 Combinators](https://www.w3.org/TR/selectors-4/#combinators)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace.
    Descendant,
    /// `>`
    Child,
}

/// [§ 3.1 Structure and Terminology](https://www.w3.org/TR/selectors-4/#structure)
///
/// "A complex selector is a sequence of one or more compound selectors
/// separated by combinators." Stored right-to-left for matching: `parts[0]`
/// is the subject compound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    subject: Vec<SimpleSelector>,
    ancestors: Vec<(Combinator, Vec<SimpleSelector>)>,
}

/// [§ 4.1 Selector Lists](https://www.w3.org/TR/selectors-4/#grouping)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<ComplexSelector>);

impl SelectorList {
    /// Whether the element `node` matches any selector in the list.
    #[must_use]
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.0.iter().any(|complex| complex.matches(tree, node))
    }

    /// [`Element.closest()`](https://dom.spec.whatwg.org/#dom-element-closest):
    /// `node` itself or its nearest ancestor element that matches.
    #[must_use]
    pub fn closest(&self, tree: &DomTree, node: NodeId) -> Option<NodeId> {
        std::iter::once(node)
            .chain(tree.ancestors(node))
            .filter(|&id| tree.as_element(id).is_some())
            .find(|&id| self.matches(tree, id))
    }
}

impl ComplexSelector {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(element) = tree.as_element(node) else {
            return false;
        };
        if !compound_matches(&self.subject, element) {
            return false;
        }
        self.match_ancestors(tree, node, 0)
    }

    fn match_ancestors(&self, tree: &DomTree, node: NodeId, index: usize) -> bool {
        let Some((combinator, compound)) = self.ancestors.get(index) else {
            return true;
        };
        match combinator {
            Combinator::Child => tree.parent(node).is_some_and(|parent| {
                tree.as_element(parent)
                    .is_some_and(|el| compound_matches(compound, el))
                    && self.match_ancestors(tree, parent, index + 1)
            }),
            Combinator::Descendant => tree.ancestors(node).any(|ancestor| {
                tree.as_element(ancestor)
                    .is_some_and(|el| compound_matches(compound, el))
                    && self.match_ancestors(tree, ancestor, index + 1)
            }),
        }
    }
}

fn compound_matches(compound: &[SimpleSelector], element: &ElementData) -> bool {
    compound.iter().all(|simple| simple_matches(simple, element))
}

fn simple_matches(simple: &SimpleSelector, element: &ElementData) -> bool {
    let attr = |name: &str| element.attrs.get(name);
    match simple {
        SimpleSelector::Type(name) => element.tag_name.eq_ignore_ascii_case(name),
        SimpleSelector::Class(class_name) => attr("class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class_name)),
        SimpleSelector::Id(id) => attr("id").is_some_and(|v| v == id),
        SimpleSelector::Universal => true,
        SimpleSelector::Attribute(selector) => match selector {
            AttributeSelector::Exists(name) => attr(name).is_some(),
            AttributeSelector::Equals(name, val) => attr(name).is_some_and(|v| v == val),
            AttributeSelector::Includes(name, val) => {
                attr(name).is_some_and(|v| v.split_ascii_whitespace().any(|w| w == val))
            }
            AttributeSelector::PrefixMatch(name, val) => {
                attr(name).is_some_and(|v| v.starts_with(val.as_str()))
            }
            AttributeSelector::SuffixMatch(name, val) => {
                attr(name).is_some_and(|v| v.ends_with(val.as_str()))
            }
            AttributeSelector::SubstringMatch(name, val) => {
                attr(name).is_some_and(|v| v.contains(val.as_str()))
            }
        },
    }
}

/// [§ 4.3.9 ident code point](https://www.w3.org/TR/css-syntax-3/#ident-code-point)
const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Parse a selector list such as `.rr-block, [data-private] input`.
///
/// # Errors
///
/// Returns [`SelectorError::Invalid`] for syntax errors and
/// [`SelectorError::Unsupported`] for pseudo-classes, sibling combinators
/// and other syntax outside the supported subset.
pub fn parse_selector(raw: &str) -> Result<SelectorList, SelectorError> {
    let mut list = Vec::new();
    for part in raw.split(',') {
        list.push(parse_complex(part.trim(), raw)?);
    }
    Ok(SelectorList(list))
}

fn parse_complex(text: &str, raw: &str) -> Result<ComplexSelector, SelectorError> {
    if text.is_empty() {
        return Err(SelectorError::Invalid(raw.to_string()));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut compounds: Vec<Vec<SimpleSelector>> = Vec::new();
    let mut combinators: Vec<Combinator> = Vec::new();
    let mut current: Vec<SimpleSelector> = Vec::new();
    let mut pending: Option<Combinator> = None;

    let take_ident = |pos: &mut usize| -> String {
        let start = *pos;
        while *pos < chars.len() && is_ident_char(chars[*pos]) {
            *pos += 1;
        }
        chars[start..*pos].iter().collect()
    };

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_ascii_whitespace() || c == '>' => {
                if c == '>' {
                    pending = Some(Combinator::Child);
                } else if pending.is_none() {
                    pending = Some(Combinator::Descendant);
                }
                pos += 1;
                continue;
            }
            '+' | '~' | ':' => return Err(SelectorError::Unsupported(raw.to_string())),
            _ => {}
        }

        if let Some(combinator) = pending.take() {
            if current.is_empty() {
                if combinator == Combinator::Child {
                    return Err(SelectorError::Invalid(raw.to_string()));
                }
            } else {
                compounds.push(std::mem::take(&mut current));
                combinators.push(combinator);
            }
        }

        match c {
            '*' => {
                pos += 1;
                current.push(SimpleSelector::Universal);
            }
            '.' | '#' => {
                pos += 1;
                let ident = take_ident(&mut pos);
                if ident.is_empty() {
                    return Err(SelectorError::Invalid(raw.to_string()));
                }
                current.push(if c == '.' {
                    SimpleSelector::Class(ident)
                } else {
                    SimpleSelector::Id(ident)
                });
            }
            '[' => {
                let close = chars[pos..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| SelectorError::Invalid(raw.to_string()))?;
                let inner: String = chars[pos + 1..pos + close].iter().collect();
                pos += close + 1;
                current.push(SimpleSelector::Attribute(parse_attribute(&inner, raw)?));
            }
            c if is_ident_char(c) => {
                let ident = take_ident(&mut pos);
                current.push(SimpleSelector::Type(ident.to_ascii_lowercase()));
            }
            _ => return Err(SelectorError::Invalid(raw.to_string())),
        }
    }

    if current.is_empty() {
        return Err(SelectorError::Invalid(raw.to_string()));
    }

    // Reverse into subject-first order for right-to-left matching.
    let mut ancestors = Vec::with_capacity(compounds.len());
    for (compound, combinator) in compounds.into_iter().zip(combinators).rev() {
        ancestors.push((combinator, compound));
    }
    Ok(ComplexSelector {
        subject: current,
        ancestors,
    })
}

/// Parse the inside of `[...]`.
fn parse_attribute(inner: &str, raw: &str) -> Result<AttributeSelector, SelectorError> {
    let operators = [("~=", 0), ("^=", 1), ("$=", 2), ("*=", 3), ("=", 4)];
    for (op, kind) in operators {
        if let Some((name, value)) = inner.split_once(op) {
            let name = name.trim().to_string();
            let value = value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
            if name.is_empty() {
                return Err(SelectorError::Invalid(raw.to_string()));
            }
            return Ok(match kind {
                0 => AttributeSelector::Includes(name, value),
                1 => AttributeSelector::PrefixMatch(name, value),
                2 => AttributeSelector::SuffixMatch(name, value),
                3 => AttributeSelector::SubstringMatch(name, value),
                _ => AttributeSelector::Equals(name, value),
            });
        }
    }
    let name = inner.trim();
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return Err(SelectorError::Invalid(raw.to_string()));
    }
    Ok(AttributeSelector::Exists(name.to_string()))
}
