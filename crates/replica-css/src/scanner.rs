//! Span-preserving CSS rule scanner per [§ 5 Parsing](https://www.w3.org/TR/css-syntax-3/#parsing).
//!
//! Replay adaptation must hand the page back its own stylesheet with only a
//! few preludes changed, so instead of building a component-value tree this
//! scanner records *where* each rule's prelude and block live in the input.
//! Rewrites are then spliced into the original text and everything else
//! (comments, whitespace, vendor hacks) survives byte for byte.
//!
//! The scanner is stricter than a browser: an unterminated block, comment
//! or string, or a stray `}`, is reported as a [`CssError`] so the caller
//! can fall back to the untouched text.

use thiserror::Error;

/// A CSS text that could not be scanned into rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CssError {
    /// A `{` without its matching `}` before EOF.
    #[error("unterminated block starting at offset {0}")]
    UnterminatedBlock(usize),
    /// A `/*` without `*/`.
    #[error("unterminated comment starting at offset {0}")]
    UnterminatedComment(usize),
    /// A quoted string without its closing quote.
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    /// A qualified rule prelude that runs into EOF.
    #[error("rule prelude without a block at offset {0}")]
    MissingBlock(usize),
    /// A `}` with no open block.
    #[error("unexpected '}}' at offset {0}")]
    UnexpectedBrace(usize),
}

/// A half-open range of char indices into the scanned input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First char index.
    pub start: usize,
    /// One past the last char index.
    pub end: usize,
}

/// [§ 5.3.3 Consume a list of rules](https://www.w3.org/TR/css-syntax-3/#consume-list-of-rules)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    /// [§ 5.4.3 Consume a qualified rule](https://www.w3.org/TR/css-syntax-3/#consume-qualified-rule)
    Qualified {
        /// The selector list, without the `{`.
        prelude: Span,
        /// The declarations, between the braces.
        block: Span,
    },
    /// [§ 5.4.2 Consume an at-rule](https://www.w3.org/TR/css-syntax-3/#consume-at-rule)
    At {
        /// The at-keyword name, lower-cased, without `@`.
        name: String,
        /// Everything between the name and the `;` or `{`.
        prelude: Span,
        /// Nested rules, for conditional group rules such as `@media`.
        rules: Vec<CssRule>,
    },
}

/// At-rules whose block is itself a list of rules.
///
/// [CSS Conditional Rules § 2](https://www.w3.org/TR/css-conditional-3/#processing)
const GROUPING_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "document",
    "-moz-document",
    "layer",
    "container",
    "scope",
    "starting-style",
];

/// Scanner over a stylesheet's text.
pub struct CssScanner {
    /// The input as code points
    input: Vec<char>,
    /// Current position in the input
    position: usize,
}

impl CssScanner {
    /// Create a new scanner for the given CSS text.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// The scanned input as code points, for slicing with [`Span`]s.
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.input
    }

    /// Text covered by `span`.
    #[must_use]
    pub fn slice(&self, span: Span) -> String {
        self.input[span.start..span.end].iter().collect()
    }

    /// [§ 5.3.3 Parse a stylesheet](https://www.w3.org/TR/css-syntax-3/#parse-stylesheet)
    ///
    /// "Consume a list of rules from input, with the top-level flag set."
    ///
    /// # Errors
    ///
    /// Returns a [`CssError`] for unterminated constructs or stray braces.
    pub fn scan_stylesheet(&mut self) -> Result<Vec<CssRule>, CssError> {
        self.consume_list_of_rules(true)
    }

    fn consume_list_of_rules(&mut self, top_level: bool) -> Result<Vec<CssRule>, CssError> {
        let mut rules = Vec::new();

        loop {
            self.consume_whitespace_and_comments()?;

            match self.peek() {
                // "<EOF-token>": return the list of rules. Nested lists must
                // close with '}' first.
                None if top_level => return Ok(rules),
                None => return Err(CssError::UnterminatedBlock(self.position)),

                Some('}') if top_level => return Err(CssError::UnexpectedBrace(self.position)),
                Some('}') => return Ok(rules),

                // "<CDO-token>" or "<CDC-token>": "Do nothing." at the top level.
                Some('<') if top_level && self.starts_with("<!--") => self.position += 4,
                Some('-') if top_level && self.starts_with("-->") => self.position += 3,

                // A stray ';' between rules carries no rule.
                Some(';') => self.position += 1,

                // "<at-keyword-token>"
                Some('@') => rules.push(self.consume_at_rule()?),

                // "anything else": "Consume a qualified rule."
                Some(_) => rules.push(self.consume_qualified_rule()?),
            }
        }
    }

    /// [§ 5.4.2 Consume an at-rule](https://www.w3.org/TR/css-syntax-3/#consume-at-rule)
    fn consume_at_rule(&mut self) -> Result<CssRule, CssError> {
        self.position += 1; // @
        let name_start = self.position;
        while self.peek().is_some_and(is_ident_code_point) {
            self.position += 1;
        }
        let name: String = self.input[name_start..self.position]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();

        let prelude_start = self.position;
        let stop = self.consume_until(&[';', '{'])?;
        let prelude = Span {
            start: prelude_start,
            end: self.position,
        };

        match stop {
            // "<semicolon-token>" / "<EOF-token>": "Return the at-rule."
            Some(';') => {
                self.position += 1;
                Ok(CssRule::At {
                    name,
                    prelude,
                    rules: Vec::new(),
                })
            }
            Some(_) => {
                let block_start = self.position;
                self.position += 1; // {
                let rules = if GROUPING_AT_RULES.contains(&name.as_str()) {
                    let nested = self.consume_list_of_rules(false)?;
                    if self.peek() != Some('}') {
                        return Err(CssError::UnterminatedBlock(block_start));
                    }
                    self.position += 1;
                    nested
                } else {
                    // Keyframes, font-face, page: the block is opaque.
                    self.consume_simple_block_body(block_start)?;
                    Vec::new()
                };
                Ok(CssRule::At {
                    name,
                    prelude,
                    rules,
                })
            }
            None => Ok(CssRule::At {
                name,
                prelude,
                rules: Vec::new(),
            }),
        }
    }

    /// [§ 5.4.3 Consume a qualified rule](https://www.w3.org/TR/css-syntax-3/#consume-qualified-rule)
    fn consume_qualified_rule(&mut self) -> Result<CssRule, CssError> {
        let prelude_start = self.position;
        match self.consume_until(&['{'])? {
            // "<EOF-token>": "This is a parse error. Return nothing."
            None => Err(CssError::MissingBlock(prelude_start)),
            Some(_) => {
                let prelude = Span {
                    start: prelude_start,
                    end: self.position,
                };
                let block_start = self.position;
                self.position += 1; // {
                let body_start = self.position;
                self.consume_simple_block_body(block_start)?;
                Ok(CssRule::Qualified {
                    prelude,
                    block: Span {
                        start: body_start,
                        end: self.position - 1,
                    },
                })
            }
        }
    }

    /// [§ 5.4.8 Consume a simple block](https://www.w3.org/TR/css-syntax-3/#consume-simple-block)
    ///
    /// Called just after the opening `{`; consumes through the matching `}`.
    fn consume_simple_block_body(&mut self, block_start: usize) -> Result<(), CssError> {
        let mut depth = 1usize;
        loop {
            match self.consume_until(&['{', '}'])? {
                None => return Err(CssError::UnterminatedBlock(block_start)),
                Some('{') => {
                    depth += 1;
                    self.position += 1;
                }
                Some(_) => {
                    depth -= 1;
                    self.position += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Advance to the next unquoted, uncommented occurrence of one of
    /// `stops` at parenthesis/bracket depth zero, without consuming it.
    /// Returns the stop found, or `None` at EOF.
    fn consume_until(&mut self, stops: &[char]) -> Result<Option<char>, CssError> {
        let mut nesting: Vec<char> = Vec::new();
        while let Some(c) = self.peek() {
            if nesting.is_empty() && stops.contains(&c) {
                return Ok(Some(c));
            }
            match c {
                '\\' => self.position += 2,
                '"' | '\'' => self.consume_string(c)?,
                '/' if self.peek_at(1) == Some('*') => self.consume_comment()?,
                '(' => {
                    nesting.push(')');
                    self.position += 1;
                }
                '[' => {
                    nesting.push(']');
                    self.position += 1;
                }
                ')' | ']' => {
                    if nesting.last() == Some(&c) {
                        let _ = nesting.pop();
                    }
                    self.position += 1;
                }
                _ => self.position += 1,
            }
        }
        self.position = self.position.min(self.input.len());
        Ok(None)
    }

    /// [§ 4.3.2 Consume comments](https://www.w3.org/TR/css-syntax-3/#consume-comment)
    fn consume_comment(&mut self) -> Result<(), CssError> {
        let start = self.position;
        self.position += 2; // /*
        while self.position < self.input.len() {
            if self.input[self.position] == '*' && self.peek_at(1) == Some('/') {
                self.position += 2;
                return Ok(());
            }
            self.position += 1;
        }
        Err(CssError::UnterminatedComment(start))
    }

    /// [§ 4.3.5 Consume a string token](https://www.w3.org/TR/css-syntax-3/#consume-string-token)
    fn consume_string(&mut self, ending_code_point: char) -> Result<(), CssError> {
        let start = self.position;
        self.position += 1;
        while let Some(c) = self.peek() {
            match c {
                c if c == ending_code_point => {
                    self.position += 1;
                    return Ok(());
                }
                '\\' => self.position += 2,
                // "newline": "This is a parse error." A bad string ends here.
                '\n' => return Ok(()),
                _ => self.position += 1,
            }
        }
        Err(CssError::UnterminatedString(start))
    }

    fn consume_whitespace_and_comments(&mut self) -> Result<(), CssError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.position += 1,
                Some('/') if self.peek_at(1) == Some('*') => self.consume_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn starts_with(&self, needle: &str) -> bool {
        needle
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }
}

/// [§ 4.3.9 ident code point](https://www.w3.org/TR/css-syntax-3/#ident-code-point)
///
/// "An ident-start code point, a digit, or U+002D HYPHEN-MINUS (-)."
#[must_use]
pub const fn is_ident_code_point(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}
