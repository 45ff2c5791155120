//! CSS selector subset
//!
//! Supported: type selectors, `*`, `#id`, `.class`, `[attr]`, `[attr=v]`,
//! `[attr^=v]`, `[attr$=v]`, `[attr*=v]`, descendant and child (`>`)
//! combinators, and comma-separated groups. That is everything the platform
//! adapters need; pseudo-classes are rejected at parse time.

use super::tree::{DomTree, ElementId};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("unexpected end of selector")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One comma-free selector: compounds joined by combinators.
/// `parts[0].0` is unused.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Combinator, Compound)>,
}

/// A parsed selector group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Complex>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser {
            chars: input.chars().collect(),
            pos: 0,
        };
        let groups = parser.parse_groups()?;
        Ok(Self {
            source: input.trim().to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the element `id` matches any group of this selector.
    pub fn matches(&self, tree: &DomTree, id: ElementId) -> bool {
        if tree.is_document(id) {
            return false;
        }
        self.groups
            .iter()
            .any(|complex| match_from(tree, id, &complex.parts, complex.parts.len() - 1))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_from(tree: &DomTree, id: ElementId, parts: &[(Combinator, Compound)], idx: usize) -> bool {
    if !compound_matches(tree, id, &parts[idx].1) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match parts[idx].0 {
        Combinator::Child => match tree.parent(id) {
            Some(parent) => match_from(tree, parent, parts, idx - 1),
            None => false,
        },
        Combinator::Descendant => {
            let mut current = tree.parent(id);
            while let Some(ancestor) = current {
                if match_from(tree, ancestor, parts, idx - 1) {
                    return true;
                }
                current = tree.parent(ancestor);
            }
            false
        }
    }
}

fn compound_matches(tree: &DomTree, id: ElementId, compound: &Compound) -> bool {
    if tree.is_document(id) {
        return false;
    }
    let Some(element) = tree.element(id) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if !element.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(wanted) = &compound.id {
        if element.attr("id") != Some(wanted.as_str()) {
            return false;
        }
    }
    if !compound.classes.iter().all(|c| element.has_class(c)) {
        return false;
    }
    compound.attrs.iter().all(|m| {
        let Some(value) = element.attr(&m.name) else {
            return false;
        };
        match &m.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Prefix(v) => value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => value.ends_with(v.as_str()),
            AttrOp::Contains(v) => value.contains(v.as_str()),
        }
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(found) => SelectorError::Unexpected {
                found,
                offset: self.pos,
            },
            None => SelectorError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), SelectorError> {
        if self.peek() == Some(wanted) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_groups(&mut self) -> Result<Vec<Complex>, SelectorError> {
        self.skip_ws();
        if self.peek().is_none() {
            return Err(SelectorError::Empty);
        }
        let mut groups = vec![self.parse_complex()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            groups.push(self.parse_complex()?);
        }
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(groups)
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        self.skip_ws();
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some(_) if had_ws => Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            };
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut any = false;
        loop {
            match self.peek() {
                Some('*') if !any => {
                    self.pos += 1;
                }
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(c) if !any && is_ident_char(c) => {
                    compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                }
                _ => break,
            }
            any = true;
        }
        if !any {
            return Err(self.unexpected());
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attr(&mut self) -> Result<AttrMatch, SelectorError> {
        self.skip_ws();
        let name = self.parse_ident()?;
        self.skip_ws();
        let op_char = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrMatch {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => None,
            Some(c @ ('^' | '$' | '*')) => {
                self.pos += 1;
                Some(c)
            }
            _ => return Err(self.unexpected()),
        };
        self.expect('=')?;
        self.skip_ws();
        let value = self.parse_value()?;
        self.skip_ws();
        self.expect(']')?;
        let op = match op_char {
            None => AttrOp::Equals(value),
            Some('^') => AttrOp::Prefix(value),
            Some('$') => AttrOp::Suffix(value),
            _ => AttrOp::Contains(value),
        };
        Ok(AttrMatch { name, op })
    }

    fn parse_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => return Ok(value),
                        Some(c) => value.push(c),
                        None => return Err(SelectorError::UnexpectedEnd),
                    }
                }
            }
            _ => self.parse_ident(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
