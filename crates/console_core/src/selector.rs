//! Small CSS-like selector engine: compound selectors joined by the
//! descendant combinator.

use thiserror::Error;

use crate::document::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset} in selector '{selector}'")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated attribute selector in '{0}'")]
    UnterminatedAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|want| want != tag) {
            return false;
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        self.attrs.iter().all(|attr| match (&attr.value, doc.attr(node, &attr.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(want), Some(have)) => want == have,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut steps = Vec::new();
        for (offset, part) in split_compounds(source)? {
            steps.push(parse_compound(source, offset, part)?);
        }
        if steps.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Matches right to left; for descendant-only chains the nearest
    /// matching ancestor is always a valid choice.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((last, rest)) = self.steps.split_last() else {
            return false;
        };
        if !last.matches(doc, node) {
            return false;
        }
        let mut current = doc.parent(node);
        for step in rest.iter().rev() {
            loop {
                let Some(id) = current else {
                    return false;
                };
                current = doc.parent(id);
                if step.matches(doc, id) {
                    break;
                }
            }
        }
        true
    }
}

/// Splits on whitespace that is outside attribute brackets, keeping the
/// byte offset of each part for error reporting.
fn split_compounds(source: &str) -> Result<Vec<(usize, &str)>, SelectorError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start: Option<usize> = None;
    for (offset, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if depth > 0 => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c.is_whitespace() && depth == 0 => {
                if let Some(begin) = start.take() {
                    parts.push((begin, &source[begin..offset]));
                }
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(offset);
        }
    }
    if depth > 0 || quote.is_some() {
        return Err(SelectorError::UnterminatedAttribute(source.to_string()));
    }
    if let Some(begin) = start {
        parts.push((begin, &source[begin..]));
    }
    Ok(parts)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn parse_compound(source: &str, base: usize, part: &str) -> Result<Compound, SelectorError> {
    let unexpected = |offset: usize, found: char| SelectorError::Unexpected {
        selector: source.to_string(),
        offset: base + offset,
        found,
    };
    let chars: Vec<(usize, char)> = part.char_indices().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let mut ident = String::new();
        while let Some((_, ch)) = chars.get(*i) {
            if !is_ident_char(*ch) {
                break;
            }
            ident.push(*ch);
            *i += 1;
        }
        ident
    };

    match chars.first() {
        Some((_, '*')) => i = 1,
        Some((_, ch)) if is_ident_char(*ch) => compound.tag = Some(read_ident(&mut i)),
        _ => {}
    }

    while let Some(&(offset, ch)) = chars.get(i) {
        match ch {
            '.' => {
                i += 1;
                let class = read_ident(&mut i);
                if class.is_empty() {
                    return Err(unexpected(offset, ch));
                }
                compound.classes.push(class);
            }
            '[' => {
                i += 1;
                let name = read_ident(&mut i);
                if name.is_empty() {
                    return Err(unexpected(offset, ch));
                }
                let value = match chars.get(i) {
                    Some((_, ']')) => None,
                    Some((_, '=')) => {
                        i += 1;
                        let mut value = String::new();
                        let quote = match chars.get(i) {
                            Some((_, q @ ('"' | '\''))) => {
                                i += 1;
                                Some(*q)
                            }
                            _ => None,
                        };
                        while let Some(&(_, c)) = chars.get(i) {
                            match quote {
                                Some(q) if c == q => {
                                    i += 1;
                                    break;
                                }
                                None if c == ']' => break,
                                _ => value.push(c),
                            }
                            i += 1;
                        }
                        Some(value)
                    }
                    Some(&(at, other)) => return Err(unexpected(at, other)),
                    None => return Err(SelectorError::UnterminatedAttribute(source.to_string())),
                };
                match chars.get(i) {
                    Some((_, ']')) => i += 1,
                    Some(&(at, other)) => return Err(unexpected(at, other)),
                    None => return Err(SelectorError::UnterminatedAttribute(source.to_string())),
                }
                compound.attrs.push(AttrMatch { name, value });
            }
            other => return Err(unexpected(offset, other)),
        }
    }
    Ok(compound)
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
