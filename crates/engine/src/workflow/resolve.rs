//! # Context Reference Resolution
//!
//! Step parameters may carry references to values produced by earlier steps.
//! A reference is a string that is *entirely* of the form
//!
//! ```text
//! reference := "$context." path
//! path      := segment ("." segment | "[" index "]")*
//! segment   := identifier
//! index     := non-negative integer
//! ```
//!
//! for example `$context.search.results[0].url`. Strings that do not match the
//! grammar, including references embedded in longer text, are literals.
//!
//! Resolution walks every leaf of a parameter tree (see [`leaves`]), replaces
//! each reference with a copy of the value it points at, and leaves all other
//! leaves untouched. It never mutates the [`Context`], so resolving the same
//! parameters twice against the same context yields the same result.
//!
//! ```rust
//! use astraflow_engine::workflow::{resolve::resolve_value, Context};
//! use serde_json::json;
//!
//! let mut context = Context::new();
//! context.bind("results", json!([{"name": "a"}, {"name": "b"}]));
//!
//! let params = json!({"first": "$context.results[0].name", "limit": 10});
//! let resolved = resolve_value(&params, &context).unwrap();
//! assert_eq!(resolved, json!({"first": "a", "limit": 10}));
//! ```

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use super::context::Context;

pub const REFERENCE_PREFIX: &str = "$context.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no upstream step produced context variable '{name}' (available: [{}])", .available.join(", "))]
    UnboundVariable { name: String, available: Vec<String> },

    #[error("field '{field}' not found at '{path}' (available fields: [{}])", .available.join(", "))]
    MissingField {
        path: String,
        field: String,
        available: Vec<String>,
    },

    #[error("cannot access field '{field}' at '{path}': value is {actual}, not a mapping")]
    NotAMapping {
        path: String,
        field: String,
        actual: &'static str,
    },

    #[error("index {index} out of bounds at '{path}': sequence has length {len}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("cannot index [{index}] at '{path}': value is {actual}, not a sequence")]
    NotASequence {
        path: String,
        index: usize,
        actual: &'static str,
    },
}

/// One step of a reference path after the root variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Field(String),
    Index(usize),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field(name) => write!(f, ".{}", name),
            Accessor::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed `$context.` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    root: String,
    accessors: Vec<Accessor>,
}

fn is_word_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Splits the leading run of word characters off `input`.
fn take_word(input: &str) -> (&str, &str) {
    let end = input
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    input.split_at(end)
}

/// An identifier: `_` or a letter, then `_`, letters or digits.
fn take_identifier(input: &str) -> Option<(&str, &str)> {
    let (word, rest) = take_word(input);
    let first = word.chars().next()?;
    if first == '_' || first.is_alphabetic() {
        Some((word, rest))
    } else {
        None
    }
}

/// A field segment: an identifier, or all digits for the `results.0` form.
fn take_field(input: &str) -> Option<(&str, &str)> {
    let (word, rest) = take_word(input);
    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        return Some((word, rest));
    }
    take_identifier(input)
}

impl Reference {
    /// Parses a whole-string reference. Returns `None` for anything that is
    /// not a well-formed reference, which callers treat as a literal.
    pub fn parse(input: &str) -> Option<Self> {
        let path = input.strip_prefix(REFERENCE_PREFIX)?;
        let (root, mut rest) = take_identifier(path)?;
        let mut accessors = Vec::new();

        while let Some(c) = rest.chars().next() {
            match c {
                '.' => {
                    let (field, tail) = take_field(&rest[1..])?;
                    accessors.push(Accessor::Field(field.to_string()));
                    rest = tail;
                }
                '[' => {
                    let close = rest.find(']')?;
                    let digits = &rest[1..close];
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return None;
                    }
                    let index = digits.parse().ok()?;
                    accessors.push(Accessor::Index(index));
                    rest = &rest[close + 1..];
                }
                _ => return None,
            }
        }

        Some(Self {
            root: root.to_string(),
            accessors,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Follows the reference through `context`.
    ///
    /// A missing root is reported as [`ResolveError::UnboundVariable`]; every
    /// other variant means the value exists but has the wrong shape.
    pub fn resolve<'a>(&self, context: &'a Context) -> Result<&'a Value, ResolveError> {
        let mut current = context
            .get(&self.root)
            .ok_or_else(|| ResolveError::UnboundVariable {
                name: self.root.clone(),
                available: context.names(),
            })?;
        let mut path = format!("{}{}", REFERENCE_PREFIX, self.root);

        for accessor in &self.accessors {
            current = match accessor {
                Accessor::Field(field) => access_field(current, field, &path)?,
                Accessor::Index(index) => access_index(current, *index, &path)?,
            };
            path.push_str(&accessor.to_string());
        }

        Ok(current)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", REFERENCE_PREFIX, self.root)?;
        for accessor in &self.accessors {
            write!(f, "{}", accessor)?;
        }
        Ok(())
    }
}

fn access_field<'a>(current: &'a Value, field: &str, path: &str) -> Result<&'a Value, ResolveError> {
    match current {
        Value::Object(map) => map.get(field).ok_or_else(|| ResolveError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
            available: map.keys().cloned().collect(),
        }),
        // `results.0` is accepted as a synonym for `results[0]`.
        Value::Array(_) if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) => {
            match field.parse() {
                Ok(index) => access_index(current, index, path),
                Err(_) => Err(ResolveError::NotAMapping {
                    path: path.to_string(),
                    field: field.to_string(),
                    actual: kind_of(current),
                }),
            }
        }
        other => Err(ResolveError::NotAMapping {
            path: path.to_string(),
            field: field.to_string(),
            actual: kind_of(other),
        }),
    }
}

fn access_index<'a>(current: &'a Value, index: usize, path: &str) -> Result<&'a Value, ResolveError> {
    match current {
        Value::Array(items) => items.get(index).ok_or(ResolveError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len: items.len(),
        }),
        other => Err(ResolveError::NotASequence {
            path: path.to_string(),
            index,
            actual: kind_of(other),
        }),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Location of a leaf inside a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Depth-first walk over every scalar leaf of a JSON tree, in document order.
///
/// The walk borrows the tree and can be restarted by cloning it or calling
/// [`leaves`] again.
#[derive(Debug, Clone)]
pub struct Leaves<'a> {
    stack: Vec<(Vec<PathSegment>, &'a Value)>,
}

pub fn leaves(value: &Value) -> Leaves<'_> {
    Leaves {
        stack: vec![(Vec::new(), value)],
    }
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (Vec<PathSegment>, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, value)) = self.stack.pop() {
            match value {
                Value::Object(map) => {
                    for (key, child) in map.iter().rev() {
                        let mut child_path = path.clone();
                        child_path.push(PathSegment::Key(key.clone()));
                        self.stack.push((child_path, child));
                    }
                }
                Value::Array(items) => {
                    for (index, child) in items.iter().enumerate().rev() {
                        let mut child_path = path.clone();
                        child_path.push(PathSegment::Index(index));
                        self.stack.push((child_path, child));
                    }
                }
                _ => return Some((path, value)),
            }
        }
        None
    }
}

/// Every well-formed reference found among the leaves of `value`.
pub fn references(value: &Value) -> impl Iterator<Item = Reference> + '_ {
    leaves(value).filter_map(|(_, leaf)| leaf.as_str().and_then(Reference::parse))
}

fn slot_mut<'a>(value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |current, segment| match segment {
        PathSegment::Key(key) => current.get_mut(key.as_str()),
        PathSegment::Index(index) => current.get_mut(*index),
    })
}

/// Produces a copy of `value` with every reference leaf replaced.
pub fn resolve_value(value: &Value, context: &Context) -> Result<Value, ResolveError> {
    let mut resolved = value.clone();
    for (path, leaf) in leaves(value) {
        let Some(reference) = leaf.as_str().and_then(Reference::parse) else {
            continue;
        };
        let target = reference.resolve(context)?.clone();
        if let Some(slot) = slot_mut(&mut resolved, &path) {
            *slot = target;
        }
    }
    Ok(resolved)
}

/// Resolves a step's parameter map.
pub fn resolve_parameters(
    parameters: &Map<String, Value>,
    context: &Context,
) -> Result<Map<String, Value>, ResolveError> {
    let mut resolved = Map::with_capacity(parameters.len());
    for (name, value) in parameters {
        resolved.insert(name.clone(), resolve_value(value, context)?);
    }
    Ok(resolved)
}
