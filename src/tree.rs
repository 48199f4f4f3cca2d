// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Path-addressed navigation, mutation, traversal and merging of documents.
//!
//! Navigation never fails for missing nodes: absence is reported through
//! `None` or a non-empty remainder. Only writes that have to pass through a
//! scalar and merges of incompatible scalars are errors.

use crate::error::{Error, Result};
use crate::path::Path;
use crate::pattern::{match_levels, parse_pattern, Levels};
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(fields) => Rc::make_mut(fields).get_mut(segment),
        Value::Array(items) => match segment.parse::<usize>() {
            Ok(i) => Rc::make_mut(items).get_mut(i),
            Err(_) => None,
        },
        _ => None,
    }
}

/// Outcome of [`locate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Located<'a> {
    /// Segments that could not be resolved; empty if the whole path exists.
    pub remaining: Vec<Rc<str>>,
    /// Segments that were resolved.
    pub consumed: Path,
    /// Nodes visited, starting with the document itself.
    pub visited: Vec<&'a Value>,
}

impl Located<'_> {
    pub fn found(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Descend `doc` along `path` for as long as each segment exists.
pub fn locate(doc: &Value, path: impl Into<Path>) -> Located<'_> {
    let path = path.into();
    let mut node = doc;
    let mut visited = vec![doc];
    let mut consumed = Path::root();
    for (idx, segment) in path.iter().enumerate() {
        match child(node, segment) {
            Some(c) => {
                node = c;
                visited.push(c);
                consumed.push(segment.clone());
            }
            None => {
                return Located {
                    remaining: path[idx..].to_vec(),
                    consumed,
                    visited,
                }
            }
        }
    }
    Located {
        remaining: vec![],
        consumed,
        visited,
    }
}

pub fn get(doc: &Value, path: impl Into<Path>) -> Option<&Value> {
    let path = path.into();
    let mut node = doc;
    for segment in path.iter() {
        node = child(node, segment)?;
    }
    Some(node)
}

pub fn get_mut(doc: &mut Value, path: impl Into<Path>) -> Option<&mut Value> {
    let path = path.into();
    let mut node = doc;
    for segment in path.iter() {
        node = child_mut(node, segment)?;
    }
    Some(node)
}

/// Write `value` at `path`, creating intermediate objects as needed, and
/// return the previous value.
///
/// With `multival`, an existing value is not replaced: the new value is
/// appended to it, turning it into an array first if it is not one already.
pub fn set(
    doc: &mut Value,
    path: impl Into<Path>,
    value: Value,
    multival: bool,
) -> Result<Option<Value>> {
    let path = path.into();
    let Some((last, parents)) = path.split_last() else {
        let prev = core::mem::replace(doc, Value::Undefined);
        let (prev, new) = combine(prev, value, multival);
        *doc = new;
        return Ok(Some(prev));
    };

    let mut node = doc;
    for (idx, segment) in parents.iter().enumerate() {
        if matches!(node, Value::Undefined | Value::Null) {
            *node = Value::new_object();
        }
        node = match node {
            Value::Object(fields) => Rc::make_mut(fields)
                .entry(segment.clone())
                .or_insert_with(Value::new_object),
            _ => {
                return Err(Error::NotAnObject {
                    path: Path::from(&path[..idx]),
                })
            }
        };
    }

    if matches!(node, Value::Undefined | Value::Null) {
        *node = Value::new_object();
    }
    let Value::Object(fields) = node else {
        return Err(Error::NotAnObject {
            path: Path::from(parents),
        });
    };
    let fields = Rc::make_mut(fields);
    match fields.remove(last) {
        Some(prev) => {
            let (prev, new) = combine(prev, value, multival);
            fields.insert(last.clone(), new);
            Ok(Some(prev))
        }
        None => {
            fields.insert(last.clone(), value);
            Ok(None)
        }
    }
}

// Returns (previous, replacement).
fn combine(prev: Value, value: Value, multival: bool) -> (Value, Value) {
    if !multival || prev.is_undefined() {
        return (prev, value);
    }
    let new = match &prev {
        Value::Array(items) => {
            let mut items = items.as_ref().clone();
            items.push(value);
            Value::from(items)
        }
        _ => Value::from(vec![prev.clone(), value]),
    };
    (prev, new)
}

/// Remove and return the node at `path`, pruning ancestors left empty.
///
/// Popping the root empties the document.
pub fn pop(doc: &mut Value, path: impl Into<Path>) -> Option<Value> {
    let path = path.into();
    if path.is_root() {
        return Some(core::mem::replace(doc, Value::new_object()));
    }
    pop_in(doc, &path)
}

fn pop_in(node: &mut Value, segments: &[Rc<str>]) -> Option<Value> {
    let Value::Object(fields) = node else {
        return None;
    };
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        if !fields.contains_key(first) {
            return None;
        }
        return Rc::make_mut(fields).remove(first);
    }

    if !fields.contains_key(first) {
        return None;
    }
    let fields = Rc::make_mut(fields);
    let c = fields.get_mut(first)?;
    let popped = pop_in(c, rest)?;
    if c.is_empty_object() {
        fields.remove(first);
    }
    Some(popped)
}

/// Resolver that rejects any pair of differing values.
pub fn conflict(path: &Path, left: &Value, right: &Value) -> Result<Value> {
    Err(Error::Conflict {
        path: path.clone(),
        left: left.clone(),
        right: right.clone(),
    })
}

/// Resolver that lets the right operand win.
pub fn prefer_right(_path: &Path, _left: &Value, right: &Value) -> Result<Value> {
    Ok(right.clone())
}

/// Deep merge of `right` into `left`.
///
/// Objects are merged key by key. Where the two sides hold different
/// non-object values at the same path, `resolve` decides the result; equal
/// values and `Undefined` on either side never reach it.
pub fn merge<F>(left: &Value, right: &Value, mut resolve: F) -> Result<Value>
where
    F: FnMut(&Path, &Value, &Value) -> Result<Value>,
{
    let mut path = Path::root();
    merge_at(&mut path, left, right, &mut resolve)
}

fn merge_at<F>(path: &mut Path, left: &Value, right: &Value, resolve: &mut F) -> Result<Value>
where
    F: FnMut(&Path, &Value, &Value) -> Result<Value>,
{
    match (left, right) {
        (Value::Undefined, _) => Ok(right.clone()),
        (_, Value::Undefined) => Ok(left.clone()),
        (Value::Object(l), Value::Object(r)) => {
            let mut fields: BTreeMap<Rc<str>, Value> = l.as_ref().clone();
            for (key, rv) in r.iter() {
                let merged = match fields.get(key) {
                    Some(lv) => {
                        path.push(key.clone());
                        let merged = merge_at(path, lv, rv, resolve);
                        path.pop();
                        merged?
                    }
                    None => rv.clone(),
                };
                fields.insert(key.clone(), merged);
            }
            Ok(Value::from(fields))
        }
        _ if left == right => Ok(left.clone()),
        _ => resolve(path, left, right),
    }
}

/// Order in which [`iter`] reports nodes relative to their descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Pre,
    Post,
    Both,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IterOptions {
    pub order: Order,
    /// Descend into arrays, addressing items by their index.
    pub expand_sequences: bool,
}

/// Whether an entry is reported before or after its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Enter,
    Exit,
}

#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub path: Path,
    pub node: &'a Value,
    pub visit: Visit,
}

struct Frame<'a> {
    path: Path,
    node: &'a Value,
    children: Vec<(Rc<str>, &'a Value)>,
    next: usize,
}

impl<'a> Frame<'a> {
    fn new(path: Path, node: &'a Value, expand_sequences: bool, skip: bool) -> Frame<'a> {
        let children = match node {
            _ if skip => vec![],
            Value::Object(fields) => fields.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Value::Array(items) if expand_sequences => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Rc::from(i.to_string()), v))
                .collect(),
            _ => vec![],
        };
        Frame {
            path,
            node,
            children,
            next: 0,
        }
    }
}

/// Lazy depth-first traversal created by [`iter`].
///
/// Children are expanded only when the traversal moves past their parent, so
/// calling [`Iter::skip_subtree`] right after an `Enter` entry prevents the
/// traversal from descending into that node. Its `Exit` entry is still
/// reported in `Post`/`Both` order.
pub struct Iter<'a> {
    root: Option<&'a Value>,
    stack: Vec<Frame<'a>>,
    descend: Option<(Path, &'a Value, bool)>,
    options: IterOptions,
}

impl<'a> Iter<'a> {
    pub fn skip_subtree(&mut self) {
        if let Some(d) = self.descend.as_mut() {
            d.2 = true;
        }
    }

    fn reports_enter(&self) -> bool {
        matches!(self.options.order, Order::Pre | Order::Both)
    }

    fn reports_exit(&self) -> bool {
        matches!(self.options.order, Order::Post | Order::Both)
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            self.descend = Some((Path::root(), root, false));
            if self.reports_enter() {
                return Some(Entry {
                    path: Path::root(),
                    node: root,
                    visit: Visit::Enter,
                });
            }
        }

        loop {
            if let Some((path, node, skip)) = self.descend.take() {
                self.stack
                    .push(Frame::new(path, node, self.options.expand_sequences, skip));
            }

            let frame = self.stack.last_mut()?;
            if frame.next < frame.children.len() {
                let (key, node) = frame.children[frame.next].clone();
                frame.next += 1;
                let path = frame.path.child(key);
                self.descend = Some((path.clone(), node, false));
                if self.reports_enter() {
                    return Some(Entry {
                        path,
                        node,
                        visit: Visit::Enter,
                    });
                }
            } else {
                let frame = self.stack.pop()?;
                if self.reports_exit() {
                    return Some(Entry {
                        path: frame.path,
                        node: frame.node,
                        visit: Visit::Exit,
                    });
                }
            }
        }
    }
}

/// Start a fresh traversal of `doc`. Keys are visited in document (sorted) order.
pub fn iter(doc: &Value, options: IterOptions) -> Iter<'_> {
    Iter {
        root: Some(doc),
        stack: vec![],
        descend: None,
        options,
    }
}

/// Control token returned by a [`walk`] visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    SkipSubtree,
    Stop,
}

/// Drive a traversal of `doc` with `visitor`, which steers it through the
/// returned [`Walk`] token. `SkipSubtree` only has an effect on `Enter` entries.
pub fn walk<'a, F>(doc: &'a Value, options: IterOptions, mut visitor: F) -> Result<()>
where
    F: FnMut(&Entry<'a>) -> Result<Walk>,
{
    let mut entries = iter(doc, options);
    while let Some(entry) = entries.next() {
        match visitor(&entry)? {
            Walk::Continue => (),
            Walk::SkipSubtree if entry.visit == Visit::Enter => entries.skip_subtree(),
            Walk::SkipSubtree => (),
            Walk::Stop => break,
        }
    }
    Ok(())
}

/// Find every node whose path matches `pattern`, a `/`-separated list of
/// segment patterns (see [`crate::pattern`]). Paths are reported with their
/// concrete keys.
pub fn select<'a>(doc: &'a Value, pattern: &str) -> Result<Vec<(Path, &'a Value)>> {
    let levels = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| parse_pattern(s).map(|p| vec![p]))
        .collect::<core::result::Result<Vec<_>, _>>()?;
    Ok(match_levels(doc, &levels, &Levels::All).collect())
}
