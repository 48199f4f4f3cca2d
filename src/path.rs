// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Node addressing shared by the tree primitives, the matcher and the scheduler.

use crate::Rc;

use core::fmt;
use core::ops::Deref;

/// Ordered sequence of key segments identifying a node from the document root.
///
/// Paths can be written as `/`-joined strings (`"fields/age"`) or as explicit
/// segment lists (`["fields", "age"]`); both convert into the same canonical
/// segment form. Empty segments in string form are dropped, so `"/a//b/"`
/// and `"a/b"` are the same path and `""` is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Rc<str>>);

impl Path {
    pub fn root() -> Path {
        Path(vec![])
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Rc<str>] {
        &self.0
    }

    pub fn push(&mut self, segment: impl Into<Rc<str>>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<Rc<str>> {
        self.0.pop()
    }

    /// New path with `segment` appended.
    pub fn child(&self, segment: impl Into<Rc<str>>) -> Path {
        let mut p = self.clone();
        p.push(segment);
        p
    }

    pub fn parent(&self) -> Option<Path> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Path(rest.to_vec())),
            None => None,
        }
    }

    /// Last segment, i.e. the node's name inside its parent.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_ref())
    }

    pub fn join(&self, other: &Path) -> Path {
        let mut p = self.clone();
        p.0.extend(other.0.iter().cloned());
        p
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Deref for Path {
    type Target = [Rc<str>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for s in &self.0 {
            write!(f, "/{s}")?;
        }
        Ok(())
    }
}

fn parse_path_string(path: &str) -> Path {
    Path(
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(Rc::from)
            .collect(),
    )
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        parse_path_string(path)
    }
}

impl From<String> for Path {
    fn from(path: String) -> Self {
        parse_path_string(&path)
    }
}

impl From<&String> for Path {
    fn from(path: &String) -> Self {
        parse_path_string(path)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

impl From<Vec<Rc<str>>> for Path {
    fn from(segments: Vec<Rc<str>>) -> Self {
        Path(segments)
    }
}

impl From<&[Rc<str>]> for Path {
    fn from(segments: &[Rc<str>]) -> Self {
        Path(segments.to_vec())
    }
}

impl From<&[&str]> for Path {
    fn from(segments: &[&str]) -> Self {
        Path(segments.iter().map(|s| Rc::from(*s)).collect())
    }
}

impl From<Vec<&str>> for Path {
    fn from(segments: Vec<&str>) -> Self {
        Path::from(segments.as_slice())
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Path(segments.into_iter().map(Rc::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        Path::from(&segments[..])
    }
}

impl FromIterator<Rc<str>> for Path {
    fn from_iter<I: IntoIterator<Item = Rc<str>>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}
