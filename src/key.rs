// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Namespace of a document key, selected by its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `.name`: a predicate attached to the node.
    Predicate,
    /// `:name`: configuration visible to the node and all its descendants.
    Inherited,
    /// `=`, `=d`, ...: a value slot of the node.
    Value,
    /// `*` or a key starting with `?`, `!`, `&` or `|`: a template that
    /// configuration keys are matched against.
    Template,
    /// Anything else: a structural child addressed by literal name.
    Child,
}

impl KeyKind {
    pub fn of(key: &str) -> KeyKind {
        match key.as_bytes().first() {
            Some(b'.') => KeyKind::Predicate,
            Some(b':') => KeyKind::Inherited,
            Some(b'=') => KeyKind::Value,
            Some(b'*' | b'?' | b'!' | b'&' | b'|') => KeyKind::Template,
            _ => KeyKind::Child,
        }
    }

    /// Keys that the scheduler descends into.
    pub fn is_structural(self) -> bool {
        matches!(self, KeyKind::Child)
    }
}

/// The value slot holding a node's explicit scalar.
pub const VALUE: &str = "=";

/// The value slot holding a node's default.
pub const DEFAULT: &str = "=d";
