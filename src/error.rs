// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::path::Path;
use crate::pattern::PatternError;
use crate::registry::RegistryError;
use crate::value::Value;
use crate::Rc;

pub type Result<T, E = Error> = core::result::Result<T, E>;

fn join_names(names: &[Rc<str>]) -> String {
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while compiling specs, merging configuration or constructing instances.
///
/// Every variant that concerns a node carries its [`Path`]. Errors created
/// without one (for example by a constructor) are given the path of the node
/// being constructed as they propagate, see [`Error::at`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A specification literal violates a predicate's schema.
    #[error("invalid spec at {path}: {message}")]
    InvalidSpec { path: Path, message: String },

    /// Two documents disagree on a scalar with no resolution.
    #[error("conflict at {path}: `{left}` and `{right}`")]
    Conflict { path: Path, left: Value, right: Value },

    /// A constructor rejected a value.
    #[error("invalid value `{value}` at {path}: {message}")]
    Validation {
        path: Path,
        value: Value,
        message: String,
    },

    /// A full round at a node made no progress.
    #[error("deadlock at {path} in round {round}; pending predicates: {}", join_names(.pending))]
    Deadlock {
        path: Path,
        round: usize,
        pending: Vec<Rc<str>>,
    },

    /// A write had to descend through a node that is not a mapping.
    #[error("not an object at {path}")]
    NotAnObject { path: Path },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A constructor failed with an error outside this taxonomy.
    #[error("constructor `{predicate}` failed at {path}: {source}")]
    Constructor {
        path: Path,
        predicate: Rc<str>,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_spec(path: impl Into<Path>, message: impl Into<String>) -> Error {
        Error::InvalidSpec {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Validation failure for `value`; the node path is filled in by the scheduler.
    pub fn validation(value: Value, message: impl Into<String>) -> Error {
        Error::Validation {
            path: Path::root(),
            value,
            message: message.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::InvalidSpec { path, .. }
            | Error::Conflict { path, .. }
            | Error::Validation { path, .. }
            | Error::Deadlock { path, .. }
            | Error::NotAnObject { path }
            | Error::Constructor { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Attach `loc` unless the error already names a location.
    pub fn at(mut self, loc: &Path) -> Error {
        match &mut self {
            Error::InvalidSpec { path, .. }
            | Error::Conflict { path, .. }
            | Error::Validation { path, .. }
            | Error::Deadlock { path, .. }
            | Error::NotAnObject { path }
            | Error::Constructor { path, .. } => {
                if path.is_root() {
                    *path = loc.clone();
                }
            }
            _ => (),
        }
        self
    }
}
