// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod compile;
mod engine;
mod error;
mod key;
mod merge;
mod number;
mod path;
mod registry;
mod scheduler;
mod value;

pub mod builtins;
pub mod pattern;
pub mod tree;

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc;

pub use compile::{compile_spec, Spec};
pub use engine::{construct, construct_with_context, Engine};
pub use error::{Error, Result};
pub use key::KeyKind;
pub use merge::{doc_spec_config, doc_spec_config_with, MergeOptions};
pub use number::Number;
pub use path::Path;
pub use registry::{
    register_constructor, register_predicate, ConstructorDef, ConstructorRegistry,
    PredicateRegistry, PredicateSchema, Registry, RegistryError,
};
pub use scheduler::{after, after_all, Constructor, Context, Missing, Outcome, Phase, Scheduler};
pub use value::Value;
