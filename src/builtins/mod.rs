// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Predicates shipped with the crate.
//!
//! | predicate   | parameters                             |
//! |-------------|----------------------------------------|
//! | `.integer`  | `min`, `max`                           |
//! | `.string`   | `min_length`, `max_length`, `pattern`  |
//! | `.boolean`  |                                        |
//! | `.required` |                                        |
//!
//! The typed predicates normalize the node's value and skip nodes without one.

pub mod numbers;
pub mod strings;
pub mod types;
mod utils;

use crate::registry::{
    register_constructor, register_predicate, ConstructorDef, ConstructorRegistry,
    PredicateRegistry, PredicateSchema, RegistryError,
};
use crate::scheduler::{Context, Outcome, Phase};
use crate::Result;

use std::collections::BTreeMap;

use lazy_static::lazy_static;

pub type BuiltinFcn = fn(&Context<'_>) -> Result<Outcome>;

/// Parameters, phase and constructor of a builtin predicate.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub schema: fn() -> PredicateSchema,
    pub phase: Phase,
    pub fcn: BuiltinFcn,
}

#[rustfmt::skip]
lazy_static! {
    pub static ref BUILTINS: BTreeMap<&'static str, Builtin> = {
	let mut m : BTreeMap<&'static str, Builtin> = BTreeMap::new();

	numbers::register(&mut m);
	strings::register(&mut m);
	types::register(&mut m);

	m
    };
}

/// Register every builtin into the given registries.
pub fn register(
    predicates: &mut PredicateRegistry,
    constructors: &mut ConstructorRegistry,
) -> Result<(), RegistryError> {
    for (name, builtin) in BUILTINS.iter() {
        register_predicate(predicates, name, (builtin.schema)())?;
        register_constructor(constructors, name, builtin.phase, builtin.fcn)?;
    }
    Ok(())
}

// Registration into registries known not to hold any builtin name yet.
pub(crate) fn install(predicates: &mut PredicateRegistry, constructors: &mut ConstructorRegistry) {
    for (name, builtin) in BUILTINS.iter() {
        predicates.insert(*name, (builtin.schema)());
        constructors.insert(*name, ConstructorDef::new(builtin.phase, builtin.fcn));
    }
}
