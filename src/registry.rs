// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_debug_implementations)] // constructor closures are not debug printable

use crate::error::{Error, Result};
use crate::key::KeyKind;
use crate::path::Path;
use crate::pattern::{match_tree, parse_pattern, Aggregator, Levels, MatchOptions};
use crate::scheduler::{Constructor, Context, Outcome, Phase};
use crate::value::Value;
use crate::Rc;

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};


/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists {
        name: Rc<str>,
        registry: Rc<str>,
    },
    InvalidName {
        name: Rc<str>,
        registry: Rc<str>,
        reason: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName {
                name,
                registry,
                reason,
            } => {
                write!(
                    f,
                    "{registry} registration failed: The name '{name}' is invalid ({reason})."
                )
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: name.into(),
            registry: registry_name.into(),
            reason: "empty or whitespace-only names are not allowed",
        })
    } else {
        Ok(())
    }
}

/// Validates that a name lives in the predicate namespace.
pub fn validate_predicate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    validate_name(name, registry_name)?;
    if KeyKind::of(name) != KeyKind::Predicate || name.len() < 2 {
        return Err(RegistryError::InvalidName {
            name: name.into(),
            registry: registry_name.into(),
            reason: "predicate names start with '.' followed by at least one character",
        });
    }
    Ok(())
}

/// Named collection of items that remembers the order of registration.
///
/// Registries are filled at setup time and only read during construction,
/// so they need no interior locking; share them behind an `Arc` (or clone
/// them, which only clones item handles) to use them from several threads.
pub struct Registry<T> {
    inner: BTreeMap<Rc<str>, (usize, Rc<T>)>,
    next: usize,
    name: Rc<str>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            next: self.next,
            name: self.name.clone(),
        }
    }
}

impl<T> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: impl Into<Rc<str>>) -> Self {
        Self {
            inner: BTreeMap::new(),
            next: 0,
            name: registry_name.into(),
        }
    }

    /// Get the name of this registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item with a given name. Returns Err if name already exists.
    pub fn register(
        &mut self,
        name: impl Into<Rc<str>>,
        item: impl Into<Rc<T>>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, &self.name)?;

        if self.inner.contains_key(&name) {
            return Err(RegistryError::AlreadyExists {
                name,
                registry: self.name.clone(),
            });
        }
        self.insert(name, item);
        Ok(())
    }

    /// Try to register an item, but don't fail if the name already exists.
    /// Returns Ok(true) if the item was registered, Ok(false) if the name already exists.
    pub fn try_register(
        &mut self,
        name: impl Into<Rc<str>>,
        item: impl Into<Rc<T>>,
    ) -> Result<bool, RegistryError> {
        match self.register(name, item) {
            Ok(()) => Ok(true),
            Err(RegistryError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // Unchecked registration for names known to be valid.
    pub(crate) fn insert(&mut self, name: impl Into<Rc<str>>, item: impl Into<Rc<T>>) {
        self.inner.insert(name.into(), (self.next, item.into()));
        self.next += 1;
    }

    /// Retrieve an item by name, if it exists.
    pub fn get(&self, name: &str) -> Option<Rc<T>> {
        self.inner.get(name).map(|(_, item)| Rc::clone(item))
    }

    /// Position of `name` in registration order.
    pub fn sequence(&self, name: &str) -> Option<usize> {
        self.inner.get(name).map(|(seq, _)| *seq)
    }

    /// Remove an item by name. Returns the removed item if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Rc<T>> {
        self.inner.remove(name).map(|(_, item)| item)
    }

    /// List all registered item names, sorted.
    pub fn list_names(&self) -> Vec<Rc<str>> {
        self.inner.keys().cloned().collect()
    }

    /// Check if an item with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clear all items from the registry. Registration order restarts.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.next = 0;
    }

    /// Iterate over (name, item) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (Rc<str>, Rc<T>)> + '_ {
        self.inner
            .iter()
            .map(|(name, (_, item))| (name.clone(), Rc::clone(item)))
    }
}

/// Parameters a predicate accepts.
///
/// The parameter document is a pattern document: its keys may be segment
/// patterns (see [`crate::pattern`]) and a nested object describes the
/// parameters of a nested parameter. An empty object as a value accepts any
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateSchema {
    params: Value,
    required: BTreeSet<Rc<str>>,
}

impl Default for PredicateSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl PredicateSchema {
    /// Schema of a predicate that takes no parameters.
    pub fn new() -> Self {
        Self {
            params: Value::new_object(),
            required: BTreeSet::new(),
        }
    }

    fn with(mut self, name: &str, value: Value) -> Self {
        if let Value::Object(fields) = &mut self.params {
            Rc::make_mut(fields).insert(name.into(), value);
        }
        self
    }

    /// Accept an optional parameter `name` with any value.
    pub fn param(self, name: &str) -> Self {
        self.with(name, Value::new_object())
    }

    /// Accept a parameter `name` whose own keys follow `schema`.
    pub fn nested(self, name: &str, schema: PredicateSchema) -> Self {
        self.with(name, schema.params)
    }

    /// Accept and require parameter `name`.
    pub fn required(mut self, name: &str) -> Self {
        self.required.insert(name.into());
        self.param(name)
    }

    /// Build a schema from a parameter document. Pattern keys are checked eagerly.
    pub fn from_value(params: Value) -> Result<Self> {
        if !params.is_object() {
            return Err(Error::invalid_spec(
                Path::root(),
                format!("predicate parameters must be described by an object, got `{params}`"),
            ));
        }
        for key in params.as_object()?.keys() {
            parse_pattern(key)?;
        }
        Ok(Self {
            params,
            required: BTreeSet::new(),
        })
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn required_params(&self) -> &BTreeSet<Rc<str>> {
        &self.required
    }

    /// Check the parameters `given` to a predicate at `path`.
    pub fn validate(&self, path: &Path, given: &Value) -> Result<()> {
        let fields = match given {
            Value::Object(fields) => fields,
            Value::Null | Value::Undefined => return self.check_required(path, &BTreeMap::new()),
            _ => {
                return Err(Error::invalid_spec(
                    path,
                    format!("predicate parameters must be an object, got `{given}`"),
                ))
            }
        };

        if self.params.is_empty_object() {
            if let Some(key) = fields.keys().next() {
                return Err(Error::invalid_spec(
                    path,
                    format!("unexpected parameter `{key}`"),
                ));
            }
            return Ok(());
        }

        let options = MatchOptions {
            aggregators: vec![Aggregator::AnyOf],
            expand: Levels::All,
            automerge: false,
        };
        let outcome = match_tree(&self.params, given, &options)?;
        if let Some(unexpected) = outcome.unmatched.first() {
            return Err(Error::invalid_spec(
                path,
                format!("unexpected parameter `{}`", unexpected.segments().join("/")),
            ));
        }
        self.check_required(path, fields)
    }

    fn check_required(&self, path: &Path, fields: &BTreeMap<Rc<str>, Value>) -> Result<()> {
        match self.required.iter().find(|r| !fields.contains_key(&***r)) {
            Some(r) => Err(Error::invalid_spec(
                path,
                format!("missing required parameter `{r}`"),
            )),
            None => Ok(()),
        }
    }
}

/// A constructor together with the phase it runs in.
pub struct ConstructorDef {
    pub phase: Phase,
    pub fcn: Box<dyn Constructor>,
}

impl ConstructorDef {
    pub fn new<F>(phase: Phase, fcn: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            phase,
            fcn: Box::new(fcn),
        }
    }
}

/// Predicate name to accepted parameters.
pub type PredicateRegistry = Registry<PredicateSchema>;

/// Predicate name to constructor.
pub type ConstructorRegistry = Registry<ConstructorDef>;

/// Declare predicate `name` and the parameters it accepts.
pub fn register_predicate(
    registry: &mut PredicateRegistry,
    name: &str,
    schema: PredicateSchema,
) -> Result<(), RegistryError> {
    validate_predicate_name(name, registry.name())?;
    registry.register(name, schema)
}

/// Attach the constructor invoked for nodes carrying predicate `name`.
pub fn register_constructor<F>(
    registry: &mut ConstructorRegistry,
    name: &str,
    phase: Phase,
    fcn: F,
) -> Result<(), RegistryError>
where
    F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
{
    validate_predicate_name(name, registry.name())?;
    registry.register(name, ConstructorDef::new(phase, fcn))
}
