// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result};
use crate::key::{self, KeyKind};
use crate::path::Path;
use crate::pattern::parse_pattern;
use crate::registry::PredicateRegistry;
use crate::tree::{self, IterOptions, Visit, Walk};
use crate::value::Value;
use crate::Rc;

use core::fmt;
use core::ops::Deref;
use std::collections::BTreeMap;

use log::trace;

/// A compiled specification.
///
/// Every node is an object, every predicate on it is registered and carries
/// an object of parameters accepted by its schema. A `Spec` is never modified
/// in place: merging configuration produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec(Value);

impl Spec {
    pub(crate) fn from_compiled(value: Value) -> Spec {
        Spec(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Deref for Spec {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Compile a raw specification literal.
///
/// Shorthands accepted at node positions:
/// * a scalar (or a list that is not a list of predicate names) means `{"=": value}`,
/// * a list of predicate names means each predicate without parameters,
/// * `null` is an empty node.
///
/// As a predicate value, `null`, `true` and `{}` enable the predicate without
/// parameters and `false` removes it.
pub fn compile_spec(raw: &Value, predicates: &PredicateRegistry) -> Result<Spec> {
    let mut path = Path::root();
    let spec = normalize(raw, &mut path, predicates)?;
    validate(&spec, predicates)?;
    Ok(Spec(spec))
}

fn is_predicate_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|i| matches!(i, Value::String(s) if KeyKind::of(s) == KeyKind::Predicate))
}

pub(crate) fn normalize(raw: &Value, path: &mut Path, predicates: &PredicateRegistry) -> Result<Value> {
    let fields = match raw {
        Value::Null | Value::Undefined => return Ok(Value::new_object()),
        Value::Object(fields) => fields,
        Value::Array(items) if is_predicate_list(items) => {
            let mut node = BTreeMap::new();
            for item in items.iter() {
                let name = item.as_string()?;
                check_registered(name, path, predicates)?;
                node.insert(name.clone(), Value::new_object());
            }
            return Ok(Value::from(node));
        }
        _ => {
            let mut node = Value::new_object();
            node.insert(key::VALUE, raw.clone())?;
            return Ok(node);
        }
    };

    let mut node: BTreeMap<Rc<str>, Value> = BTreeMap::new();
    for (key, value) in fields.iter() {
        match KeyKind::of(key) {
            KeyKind::Predicate => {
                check_registered(key, path, predicates)?;
                let params = match value {
                    Value::Null | Value::Bool(true) => Value::new_object(),
                    Value::Bool(false) => continue,
                    Value::Object(_) => value.clone(),
                    _ => {
                        return Err(Error::invalid_spec(
                            path.clone(),
                            format!("parameters of `{key}` must be an object, got `{value}`"),
                        ))
                    }
                };
                node.insert(key.clone(), params);
            }
            KeyKind::Inherited | KeyKind::Value => {
                node.insert(key.clone(), value.clone());
            }
            KeyKind::Template | KeyKind::Child => {
                if KeyKind::of(key) == KeyKind::Template {
                    parse_pattern(key).map_err(|e| {
                        Error::invalid_spec(path.child(key.clone()), e.to_string())
                    })?;
                }
                path.push(key.clone());
                let child = normalize(value, path, predicates);
                path.pop();
                node.insert(key.clone(), child?);
            }
        }
    }
    Ok(Value::from(node))
}

fn check_registered(name: &str, path: &Path, predicates: &PredicateRegistry) -> Result<()> {
    if predicates.contains(name) {
        Ok(())
    } else {
        Err(Error::invalid_spec(
            path,
            format!("unknown predicate `{name}`"),
        ))
    }
}

// Check the parameters of every predicate against its schema.
pub(crate) fn validate(spec: &Value, predicates: &PredicateRegistry) -> Result<()> {
    tree::walk(spec, IterOptions::default(), |entry| {
        if entry.visit != Visit::Enter {
            return Ok(Walk::Continue);
        }
        let Some(name) = entry.path.name() else {
            return Ok(Walk::Continue);
        };
        match KeyKind::of(name) {
            KeyKind::Predicate => {
                let Some(schema) = predicates.get(name) else {
                    return Err(Error::invalid_spec(
                        entry.path.parent().unwrap_or_default(),
                        format!("unknown predicate `{name}`"),
                    ));
                };
                let node = entry.path.parent().unwrap_or_default();
                trace!("validating {name} at {node}");
                schema.validate(&node, entry.node)?;
                Ok(Walk::SkipSubtree)
            }
            KeyKind::Inherited | KeyKind::Value => Ok(Walk::SkipSubtree),
            KeyKind::Template | KeyKind::Child => Ok(Walk::Continue),
        }
    })
}
