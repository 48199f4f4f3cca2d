// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Merging a configuration document into a compiled spec.

use crate::compile::Spec;
use crate::error::{Error, Result};
use crate::key::{self, KeyKind};
use crate::path::Path;
use crate::pattern::parse_pattern;
use crate::registry::PredicateRegistry;
use crate::tree;
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use log::{trace, warn};

/// Options for [`doc_spec_config_with`].
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Reject configuration keys the spec does not declare. When unset, such
    /// keys are dropped with a warning.
    pub strict: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Merge `config` into `spec` with default options.
///
/// The result is what [`crate::Scheduler`] walks. Merging is idempotent:
/// merging the same configuration into the result again yields the result.
pub fn doc_spec_config(
    spec: &Spec,
    config: &Value,
    predicates: &PredicateRegistry,
) -> Result<Spec> {
    doc_spec_config_with(spec, config, predicates, MergeOptions::default())
}

/// Merge `config` into `spec`.
///
/// * A scalar configuration value `v` stands for `{"=": v}`. Value slots
///   already set in the spec cannot be changed.
/// * `:`-keys override freely. They stay where they are declared; the
///   scheduler resolves them for descendants when constructing.
/// * A predicate key merges its parameters into the predicate's parameters,
///   which are validated again.
/// * Any other key addresses the child of that name. If there is none, the
///   first template (`*`, `?regex`, ...) matching the key is instantiated as
///   a new child.
pub fn doc_spec_config_with(
    spec: &Spec,
    config: &Value,
    predicates: &PredicateRegistry,
    options: MergeOptions,
) -> Result<Spec> {
    let mut path = Path::root();
    let merged = merge_node(spec.as_value(), config, &mut path, predicates, options)?;
    Ok(Spec::from_compiled(merged))
}

fn merge_node(
    spec: &Value,
    config: &Value,
    path: &mut Path,
    predicates: &PredicateRegistry,
    options: MergeOptions,
) -> Result<Value> {
    let config_fields = match config {
        Value::Null | Value::Undefined => return Ok(spec.clone()),
        Value::Object(fields) => fields.clone(),
        _ => {
            let mut f = BTreeMap::new();
            f.insert(Rc::from(key::VALUE), config.clone());
            Rc::new(f)
        }
    };
    let spec_fields = spec
        .as_object()
        .map_err(|_| Error::invalid_spec(path.clone(), format!("spec node must be an object, got `{spec}`")))?;

    let mut node = spec_fields.clone();
    for (key, cv) in config_fields.iter() {
        match KeyKind::of(key) {
            KeyKind::Value => {
                if let Some(sv) = node.get(key) {
                    if sv != cv {
                        return Err(Error::Conflict {
                            path: path.child(key.clone()),
                            left: sv.clone(),
                            right: cv.clone(),
                        });
                    }
                }
                node.insert(key.clone(), cv.clone());
            }
            KeyKind::Inherited => {
                node.insert(key.clone(), cv.clone());
            }
            KeyKind::Predicate => {
                let Some(params) = node.get(key) else {
                    return Err(Error::invalid_spec(
                        path.clone(),
                        format!("predicate `{key}` is not declared on this node"),
                    ));
                };
                if cv.is_null() {
                    continue;
                }
                if !cv.is_object() {
                    return Err(Error::invalid_spec(
                        path.clone(),
                        format!("parameters of `{key}` must be an object, got `{cv}`"),
                    ));
                }
                let merged = tree::merge(params, cv, tree::conflict)
                    .map_err(|e| e.at(&path.child(key.clone())))?;
                if let Some(schema) = predicates.get(key) {
                    schema.validate(path, &merged)?;
                }
                node.insert(key.clone(), merged);
            }
            KeyKind::Template | KeyKind::Child => {
                let target = match node.get(key) {
                    Some(child) if KeyKind::of(key) == KeyKind::Child => Some(child.clone()),
                    _ => find_template(&node, key)?,
                };
                match target {
                    Some(child_spec) => {
                        path.push(key.clone());
                        let child = merge_node(&child_spec, cv, path, predicates, options);
                        path.pop();
                        node.insert(key.clone(), child?);
                    }
                    None if options.strict => {
                        return Err(Error::invalid_spec(
                            path.clone(),
                            format!("unexpected configuration key `{key}`"),
                        ));
                    }
                    None => {
                        warn!("dropping configuration key `{key}` at {path}");
                    }
                }
            }
        }
    }
    Ok(Value::from(node))
}

fn find_template(node: &BTreeMap<Rc<str>, Value>, key: &str) -> Result<Option<Value>> {
    for (tkey, tspec) in node.iter() {
        if KeyKind::of(tkey) != KeyKind::Template {
            continue;
        }
        if parse_pattern(tkey)?.matches(key) {
            trace!("expanding template `{tkey}` as `{key}`");
            return Ok(Some(tspec.clone()));
        }
    }
    Ok(None)
}
