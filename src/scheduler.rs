// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-round construction of instance documents.
//!
//! Every node of a compiled and configured spec is constructed depth first in
//! document order. At a node, the constructors of its predicates are invoked
//! in rounds: a constructor either completes (returning the node's new
//! instance), defers to a later round because a sibling predicate it depends
//! on has not completed yet, or skips because it does not apply. A round in
//! which no predicate completes or skips is a deadlock.
//!
//! Constructors run in one of two phases. [`Phase::Distributing`] constructors
//! run before the node's children are constructed, [`Phase::Collecting`]
//! constructors after, when the children's instances are part of the node's
//! instance.

use crate::compile::Spec;
use crate::error::{Error, Result};
use crate::key::{self, KeyKind};
use crate::path::Path;
use crate::registry::{ConstructorRegistry, PredicateRegistry};
use crate::value::Value;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

/// Result of one constructor invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The predicate is constructed; the value replaces the node's instance.
    Done(Value),
    /// Retry in the next round.
    Defer,
    /// The predicate does not apply to this node.
    Skip,
}

/// When a constructor runs relative to the node's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    #[default]
    Distributing,
    Collecting,
}

/// How [`after`] treats a dependency that cannot complete before its dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Do not wait for it.
    Ignore,
    /// The dependency must be constructed; otherwise the spec is invalid.
    Require,
}

pub trait Constructor: Send + Sync {
    fn construct(&self, ctx: &Context<'_>) -> Result<Outcome>;
}

impl<F> Constructor for F
where
    F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync,
{
    fn construct(&self, ctx: &Context<'_>) -> Result<Outcome> {
        self(ctx)
    }
}

/// Everything a constructor may look at.
///
/// Constructors never mutate a document in place: they return the new
/// instance of their node through [`Outcome::Done`].
pub struct Context<'a> {
    predicate: &'a str,
    instance: &'a Value,
    spec: &'a Value,
    params: &'a Value,
    path: &'a Path,
    top_spec: &'a Value,
    parent_spec: Option<&'a Value>,
    parent_instance: Option<&'a Value>,
    round: usize,
    phase: Phase,
    local_predicates: &'a [Rc<str>],
    constructed: &'a BTreeSet<Rc<str>>,
    skipped: &'a BTreeSet<Rc<str>>,
    pending: &'a [Rc<str>],
    inherited: &'a BTreeMap<Rc<str>, Value>,
    context: &'a Value,
}

impl<'a> Context<'a> {
    /// Name of the predicate being constructed.
    pub fn predicate(&self) -> &'a str {
        self.predicate
    }

    /// The node's instance as built so far.
    pub fn instance(&self) -> &'a Value {
        self.instance
    }

    /// The node's configured spec.
    pub fn spec(&self) -> &'a Value {
        self.spec
    }

    /// Parameters given to the predicate in the spec.
    pub fn params(&self) -> &'a Value {
        self.params
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Name of the node inside its parent; `None` at the root.
    pub fn name(&self) -> Option<&'a str> {
        self.path.name()
    }

    /// Root of the configured spec.
    pub fn top_spec(&self) -> &'a Value {
        self.top_spec
    }

    pub fn parent_spec(&self) -> Option<&'a Value> {
        self.parent_spec
    }

    /// Instance of the parent as it stood after its distributing phase.
    pub fn parent_instance(&self) -> Option<&'a Value> {
        self.parent_instance
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// All predicates of the node, in construction order.
    pub fn local_predicates(&self) -> &'a [Rc<str>] {
        self.local_predicates
    }

    pub fn constructed(&self) -> &'a BTreeSet<Rc<str>> {
        self.constructed
    }

    pub fn skipped(&self) -> &'a BTreeSet<Rc<str>> {
        self.skipped
    }

    /// Predicates of the current phase that have neither completed nor skipped.
    pub fn pending(&self) -> &'a [Rc<str>] {
        self.pending
    }

    /// Caller supplied context.
    pub fn context(&self) -> &'a Value {
        self.context
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.local_predicates.iter().any(|p| p.as_ref() == name)
    }

    pub fn is_constructed(&self, name: &str) -> bool {
        self.constructed.contains(name)
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }

    /// The node's current value, if any.
    pub fn value(&self) -> Option<&'a Value> {
        match self.instance.get(key::VALUE) {
            None | Some(Value::Null) | Some(Value::Undefined) => None,
            v => v,
        }
    }

    /// Inherited configuration `key` (without its `:` sigil) in effect at
    /// this node: the node's own `:key` or that of its nearest ancestor.
    pub fn inherited(&self, key: &str) -> Option<&'a Value> {
        self.inherited.get(format!(":{key}").as_str())
    }

    /// Copy of the instance with its value slot set to `value`.
    pub fn with_value(&self, value: Value) -> Result<Value> {
        let mut instance = self.instance.clone();
        instance.insert(key::VALUE, value)?;
        Ok(instance)
    }

    /// Copy of the instance with `key` set to `value`.
    pub fn with(&self, key: &str, value: Value) -> Result<Value> {
        let mut instance = self.instance.clone();
        instance.insert(key, value)?;
        Ok(instance)
    }

    /// Validation error for `value` at this node.
    pub fn invalid(&self, value: &Value, message: impl Into<String>) -> Error {
        Error::Validation {
            path: self.path.clone(),
            value: value.clone(),
            message: message.into(),
        }
    }
}

// Gives closures the higher-ranked signature `Constructor` expects.
fn constructor_fn<F>(f: F) -> F
where
    F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
{
    f
}

/// Run `f` once each predicate in `deps` is constructed.
///
/// A dependency that cannot complete first, because it was skipped or is
/// absent from the current phase, is either ignored or makes the spec
/// invalid depending on `missing`.
pub fn after<F>(
    deps: &[&str],
    missing: Missing,
    f: F,
) -> impl Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static
where
    F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
{
    let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
    constructor_fn(move |ctx| {
        for dep in &deps {
            if ctx.is_constructed(dep) {
                continue;
            }
            let gone = if !ctx.has_predicate(dep) {
                "is not declared on the node"
            } else if ctx.is_skipped(dep) {
                "was skipped"
            } else if !ctx.pending().iter().any(|p| p.as_ref() == dep) {
                "runs in a later phase"
            } else {
                return Ok(Outcome::Defer);
            };
            if missing == Missing::Require {
                return Err(Error::invalid_spec(
                    ctx.path(),
                    format!("`{}` depends on `{dep}`, which {gone}", ctx.predicate()),
                ));
            }
        }
        f(ctx)
    })
}

/// Run `f` once every other predicate of the same phase has completed or skipped.
pub fn after_all<F>(f: F) -> impl Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static
where
    F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
{
    constructor_fn(move |ctx| {
        if ctx.pending().iter().any(|p| p.as_ref() != ctx.predicate()) {
            return Ok(Outcome::Defer);
        }
        f(ctx)
    })
}

// Per-node bookkeeping shared by both phases.
struct NodeState<'a> {
    path: &'a Path,
    inherited: &'a BTreeMap<Rc<str>, Value>,
    spec: &'a Value,
    parent_spec: Option<&'a Value>,
    parent_instance: Option<&'a Value>,
    predicates: Vec<Rc<str>>,
    instance: Value,
    constructed: BTreeSet<Rc<str>>,
    skipped: BTreeSet<Rc<str>>,
    round: usize,
}

/// Builds the instance of a configured spec.
pub struct Scheduler<'a> {
    predicates: &'a PredicateRegistry,
    constructors: &'a ConstructorRegistry,
    context: &'a Value,
}

impl<'a> Scheduler<'a> {
    pub fn new(predicates: &'a PredicateRegistry, constructors: &'a ConstructorRegistry) -> Self {
        Self {
            predicates,
            constructors,
            context: &Value::Null,
        }
    }

    /// Opaque value handed to every constructor.
    pub fn with_context(mut self, context: &'a Value) -> Self {
        self.context = context;
        self
    }

    /// Construct the instance of `spec`.
    ///
    /// `spec` is used as is: configuration is merged beforehand with
    /// [`crate::doc_spec_config`]. Inherited `:` keys are resolved here, so a
    /// spec straight from [`crate::compile_spec`] works too.
    pub fn run(&self, spec: &Spec) -> Result<Value> {
        let top = spec.as_value();
        let mut path = Path::root();
        debug!("construction started");
        let instance = self.construct_node(&mut path, top, top, None, None, &BTreeMap::new())?;
        debug!("construction finished");
        Ok(instance)
    }

    // Registration order, then name.
    fn ordered_predicates(&self, spec: &Value) -> Vec<Rc<str>> {
        let mut names: Vec<(usize, Rc<str>)> = match spec {
            Value::Object(fields) => fields
                .keys()
                .filter(|k| KeyKind::of(k) == KeyKind::Predicate)
                .map(|k| (self.predicates.sequence(k).unwrap_or(usize::MAX), k.clone()))
                .collect(),
            _ => vec![],
        };
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }

    fn phase_of(&self, predicate: &str) -> Phase {
        self.constructors
            .get(predicate)
            .map(|def| def.phase)
            .unwrap_or_default()
    }

    fn construct_node(
        &self,
        path: &mut Path,
        top: &Value,
        spec: &Value,
        parent_spec: Option<&Value>,
        parent_instance: Option<&Value>,
        inherited: &BTreeMap<Rc<str>, Value>,
    ) -> Result<Value> {
        let Value::Object(fields) = spec else {
            return Err(Error::invalid_spec(
                path.clone(),
                format!("spec node must be an object, got `{spec}`"),
            ));
        };

        let initial = fields
            .get(key::VALUE)
            .or_else(|| fields.get(key::DEFAULT))
            .cloned();
        let mut instance = Value::new_object();
        if let Some(v) = initial {
            instance.insert(key::VALUE, v)?;
        }

        let predicates = self.ordered_predicates(spec);
        let (distributing, collecting): (Vec<_>, Vec<_>) = predicates
            .iter()
            .cloned()
            .partition(|p| self.phase_of(p) == Phase::Distributing);

        // Local `:` keys shadow the ones from ancestors.
        let mut in_effect = inherited.clone();
        for (key, value) in fields.iter() {
            if KeyKind::of(key) == KeyKind::Inherited {
                in_effect.insert(key.clone(), value.clone());
            }
        }

        let node_path = path.clone();
        let mut node = NodeState {
            path: &node_path,
            inherited: &in_effect,
            spec,
            parent_spec,
            parent_instance,
            predicates,
            instance,
            constructed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            round: 0,
        };

        self.run_phase(&mut node, top, Phase::Distributing, distributing)?;

        let mut children = vec![];
        for (key, child_spec) in fields.iter() {
            if !KeyKind::of(key).is_structural() {
                continue;
            }
            path.push(key.clone());
            let child = self.construct_node(
                path,
                top,
                child_spec,
                Some(spec),
                Some(&node.instance),
                node.inherited,
            );
            path.pop();
            children.push((key.clone(), child?));
        }
        for (key, child) in children {
            node.instance.insert(key, child)?;
        }

        self.run_phase(&mut node, top, Phase::Collecting, collecting)?;
        Ok(node.instance)
    }

    fn run_phase(
        &self,
        node: &mut NodeState<'_>,
        top: &Value,
        phase: Phase,
        mut pending: Vec<Rc<str>>,
    ) -> Result<()> {
        while !pending.is_empty() {
            let snapshot = pending.clone();
            let mut progress = false;

            for name in snapshot {
                let outcome = match self.constructors.get(&name) {
                    // Marker predicate.
                    None => Outcome::Done(node.instance.clone()),
                    Some(def) => {
                        let ctx = Context {
                            predicate: &name,
                            instance: &node.instance,
                            spec: node.spec,
                            params: node.spec.get(&name).unwrap_or(&Value::Null),
                            path: node.path,
                            top_spec: top,
                            parent_spec: node.parent_spec,
                            parent_instance: node.parent_instance,
                            round: node.round,
                            phase,
                            local_predicates: &node.predicates,
                            constructed: &node.constructed,
                            skipped: &node.skipped,
                            pending: &pending,
                            inherited: node.inherited,
                            context: self.context,
                        };
                        def.fcn
                            .construct(&ctx)
                            .map_err(|e| locate_error(e, node.path, &name))?
                    }
                };

                trace!("{} {name} round {}: {outcome:?}", node.path, node.round);
                match outcome {
                    Outcome::Done(instance) => {
                        if !instance.is_object() {
                            return Err(Error::NotAnObject {
                                path: node.path.clone(),
                            });
                        }
                        node.instance = instance;
                        node.constructed.insert(name.clone());
                    }
                    Outcome::Skip => {
                        node.skipped.insert(name.clone());
                    }
                    Outcome::Defer => continue,
                }
                pending.retain(|p| *p != name);
                progress = true;
            }

            if !progress {
                debug!(
                    "no progress at {} in round {}; pending: {pending:?}",
                    node.path, node.round
                );
                return Err(Error::Deadlock {
                    path: node.path.clone(),
                    round: node.round,
                    pending,
                });
            }
            node.round += 1;
        }
        Ok(())
    }
}

fn locate_error(e: Error, path: &Path, predicate: &Rc<str>) -> Error {
    match e {
        Error::Other(source) => Error::Constructor {
            path: path.clone(),
            predicate: predicate.clone(),
            source,
        },
        e => e.at(path),
    }
}
