// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::compile::{compile_spec, Spec};
use crate::error::{Error, Result};
use crate::merge::{doc_spec_config_with, MergeOptions};
use crate::path::Path;
use crate::registry::{
    register_constructor, register_predicate, ConstructorRegistry, PredicateRegistry,
    PredicateSchema, Registry,
};
use crate::scheduler::{Context, Outcome, Phase, Scheduler};
use crate::value::Value;

use log::debug;

/// Merge `config` into `spec` and construct the instance.
pub fn construct(
    spec: &Spec,
    config: &Value,
    predicates: &PredicateRegistry,
    constructors: &ConstructorRegistry,
) -> Result<Value> {
    construct_with_context(spec, config, predicates, constructors, &Value::Null)
}

/// Like [`construct`], handing `context` to every constructor.
pub fn construct_with_context(
    spec: &Spec,
    config: &Value,
    predicates: &PredicateRegistry,
    constructors: &ConstructorRegistry,
    context: &Value,
) -> Result<Value> {
    let merged = doc_spec_config_with(spec, config, predicates, MergeOptions::default())?;
    Scheduler::new(predicates, constructors)
        .with_context(context)
        .run(&merged)
}

/// The construction engine.
///
/// Owns a predicate registry and a constructor registry, starting with the
/// builtin predicates unless created with [`Engine::empty`].
#[derive(Clone)]
pub struct Engine {
    predicates: PredicateRegistry,
    constructors: ConstructorRegistry,
    context: Value,
    strict_config: bool,
}

/// Create a default engine.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut engine = Self::empty();
        builtins::install(&mut engine.predicates, &mut engine.constructors);
        engine
    }

    /// Engine without any predicate.
    pub fn empty() -> Self {
        Self {
            predicates: Registry::new("PREDICATES"),
            constructors: Registry::new("CONSTRUCTORS"),
            context: Value::Null,
            strict_config: true,
        }
    }

    /// Declare predicate `name`.
    ///
    /// A predicate without a constructor is a marker: it is constructed as
    /// soon as it is visited.
    pub fn add_predicate(&mut self, name: &str, schema: PredicateSchema) -> Result<()> {
        register_predicate(&mut self.predicates, name, schema)?;
        Ok(())
    }

    /// Attach a constructor to the already declared predicate `name`.
    pub fn add_constructor<F>(&mut self, name: &str, phase: Phase, fcn: F) -> Result<()>
    where
        F: Fn(&Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        if !self.predicates.contains(name) {
            return Err(Error::invalid_spec(
                Path::root(),
                format!("constructor for undeclared predicate `{name}`"),
            ));
        }
        register_constructor(&mut self.constructors, name, phase, fcn)?;
        Ok(())
    }

    pub fn predicates(&self) -> &PredicateRegistry {
        &self.predicates
    }

    pub fn constructors(&self) -> &ConstructorRegistry {
        &self.constructors
    }

    /// Set the value handed to constructors as their context.
    pub fn set_context(&mut self, context: Value) {
        self.context = context;
    }

    /// Reject configuration keys the spec does not declare (the default).
    /// When disabled, such keys are ignored.
    pub fn set_strict_config(&mut self, b: bool) {
        self.strict_config = b;
    }

    pub fn compile(&self, raw: &Value) -> Result<Spec> {
        compile_spec(raw, &self.predicates)
    }

    /// Compile a spec stored as JSON, or as YAML if the file name ends in
    /// `.yaml`/`.yml`.
    pub fn compile_from_file(&self, path: &str) -> Result<Spec> {
        #[cfg(feature = "yaml")]
        if path.ends_with(".yaml") || path.ends_with(".yml") {
            return self.compile(&Value::from_yaml_file(path)?);
        }
        self.compile(&Value::from_json_file(path)?)
    }

    pub fn merge_config(&self, spec: &Spec, config: &Value) -> Result<Spec> {
        let options = MergeOptions {
            strict: self.strict_config,
        };
        doc_spec_config_with(spec, config, &self.predicates, options)
    }

    /// Merge `config` into `spec` and construct the instance.
    pub fn construct(&self, spec: &Spec, config: &Value) -> Result<Value> {
        self.construct_with_context(spec, config, &self.context)
    }

    pub fn construct_with_context(
        &self,
        spec: &Spec,
        config: &Value,
        context: &Value,
    ) -> Result<Value> {
        let merged = self.merge_config(spec, config)?;
        debug!("constructing {} predicates", self.predicates.len());
        Scheduler::new(&self.predicates, &self.constructors)
            .with_context(context)
            .run(&merged)
    }
}
