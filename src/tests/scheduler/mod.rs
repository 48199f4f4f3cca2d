// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::compile::{compile_spec, Spec};
use crate::registry::*;
use crate::scheduler::*;
use crate::value::Value;
use crate::{Error, Path};

use anyhow::{bail, Result};

fn declare(names: &[&str]) -> Result<(PredicateRegistry, ConstructorRegistry)> {
    let mut preds = Registry::new("test predicates");
    for name in names {
        register_predicate(&mut preds, name, PredicateSchema::new())?;
    }
    Ok((preds, Registry::new("test constructors")))
}

fn spec(json: &str, preds: &PredicateRegistry) -> Result<Spec> {
    Ok(compile_spec(&Value::from_json_str(json)?, preds)?)
}

fn run(spec: &Spec, preds: &PredicateRegistry, ctors: &ConstructorRegistry) -> crate::Result<Value> {
    Scheduler::new(preds, ctors).run(spec)
}

// Sets `key` to `value` unconditionally.
fn setter(key: &'static str, value: i64) -> impl Fn(&Context<'_>) -> crate::Result<Outcome> + Send + Sync {
    move |ctx: &Context<'_>| Ok(Outcome::Done(ctx.with(key, Value::from(value))?))
}

#[test]
fn deferred_dependency_completes_in_two_rounds() -> Result<()> {
    // .beta is registered first, so it is tried first and has to wait.
    let (preds, mut ctors) = declare(&[".beta", ".alpha"])?;
    register_constructor(&mut ctors, ".alpha", Phase::Distributing, |ctx| {
        Ok(Outcome::Done(ctx.with("alpha", Value::from("a"))?))
    })?;
    register_constructor(&mut ctors, ".beta", Phase::Distributing, |ctx| {
        if !ctx.is_constructed(".alpha") {
            return Ok(Outcome::Defer);
        }
        let alpha = ctx.instance()["alpha"].clone();
        let beta = Value::from("b");
        let mut instance = ctx.with("beta", beta.clone())?;
        instance.insert("gamma", Value::from(vec![alpha, beta]))?;
        instance.insert("round", Value::from(ctx.round()))?;
        Ok(Outcome::Done(instance))
    })?;

    let s = spec(r#"{".alpha": {}, ".beta": {}}"#, &preds)?;
    let instance = run(&s, &preds, &ctors)?;
    assert_eq!(
        instance,
        Value::from_json_str(r#"{"alpha": "a", "beta": "b", "gamma": ["a", "b"], "round": 1}"#)?
    );
    Ok(())
}

#[test]
fn mutual_dependency_deadlocks() -> Result<()> {
    let (preds, mut ctors) = declare(&[".alpha", ".beta"])?;
    register_constructor(
        &mut ctors,
        ".alpha",
        Phase::Distributing,
        after(&[".beta"], Missing::Require, setter("alpha", 1)),
    )?;
    register_constructor(
        &mut ctors,
        ".beta",
        Phase::Distributing,
        after(&[".alpha"], Missing::Require, setter("beta", 2)),
    )?;

    let s = spec(r#"{"node": {".alpha": {}, ".beta": {}}}"#, &preds)?;
    match run(&s, &preds, &ctors) {
        Err(Error::Deadlock {
            path,
            round,
            pending,
        }) => {
            assert_eq!(path, Path::from("node"));
            assert_eq!(round, 0);
            assert_eq!(pending.len(), 2);
        }
        r => bail!("expected a deadlock, got {r:?}"),
    }
    Ok(())
}

#[test]
fn after_chain_follows_dependencies() -> Result<()> {
    let (preds, mut ctors) = declare(&[".c", ".b", ".a"])?;
    for (name, deps) in [(".a", &[][..]), (".b", &[".a"][..]), (".c", &[".b"][..])] {
        register_constructor(
            &mut ctors,
            name,
            Phase::Distributing,
            after(deps, Missing::Require, move |ctx| {
                let mut order = match ctx.instance().get("order") {
                    Some(Value::Array(items)) => items.as_ref().clone(),
                    _ => vec![],
                };
                order.push(Value::from(ctx.predicate()));
                Ok(Outcome::Done(ctx.with("order", Value::from(order))?))
            }),
        )?;
    }

    let s = spec(r#"{".a": {}, ".b": {}, ".c": {}}"#, &preds)?;
    let instance = run(&s, &preds, &ctors)?;
    assert_eq!(
        instance["order"],
        Value::from_json_str(r#"[".a", ".b", ".c"]"#)?
    );
    Ok(())
}

fn skipping_dependency(missing: Missing) -> Result<crate::Result<Value>> {
    let (preds, mut ctors) = declare(&[".skipped", ".dependent"])?;
    register_constructor(&mut ctors, ".skipped", Phase::Distributing, |_| {
        Ok(Outcome::Skip)
    })?;
    register_constructor(
        &mut ctors,
        ".dependent",
        Phase::Distributing,
        after(&[".skipped"], missing, setter("ran", 1)),
    )?;
    let s = spec(r#"{".skipped": {}, ".dependent": {}}"#, &preds)?;
    Ok(run(&s, &preds, &ctors))
}

#[test]
fn skipped_dependency() -> Result<()> {
    let instance = skipping_dependency(Missing::Ignore)??;
    assert_eq!(instance["ran"], Value::from(1));

    assert!(matches!(
        skipping_dependency(Missing::Require)?,
        Err(Error::InvalidSpec { .. })
    ));
    Ok(())
}

#[test]
fn absent_dependency() -> Result<()> {
    let (preds, mut ctors) = declare(&[".lonely", ".strict"])?;
    register_constructor(
        &mut ctors,
        ".lonely",
        Phase::Distributing,
        after(&[".elsewhere"], Missing::Ignore, setter("lonely", 1)),
    )?;
    register_constructor(
        &mut ctors,
        ".strict",
        Phase::Distributing,
        after(&[".elsewhere"], Missing::Require, setter("strict", 1)),
    )?;

    let s = spec(r#"{".lonely": {}}"#, &preds)?;
    assert_eq!(run(&s, &preds, &ctors)?["lonely"], Value::from(1));

    let s = spec(r#"{"x": {".strict": {}}}"#, &preds)?;
    match run(&s, &preds, &ctors) {
        Err(Error::InvalidSpec { path, .. }) => assert_eq!(path, Path::from("x")),
        r => bail!("expected invalid spec, got {r:?}"),
    }
    Ok(())
}

fn cross_phase_dependency(missing: Missing) -> Result<crate::Result<Value>> {
    let (preds, mut ctors) = declare(&[".early", ".late"])?;
    register_constructor(
        &mut ctors,
        ".early",
        Phase::Distributing,
        after(&[".late"], missing, setter("early", 1)),
    )?;
    register_constructor(&mut ctors, ".late", Phase::Collecting, setter("late", 2))?;
    let s = spec(r#"{"n": {".early": {}, ".late": {}}}"#, &preds)?;
    Ok(run(&s, &preds, &ctors))
}

#[test]
fn dependency_in_later_phase() -> Result<()> {
    let instance = cross_phase_dependency(Missing::Ignore)??;
    assert_eq!(instance["n"]["early"], Value::from(1));
    assert_eq!(instance["n"]["late"], Value::from(2));

    match cross_phase_dependency(Missing::Require)? {
        Err(e @ Error::InvalidSpec { .. }) => {
            assert_eq!(e.path(), Some(&Path::from("n")));
            assert!(e.to_string().contains("later phase"));
        }
        r => bail!("expected invalid spec, got {r:?}"),
    }
    Ok(())
}

#[test]
fn inherited_keys_resolve_without_merge() -> Result<()> {
    let (preds, mut ctors) = declare(&[".read"])?;
    register_constructor(&mut ctors, ".read", Phase::Distributing, |ctx| {
        let ro = ctx.inherited("ro").cloned().unwrap_or(Value::Null);
        Ok(Outcome::Done(ctx.with("ro", ro)?))
    })?;

    let s = spec(
        r#"{":ro": true, ".read": {}, "a": {":ro": false, "b": {".read": {}}}, "c": {"*": {}, "d": {".read": {}}}}"#,
        &preds,
    )?;
    let instance = run(&s, &preds, &ctors)?;
    assert_eq!(instance["ro"], Value::from(true));
    assert_eq!(instance["a"]["b"]["ro"], Value::from(false));
    assert_eq!(instance["c"]["d"]["ro"], Value::from(true));
    assert_eq!(instance["c"]["d"].get(":ro"), None);
    Ok(())
}

#[test]
fn finalizer_runs_last() -> Result<()> {
    // The finalizer is registered first and would otherwise run first.
    let (preds, mut ctors) = declare(&[".final", ".one", ".two"])?;
    register_constructor(
        &mut ctors,
        ".final",
        Phase::Distributing,
        after_all(|ctx| {
            let sum = ctx.instance()["one"].as_i64()? + ctx.instance()["two"].as_i64()?;
            Ok(Outcome::Done(ctx.with("sum", Value::from(sum))?))
        }),
    )?;
    register_constructor(&mut ctors, ".one", Phase::Distributing, setter("one", 1))?;
    register_constructor(&mut ctors, ".two", Phase::Distributing, setter("two", 2))?;

    let s = spec(r#"{".final": {}, ".one": {}, ".two": {}}"#, &preds)?;
    assert_eq!(run(&s, &preds, &ctors)?["sum"], Value::from(3));
    Ok(())
}

#[test]
fn phases_bracket_children() -> Result<()> {
    let (preds, mut ctors) = declare(&[".push", ".count", ".leaf"])?;
    register_constructor(&mut ctors, ".push", Phase::Distributing, setter("pushed", 7))?;
    register_constructor(&mut ctors, ".leaf", Phase::Distributing, |ctx| {
        let pushed = match ctx.parent_instance() {
            Some(parent) => parent["pushed"].clone(),
            None => Value::Null,
        };
        Ok(Outcome::Done(ctx.with_value(pushed)?))
    })?;
    register_constructor(&mut ctors, ".count", Phase::Collecting, |ctx| {
        let leaves = ctx
            .instance()
            .as_object()?
            .values()
            .filter(|v| v["="] == Value::from(7))
            .count();
        Ok(Outcome::Done(ctx.with("leaves", Value::from(leaves))?))
    })?;

    let s = spec(
        r#"{".push": {}, ".count": {}, "a": [".leaf"], "b": [".leaf"]}"#,
        &preds,
    )?;
    let instance = run(&s, &preds, &ctors)?;
    assert_eq!(
        instance,
        Value::from_json_str(r#"{"pushed": 7, "leaves": 2, "a": {"=": 7}, "b": {"=": 7}}"#)?
    );
    Ok(())
}

#[test]
fn markers_and_defaults() -> Result<()> {
    let (preds, mut ctors) = declare(&[".marker", ".check"])?;
    register_constructor(
        &mut ctors,
        ".check",
        Phase::Distributing,
        after(&[".marker"], Missing::Require, |ctx| {
            Ok(Outcome::Done(ctx.instance().clone()))
        }),
    )?;

    let s = spec(
        r#"{"a": {".marker": {}, ".check": {}, "=d": 5}, "b": {"=d": 5, "=": 6}}"#,
        &preds,
    )?;
    assert_eq!(
        run(&s, &preds, &ctors)?,
        Value::from_json_str(r#"{"a": {"=": 5}, "b": {"=": 6}}"#)?
    );
    Ok(())
}

#[test]
fn errors_carry_node_path() -> Result<()> {
    let (preds, mut ctors) = declare(&[".fail", ".bad"])?;
    register_constructor(&mut ctors, ".fail", Phase::Distributing, |_| {
        Err(anyhow::anyhow!("boom").into())
    })?;
    register_constructor(&mut ctors, ".bad", Phase::Distributing, |_| {
        Ok(Outcome::Done(Value::from(1)))
    })?;

    let s = spec(r#"{"a": {"b": [".fail"]}}"#, &preds)?;
    match run(&s, &preds, &ctors) {
        Err(Error::Constructor {
            path, predicate, ..
        }) => {
            assert_eq!(path, Path::from("a/b"));
            assert_eq!(predicate.as_ref(), ".fail");
        }
        r => bail!("expected constructor error, got {r:?}"),
    }

    let s = spec(r#"{"x": [".bad"]}"#, &preds)?;
    assert!(matches!(
        run(&s, &preds, &ctors),
        Err(Error::NotAnObject { .. })
    ));
    Ok(())
}

#[test]
fn context_exposes_node() -> Result<()> {
    let (preds, mut ctors) = declare(&[".inspect"])?;
    register_constructor(&mut ctors, ".inspect", Phase::Distributing, |ctx| {
        let report = Value::from_json_str(&format!(
            r#"{{"name": "{}", "path": "{}", "locals": {}, "ctx": {}, "top": {}}}"#,
            ctx.name().unwrap_or(""),
            ctx.path(),
            ctx.local_predicates().len(),
            ctx.context(),
            ctx.top_spec().get("field").is_some(),
        ))?;
        Ok(Outcome::Done(ctx.with("report", report)?))
    })?;

    let s = spec(r#"{"field": [".inspect"]}"#, &preds)?;
    let context = Value::from("request");
    let instance = Scheduler::new(&preds, &ctors)
        .with_context(&context)
        .run(&s)?;
    assert_eq!(
        instance["field"]["report"],
        Value::from_json_str(
            r#"{"name": "field", "path": "/field", "locals": 1, "ctx": "request", "top": true}"#
        )?
    );
    Ok(())
}

#[test]
fn deterministic() -> Result<()> {
    let (preds, mut ctors) = declare(&[".z", ".y"])?;
    register_constructor(&mut ctors, ".z", Phase::Distributing, |ctx| {
        let n = ctx.instance().as_object()?.len();
        Ok(Outcome::Done(ctx.with("z", Value::from(n))?))
    })?;
    register_constructor(&mut ctors, ".y", Phase::Distributing, |ctx| {
        let n = ctx.instance().as_object()?.len();
        Ok(Outcome::Done(ctx.with("y", Value::from(n))?))
    })?;

    let s = spec(r#"{"k": {".y": {}, ".z": {}}, "j": [".z"], "i": [".y", ".z"]}"#, &preds)?;
    let first = run(&s, &preds, &ctors)?;
    for _ in 0..5 {
        assert_eq!(run(&s, &preds, &ctors)?.to_json_str()?, first.to_json_str()?);
    }
    // Registration order decides: .z runs before .y.
    assert_eq!(first["k"]["z"], Value::from(0));
    assert_eq!(first["k"]["y"], Value::from(1));
    Ok(())
}
