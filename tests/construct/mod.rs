// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::env;

use anyhow::{bail, Result};
use docspec::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    spec: Value,
    config: Option<Value>,
    context: Option<Value>,
    // Extra parameterless predicates without constructor.
    markers: Option<Vec<String>>,
    strict: Option<bool>,
    want_result: Option<Value>,
    want_spec: Option<Value>,
    error: Option<String>,
    error_path: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn display_values(c: &Value, e: &Value) -> Result<String> {
    Ok(format!(
        "\nleft  = {}\nright = {}\n",
        serde_json::to_string_pretty(c)?,
        serde_json::to_string_pretty(e)?
    ))
}

// Reports the innermost mismatching sub-value.
fn match_values(computed: &Value, expected: &Value, path: &Path) -> Result<()> {
    match (computed, expected) {
        (Value::Object(o1), Value::Object(o2)) => {
            for (k, v2) in o2.iter() {
                match o1.get(k) {
                    Some(v1) => match_values(v1, v2, &path.child(k.clone()))?,
                    None => bail!("missing key `{k}` at {path}{}", display_values(computed, expected)?),
                }
            }
            if let Some(k) = o1.keys().find(|k| !o2.contains_key(*k)) {
                bail!("unexpected key `{k}` at {path}{}", display_values(computed, expected)?);
            }
            Ok(())
        }
        _ if computed == expected => Ok(()),
        _ => bail!("value mismatch at {path}{}", display_values(computed, expected)?),
    }
}

fn engine_for(case: &TestCase) -> Result<Engine> {
    let mut engine = Engine::new();
    for marker in case.markers.iter().flatten() {
        engine.add_predicate(marker, PredicateSchema::new())?;
    }
    if let Some(strict) = case.strict {
        engine.set_strict_config(strict);
    }
    if let Some(context) = &case.context {
        engine.set_context(context.clone());
    }
    Ok(engine)
}

fn run_case(case: &TestCase) -> Result<()> {
    let engine = engine_for(case)?;
    let config = case.config.clone().unwrap_or(Value::Null);

    let outcome = engine.compile(&case.spec).and_then(|spec| {
        if let Some(want_spec) = &case.want_spec {
            let merged = engine.merge_config(&spec, &config)?;
            if let Err(e) = match_values(merged.as_value(), want_spec, &Path::root()) {
                return Err(Error::Other(e));
            }
        }
        engine.construct(&spec, &config)
    });

    match (outcome, &case.want_result, &case.error) {
        (Ok(instance), Some(want), None) => match_values(&instance, want, &Path::root()),
        (Ok(_), None, _) if case.want_spec.is_some() && case.error.is_none() => Ok(()),
        (Ok(instance), _, _) => bail!("construction succeeded with {instance}"),
        (Err(actual), _, Some(expected)) => {
            let message = actual.to_string();
            if !message.contains(expected.as_str()) {
                bail!("Error message\n`{message}\n`\ndoes not contain `{expected}`");
            }
            if let Some(want_path) = &case.error_path {
                match actual.path() {
                    Some(p) if *p == Path::from(want_path) => (),
                    p => bail!("error at {p:?}, expected at {want_path}"),
                }
            }
            Ok(())
        }
        (Err(actual), _, None) => Err(actual.into()),
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    // RUST_LOG=docspec=trace shows each scheduling round.
    let _ = env_logger::builder().is_test(true).try_init();

    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.want_spec, &case.error) {
            (Some(_), _, None) | (None, Some(_), None) | (None, _, Some(_)) => (),
            _ => panic!("either want_result, want_spec or error must be specified in test case."),
        }

        run_case(&case)?;
        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test]
fn yaml_test_basic() -> Result<()> {
    yaml_test("tests/construct/cases/basic.yaml")
}

#[test]
#[ignore = "intended for running a single yaml file given on the command line"]
fn one_yaml() -> Result<()> {
    let mut file = String::default();
    for a in env::args() {
        if a.ends_with(".yaml") {
            file = a;
        }
    }

    if file.is_empty() {
        bail!("missing <yaml-file>");
    }

    yaml_test(file.as_str())
}

#[test_resources("tests/construct/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
