// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::Builtin;
use crate::registry::PredicateSchema;
use crate::scheduler::{Context, Outcome, Phase};
use crate::value::Value;
use crate::Result;

use std::collections::BTreeMap;

pub fn register(m: &mut BTreeMap<&'static str, Builtin>) {
    m.insert(
        ".boolean",
        Builtin {
            schema: PredicateSchema::new,
            phase: Phase::Distributing,
            fcn: boolean,
        },
    );
    m.insert(
        ".required",
        Builtin {
            schema: PredicateSchema::new,
            phase: Phase::Distributing,
            fcn: required,
        },
    );
}

fn boolean(ctx: &Context<'_>) -> Result<Outcome> {
    let Some(v) = ctx.value() else {
        return Ok(Outcome::Skip);
    };
    let b = match v {
        Value::Bool(b) => *b,
        Value::String(s) if s.as_ref() == "true" => true,
        Value::String(s) if s.as_ref() == "false" => false,
        _ => return Err(ctx.invalid(v, "expected a boolean")),
    };
    Ok(Outcome::Done(ctx.with_value(Value::from(b))?))
}

fn required(ctx: &Context<'_>) -> Result<Outcome> {
    match ctx.value() {
        Some(_) => Ok(Outcome::Done(ctx.instance().clone())),
        None => Err(ctx.invalid(&Value::Null, "a value is required")),
    }
}
