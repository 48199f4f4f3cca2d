// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_int_param, ensure_integer};
use crate::builtins::Builtin;
use crate::registry::PredicateSchema;
use crate::scheduler::{Context, Outcome, Phase};
use crate::value::Value;
use crate::Result;

use std::collections::BTreeMap;

pub fn register(m: &mut BTreeMap<&'static str, Builtin>) {
    m.insert(
        ".integer",
        Builtin {
            schema: || PredicateSchema::new().param("min").param("max"),
            phase: Phase::Distributing,
            fcn: integer,
        },
    );
}

fn integer(ctx: &Context<'_>) -> Result<Outcome> {
    let Some(v) = ctx.value() else {
        return Ok(Outcome::Skip);
    };
    let i = ensure_integer(ctx, v)?;

    if let Some(min) = ensure_int_param(ctx, "min")? {
        if i < min {
            return Err(ctx.invalid(v, format!("must be at least {min}")));
        }
    }
    if let Some(max) = ensure_int_param(ctx, "max")? {
        if i > max {
            return Err(ctx.invalid(v, format!("must be at most {max}")));
        }
    }
    Ok(Outcome::Done(ctx.with_value(Value::from(i))?))
}
