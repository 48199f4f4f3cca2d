// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_int_param, ensure_string_param};
use crate::builtins::Builtin;
use crate::error::Error;
use crate::registry::PredicateSchema;
use crate::scheduler::{Context, Outcome, Phase};
use crate::value::Value;
use crate::Result;

use std::collections::BTreeMap;

use regex::Regex;

pub fn register(m: &mut BTreeMap<&'static str, Builtin>) {
    m.insert(
        ".string",
        Builtin {
            schema: || {
                PredicateSchema::new()
                    .param("min_length")
                    .param("max_length")
                    .param("pattern")
            },
            phase: Phase::Distributing,
            fcn: string,
        },
    );
}

fn string(ctx: &Context<'_>) -> Result<Outcome> {
    let Some(v) = ctx.value() else {
        return Ok(Outcome::Skip);
    };
    let s = match v {
        Value::String(s) => s,
        _ => return Err(ctx.invalid(v, "expected a string")),
    };

    // Lengths count characters, not bytes.
    let len = s.chars().count() as i64;
    if let Some(min) = ensure_int_param(ctx, "min_length")? {
        if len < min {
            return Err(ctx.invalid(v, format!("must be at least {min} characters long")));
        }
    }
    if let Some(max) = ensure_int_param(ctx, "max_length")? {
        if len > max {
            return Err(ctx.invalid(v, format!("must be at most {max} characters long")));
        }
    }

    if let Some(pattern) = ensure_string_param(ctx, "pattern")? {
        let re = Regex::new(pattern).map_err(|e| {
            Error::invalid_spec(ctx.path(), format!("invalid pattern `{pattern}`: {e}"))
        })?;
        if !re.is_match(s) {
            return Err(ctx.invalid(v, format!("does not match `{pattern}`")));
        }
    }
    Ok(Outcome::Done(ctx.instance().clone()))
}
