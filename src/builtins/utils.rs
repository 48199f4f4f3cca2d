// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result};
use crate::number::Number;
use crate::scheduler::Context;
use crate::value::Value;

/// Integer parameter `name` of the predicate, if given.
pub fn ensure_int_param(ctx: &Context<'_>, name: &str) -> Result<Option<i64>> {
    match ctx.params().get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) if n.as_i64().is_some() => Ok(n.as_i64()),
        Some(v) => Err(Error::invalid_spec(
            ctx.path(),
            format!("`{}` expects integer parameter `{name}`. Got `{v}` instead", ctx.predicate()),
        )),
    }
}

/// String parameter `name` of the predicate, if given.
pub fn ensure_string_param<'a>(ctx: &Context<'a>, name: &str) -> Result<Option<&'a str>> {
    match ctx.params().get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_ref())),
        Some(v) => Err(Error::invalid_spec(
            ctx.path(),
            format!("`{}` expects string parameter `{name}`. Got `{v}` instead", ctx.predicate()),
        )),
    }
}

/// Interpret `v` as an integer, accepting numeric strings.
pub fn ensure_integer(ctx: &Context<'_>, v: &Value) -> Result<i64> {
    let n = match v {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.parse::<Number>().ok(),
        _ => None,
    };
    match n.and_then(|n| n.as_i64()) {
        Some(i) => Ok(i),
        None => Err(ctx.invalid(v, "expected an integer")),
    }
}
