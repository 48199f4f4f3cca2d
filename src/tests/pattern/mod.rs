// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::pattern::*;
use crate::value::Value;
use crate::{Error, Path};

use anyhow::{bail, Result};

fn levels(spec: &[&[&str]]) -> Result<Vec<Vec<SegmentPattern>>> {
    let mut v = vec![];
    for level in spec {
        v.push(
            level
                .iter()
                .map(|s| parse_pattern(s))
                .collect::<Result<Vec<_>, _>>()?,
        );
    }
    Ok(v)
}

#[test]
fn symmetric_equality() -> Result<()> {
    let any = parse_pattern("*")?;
    assert!(any == "anything");
    assert!("anything" == any);

    let prefix = parse_pattern("_foo")?;
    assert!(prefix == "foobar");
    assert!(prefix != "barfoo");
    assert!("barfoo" != prefix);

    let regex = parse_pattern("?[a-z]+_id")?;
    assert!(regex == "user_id");
    // Anchored at both ends.
    assert!(regex != "user_id2");

    let not_internal = parse_pattern("!_internal")?;
    assert!(not_internal == "name");
    assert!(not_internal != "internal_state");

    let both = parse_pattern("&_a,?.*z")?;
    assert!(both == "abcz");
    assert!(both != "abc");

    let either = parse_pattern("|x,y")?;
    assert!(either == "y");
    assert!(either != "z");
    Ok(())
}

#[test]
fn prefix_versus_regex_is_unsupported() -> Result<()> {
    let prefix = parse_pattern("_foo")?;
    let regex = parse_pattern("?foo.*")?;
    assert!(matches!(
        prefix.overlaps(&regex),
        Err(PatternError::Unsupported { .. })
    ));
    assert!(matches!(
        regex.overlaps(&prefix),
        Err(PatternError::Unsupported { .. })
    ));

    assert!(prefix.overlaps(&parse_pattern("_fo")?)?);
    assert!(!prefix.overlaps(&parse_pattern("_bar")?)?);
    assert!(prefix.overlaps(&parse_pattern("foobar")?)?);
    assert!(parse_pattern("*")?.overlaps(&regex)?);
    Ok(())
}

#[test]
fn match_levels_literal() -> Result<()> {
    let rules = Value::from_json_str(r#"{"a": {"b": 1}}"#)?;
    let lv = levels(&[&["a"], &["b"]])?;
    let found: Vec<_> = match_levels(&rules, &lv, &Levels::None).collect();
    assert_eq!(found, vec![(Path::from(["a", "b"]), &Value::from(1))]);
    Ok(())
}

#[test]
fn match_levels_expansion() -> Result<()> {
    let rules = Value::from_json_str(r#"{"x": {"v": 1}, "y": {"v": 2}, "z": {"w": 3}}"#)?;
    let lv = levels(&[&["*"], &["v"]])?;

    // Without expansion both matches report the same path; the first wins.
    let folded: Vec<_> = match_levels(&rules, &lv, &Levels::None).collect();
    assert_eq!(folded, vec![(Path::from(["*", "v"]), &Value::from(1))]);

    let expanded: Vec<_> = match_levels(&rules, &lv, &Levels::All).collect();
    assert_eq!(
        expanded,
        vec![
            (Path::from("x/v"), &Value::from(1)),
            (Path::from("y/v"), &Value::from(2)),
        ]
    );

    let only_first = Levels::Only([0].into_iter().collect());
    assert_eq!(match_levels(&rules, &lv, &only_first).count(), 2);
    Ok(())
}

#[test]
fn match_tree_any_of() -> Result<()> {
    let patterns = Value::from_json_str(r#"{"name": {}, "?[a-z]+_id": {}, "opts": {"depth": {}}}"#)?;
    let rules = Value::from_json_str(r#"{"user_id": 3, "opts": {"depth": 2}}"#)?;
    let options = MatchOptions {
        aggregators: vec![Aggregator::AnyOf],
        expand: Levels::All,
        automerge: false,
    };
    let outcome = match_tree(&patterns, &rules, &options)?;
    assert!(outcome.is_match());
    assert_eq!(outcome.matched, rules);

    let rules = Value::from_json_str(r#"{"opts": {"width": 2}}"#)?;
    let outcome = match_tree(&patterns, &rules, &options)?;
    assert!(!outcome.is_match());
    assert_eq!(outcome.unmatched, vec![Path::from("opts/width")]);
    assert_eq!(outcome.matched, Value::new_object());
    Ok(())
}

#[test]
fn match_tree_all_of_reports_missing() -> Result<()> {
    let patterns = Value::from_json_str(r#"{"a": {}, "b": {}}"#)?;
    let rules = Value::from_json_str(r#"{"a": 1}"#)?;
    let options = MatchOptions {
        aggregators: vec![Aggregator::AllOf],
        ..Default::default()
    };
    let outcome = match_tree(&patterns, &rules, &options)?;
    assert_eq!(outcome.missing, vec![Path::from("b")]);
    assert!(outcome.unmatched.is_empty());
    assert_eq!(outcome.matched, Value::new_object());
    Ok(())
}

#[test]
fn match_tree_automerge() -> Result<()> {
    let patterns = Value::from_json_str(r#"{"_x-": {}}"#)?;
    let rules = Value::from_json_str(r#"{"x-a": {"p": 1}, "x-b": {"q": 2}}"#)?;

    let options = MatchOptions {
        automerge: true,
        ..Default::default()
    };
    let outcome = match_tree(&patterns, &rules, &options)?;
    assert_eq!(
        outcome.matched,
        Value::from_json_str(r#"{"_x-": {"p": 1, "q": 2}}"#)?
    );

    let options = MatchOptions::default();
    match match_tree(&patterns, &rules, &options) {
        Err(Error::Conflict { path, .. }) => assert_eq!(path, Path::from("_x-")),
        r => bail!("expected a conflict, got {r:?}"),
    }
    Ok(())
}
