// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Segment patterns and multi-level matching of pattern documents against
//! rule documents.
//!
//! A pattern segment is a string whose first character selects the variant:
//!
//! | sigil | variant   | example        |
//! |-------|-----------|----------------|
//! | `*`   | `Any`     | `*`            |
//! | `?`   | `Regex`   | `?[a-z]+_id`   |
//! | `!`   | `Inverse` | `!_internal`   |
//! | `_`   | `Prefix`  | `_x-`          |
//! | `&`   | `And`     | `&_a,?.*z`     |
//! | `\|`  | `Or`      | `\|a,b`        |
//! | `=`   | `Literal` | `=*literal*`   |
//!
//! Anything else is a literal. Regexes are anchored at both ends. Sub-patterns
//! of `&` and `|` are separated by `,` outside of brackets, so `?[a-z]{1,3}`
//! needs no escaping. A sub-pattern wrapped in parentheses is taken whole,
//! which is how combinators nest (`&_a,(|b,c)`) and how a regex with a bare
//! comma is written (`|(?a,b),c`).

use crate::error::{Error, Result};
use crate::path::Path;
use crate::tree;
use crate::value::Value;
use crate::Rc;

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("cannot compare pattern `{left}` with pattern `{right}`")]
    Unsupported { left: String, right: String },
}

/// Matcher over a single path segment.
#[derive(Debug, Clone)]
pub enum SegmentPattern {
    Literal(Rc<str>),
    Any,
    Regex { source: Rc<str>, regex: Regex },
    Prefix(Rc<str>),
    And(Vec<SegmentPattern>),
    Or(Vec<SegmentPattern>),
    Inverse(Box<SegmentPattern>),
}

/// Parse a pattern segment. A string without a recognized sigil is a literal.
pub fn parse_pattern(segment: &str) -> Result<SegmentPattern, PatternError> {
    let rest = || &segment[1..];
    Ok(match segment.chars().next() {
        Some('*') => SegmentPattern::Any,
        Some('?') => {
            let source = rest();
            let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
                PatternError::InvalidRegex {
                    pattern: source.to_string(),
                    message: e.to_string(),
                }
            })?;
            SegmentPattern::Regex {
                source: source.into(),
                regex,
            }
        }
        Some('!') => SegmentPattern::Inverse(Box::new(parse_pattern(rest())?)),
        Some('_') => SegmentPattern::Prefix(rest().into()),
        Some('&') => SegmentPattern::And(parse_list(rest())?),
        Some('|') => SegmentPattern::Or(parse_list(rest())?),
        Some('=') => SegmentPattern::Literal(rest().into()),
        _ => SegmentPattern::Literal(segment.into()),
    })
}

fn parse_list(s: &str) -> Result<Vec<SegmentPattern>, PatternError> {
    split_operands(s)
        .into_iter()
        .map(|operand| parse_pattern(unwrap_parens(operand)))
        .collect()
}

// Split on commas that are not nested in (), {} or a [] class.
fn split_operands(s: &str) -> Vec<&str> {
    let mut operands = vec![];
    let mut depth = 0usize;
    let mut in_class = false;
    let mut start = 0;
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            ']' if in_class => in_class = false,
            _ if in_class => (),
            '[' => in_class = true,
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                operands.push(&s[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    operands.push(&s[start..]);
    operands
}

// `(p)` is `p` when the opening parenthesis closes at the very end.
fn unwrap_parens(operand: &str) -> &str {
    let Some(inner) = operand
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return operand;
    };
    let mut depth = 0usize;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return operand,
            ')' => depth -= 1,
            _ => (),
        }
    }
    inner
}

impl SegmentPattern {
    pub fn literal(s: &str) -> SegmentPattern {
        SegmentPattern::Literal(s.into())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, SegmentPattern::Literal(_))
    }

    /// Whether the concrete `segment` is matched by this pattern.
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            SegmentPattern::Literal(l) => l.as_ref() == segment,
            SegmentPattern::Any => true,
            SegmentPattern::Regex { regex, .. } => regex.is_match(segment),
            SegmentPattern::Prefix(p) => segment.starts_with(p.as_ref()),
            SegmentPattern::And(ps) => ps.iter().all(|p| p.matches(segment)),
            SegmentPattern::Or(ps) => ps.iter().any(|p| p.matches(segment)),
            SegmentPattern::Inverse(p) => !p.matches(segment),
        }
    }

    /// Whether some segment could be matched by both patterns.
    ///
    /// Only comparisons that can be decided exactly are supported; in
    /// particular a prefix can not be compared with a regex.
    pub fn overlaps(&self, other: &SegmentPattern) -> Result<bool, PatternError> {
        use SegmentPattern as P;
        match (self, other) {
            (P::Literal(l), p) | (p, P::Literal(l)) => Ok(p.matches(l)),
            (P::Any, _) | (_, P::Any) => Ok(true),
            (P::Prefix(a), P::Prefix(b)) => {
                Ok(a.starts_with(b.as_ref()) || b.starts_with(a.as_ref()))
            }
            (P::Regex { source: a, .. }, P::Regex { source: b, .. }) if a == b => Ok(true),
            (P::And(ps), q) | (q, P::And(ps)) => {
                for p in ps {
                    if !p.overlaps(q)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (P::Or(ps), q) | (q, P::Or(ps)) => {
                for p in ps {
                    if p.overlaps(q)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(PatternError::Unsupported {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SegmentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, ps: &[SegmentPattern]| -> fmt::Result {
            for (i, p) in ps.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                let text = p.to_string();
                if matches!(p, SegmentPattern::And(_) | SegmentPattern::Or(_))
                    || split_operands(&text).len() > 1
                {
                    write!(f, "({text})")?;
                } else {
                    f.write_str(&text)?;
                }
            }
            Ok(())
        };
        match self {
            SegmentPattern::Literal(l) => match l.chars().next() {
                Some('*' | '?' | '!' | '_' | '&' | '|' | '=') => write!(f, "={l}"),
                _ => f.write_str(l),
            },
            SegmentPattern::Any => f.write_str("*"),
            SegmentPattern::Regex { source, .. } => write!(f, "?{source}"),
            SegmentPattern::Prefix(p) => write!(f, "_{p}"),
            SegmentPattern::And(ps) => {
                f.write_str("&")?;
                join(f, ps)
            }
            SegmentPattern::Or(ps) => {
                f.write_str("|")?;
                join(f, ps)
            }
            SegmentPattern::Inverse(p) => write!(f, "!{p}"),
        }
    }
}

impl PartialEq for SegmentPattern {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl PartialEq<str> for SegmentPattern {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for SegmentPattern {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<SegmentPattern> for str {
    fn eq(&self, other: &SegmentPattern) -> bool {
        other.matches(self)
    }
}

impl PartialEq<SegmentPattern> for &str {
    fn eq(&self, other: &SegmentPattern) -> bool {
        other.matches(self)
    }
}

/// Tree depths at which wildcard-matched keys are reported by their concrete name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Levels {
    #[default]
    None,
    All,
    Only(BTreeSet<usize>),
}

impl Levels {
    pub fn contains(&self, depth: usize) -> bool {
        match self {
            Levels::None => false,
            Levels::All => true,
            Levels::Only(s) => s.contains(&depth),
        }
    }
}

fn reported_segment(pattern: &SegmentPattern, key: &Rc<str>, expand: bool) -> Rc<str> {
    if expand || pattern.is_literal() {
        key.clone()
    } else {
        pattern.to_string().into()
    }
}

/// Lazy enumeration of the rule paths matched level by level, see [`match_levels`].
pub struct LevelMatches<'a, 'p> {
    levels: &'p [Vec<SegmentPattern>],
    expand: &'p Levels,
    stack: Vec<(Path, &'a Value)>,
    seen: BTreeSet<Path>,
}

impl<'a> Iterator for LevelMatches<'a, '_> {
    type Item = (Path, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            let depth = path.len();
            if depth == self.levels.len() {
                if self.seen.insert(path.clone()) {
                    return Some((path, node));
                }
                continue;
            }

            let Value::Object(fields) = node else {
                continue;
            };
            let patterns = &self.levels[depth];
            let expand = self.expand.contains(depth);
            // Reverse so that keys are produced in document order.
            for (key, child) in fields.iter().rev() {
                if let Some(p) = patterns.iter().find(|p| p.matches(key)) {
                    let seg = reported_segment(p, key, expand);
                    self.stack.push((path.child(seg), child));
                }
            }
        }
        None
    }
}

/// Enumerate every path of `rules` that, at each depth `d`, goes through a key
/// matched by some pattern of `levels[d]`, together with the value found at the
/// end of it.
///
/// Keys are reported by their concrete name at depths contained in `expand`
/// and by the matching pattern otherwise. Reported paths are deduplicated; the
/// first value in document order wins.
pub fn match_levels<'a, 'p>(
    rules: &'a Value,
    levels: &'p [Vec<SegmentPattern>],
    expand: &'p Levels,
) -> LevelMatches<'a, 'p> {
    LevelMatches {
        levels,
        expand,
        stack: vec![(Path::root(), rules)],
        seen: BTreeSet::new(),
    }
}

/// How the pattern keys of one level must be covered by rule keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregator {
    /// Every pattern key must be matched by some rule key.
    AllOf,
    /// Pattern keys may be left uncovered.
    #[default]
    AnyOf,
}

/// Result of [`match_tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// The matched part of the rule document, keyed as reported.
    pub matched: Value,
    /// Rule keys that no pattern matched.
    pub unmatched: Vec<Path>,
    /// Pattern keys left uncovered at `AllOf` levels.
    pub missing: Vec<Path>,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.unmatched.is_empty() && self.missing.is_empty()
    }
}

/// Options for [`match_tree`].
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Aggregator per depth; the last entry applies to all deeper levels.
    pub aggregators: Vec<Aggregator>,
    pub expand: Levels,
    /// Merge the values of rule keys that fold onto the same reported key.
    pub automerge: bool,
}

impl MatchOptions {
    fn aggregator(&self, depth: usize) -> Aggregator {
        self.aggregators
            .get(depth)
            .or(self.aggregators.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Match a pattern document (keys are patterns) against a rule document (keys
/// are concrete).
///
/// A pattern value that is not an object, or is an empty object, accepts any
/// rule value. Literal pattern keys take precedence over the others, which are
/// tried in key order. When a level fails its aggregator, or any rule key is
/// left unmatched, `matched` is an empty object and the offending keys are
/// listed in `unmatched`/`missing`.
pub fn match_tree(patterns: &Value, rules: &Value, options: &MatchOptions) -> Result<MatchOutcome> {
    let mut path = Path::root();
    let outcome = match_level(patterns, rules, 0, &mut path, options)?;
    if outcome.is_match() {
        Ok(outcome)
    } else {
        Ok(MatchOutcome {
            matched: Value::new_object(),
            ..outcome
        })
    }
}

fn match_level(
    patterns: &Value,
    rules: &Value,
    depth: usize,
    path: &mut Path,
    options: &MatchOptions,
) -> Result<MatchOutcome> {
    let (pfields, rfields) = match (patterns, rules) {
        (Value::Object(p), Value::Object(r)) if !p.is_empty() => (p, r),
        _ => {
            return Ok(MatchOutcome {
                matched: rules.clone(),
                unmatched: vec![],
                missing: vec![],
            })
        }
    };

    let mut parsed = Vec::with_capacity(pfields.len());
    for (key, value) in pfields.iter() {
        parsed.push((key, parse_pattern(key)?, value));
    }
    // Literals first; sort is stable so key order is kept otherwise.
    parsed.sort_by_key(|(_, p, _)| !p.is_literal());

    let expand = options.expand.contains(depth);
    let mut groups: BTreeMap<Rc<str>, (usize, Vec<(&Rc<str>, &Value)>)> = BTreeMap::new();
    let mut covered = BTreeSet::new();
    let mut unmatched = vec![];

    for (rkey, rvalue) in rfields.iter() {
        match parsed.iter().position(|(_, p, _)| p.matches(rkey)) {
            Some(idx) => {
                covered.insert(idx);
                let out = reported_segment(&parsed[idx].1, rkey, expand);
                groups
                    .entry(out)
                    .or_insert_with(|| (idx, vec![]))
                    .1
                    .push((rkey, rvalue));
            }
            None => unmatched.push(path.child(rkey.clone())),
        }
    }

    let mut matched = Value::new_object();
    let mut missing = vec![];
    for (out, (idx, members)) in groups {
        path.push(out.clone());
        let rule_node = fold_members(&members, path, options.automerge)?;
        let sub = match_level(parsed[idx].2, &rule_node, depth + 1, path, options)?;
        path.pop();

        matched.insert(out, sub.matched)?;
        unmatched.extend(sub.unmatched);
        missing.extend(sub.missing);
    }

    if options.aggregator(depth) == Aggregator::AllOf {
        for (idx, (key, _, _)) in parsed.iter().enumerate() {
            if !covered.contains(&idx) {
                missing.push(path.child((*key).clone()));
            }
        }
    }

    Ok(MatchOutcome {
        matched,
        unmatched,
        missing,
    })
}

fn fold_members(members: &[(&Rc<str>, &Value)], path: &Path, automerge: bool) -> Result<Value> {
    let mut iter = members.iter();
    let Some((_, first)) = iter.next() else {
        return Ok(Value::Undefined);
    };
    let mut node = (*first).clone();
    for (_, value) in iter {
        if !automerge {
            return Err(Error::Conflict {
                path: path.clone(),
                left: node,
                right: (*value).clone(),
            });
        }
        node = tree::merge(&node, value, tree::conflict).map_err(|e| e.at(path))?;
    }
    Ok(node)
}
