//! `If:` request header handling, RFC 4918 section 10.4.
//!
//! The header is a disjunction of condition groups. Conditions inside a
//! group are conjoined; each one checks a submitted state token against
//! the lock registry or an entity tag against the resource, with an
//! optional `Not` negation. A coded URL in front of a group (and every
//! following group, until superseded) retargets the checks to that
//! resource instead of the one named by the request line.

use std::collections::BTreeSet;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt},
    multi::many1,
    sequence::{delimited, preceded, terminated},
    IResult,
};

use tracing::warn;

use super::error::ParsingError;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConditionKind {
    /// `<coded-url>`, a lock token
    Token(String),
    /// `[entity-tag]`, kept verbatim including quotes and weak marker
    Etag(String),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Condition {
    pub negate: bool,
    pub kind: ConditionKind,
}

/// One parenthesized group, targeting either the request resource
/// (`resource: None`) or a tagged one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ConditionGroup {
    pub resource: Option<String>,
    pub conditions: Vec<Condition>,
}

// ---- grammar

fn coded_url(input: &str) -> IResult<&str, &str> {
    delimited(
        char('<'),
        take_while1(|c: char| c != '>' && c != '<' && !c.is_whitespace()),
        char('>'),
    )(input)
}

fn entity_tag(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_while1(|c: char| c != ']'), char(']'))(input)
}

fn condition(input: &str) -> IResult<&str, Condition> {
    let (input, negate) = opt(terminated(tag("Not"), multispace0))(input)?;
    let (input, kind) = alt((
        map(coded_url, |token| ConditionKind::Token(token.to_string())),
        map(entity_tag, |etag| ConditionKind::Etag(etag.to_string())),
    ))(input)?;
    Ok((
        input,
        Condition {
            negate: negate.is_some(),
            kind,
        },
    ))
}

fn group(input: &str) -> IResult<&str, Vec<Condition>> {
    delimited(
        char('('),
        many1(preceded(multispace0, condition)),
        preceded(multispace0, char(')')),
    )(input)
}

enum Item<'a> {
    Resource(&'a str),
    Group(Vec<Condition>),
}

fn item(input: &str) -> IResult<&str, Item<'_>> {
    preceded(
        multispace0,
        alt((map(coded_url, Item::Resource), map(group, Item::Group))),
    )(input)
}

/// Parse a complete `If:` header value. Any syntax error rejects the
/// whole header, and with it the request.
pub fn parse_if_header(raw: &str) -> Result<Vec<ConditionGroup>, ParsingError> {
    let bad = || ParsingError::IfHeader(raw.to_string());

    let (rest, items) = many1(item)(raw).map_err(|_| bad())?;
    if !rest.trim().is_empty() {
        return Err(bad());
    }

    // a resource tag applies to every group after it, until superseded
    let mut groups = Vec::new();
    let mut resource: Option<String> = None;
    let mut dangling_tag = false;
    for item in items {
        match item {
            Item::Resource(uri) => {
                resource = Some(uri.to_string());
                dangling_tag = true;
            }
            Item::Group(conditions) => {
                groups.push(ConditionGroup {
                    resource: resource.clone(),
                    conditions,
                });
                dangling_tag = false;
            }
        }
    }

    if groups.is_empty() || dangling_tag {
        return Err(bad());
    }
    Ok(groups)
}

// ---- evaluation

/// What the evaluator asks of the server: URI resolution, current
/// etags, and lock token validity.
pub trait ConditionalSource {
    /// Map a tagged URI to a resource path, `None` when it does not
    /// resolve to anything this server knows.
    fn resolve(&self, uri: &str) -> Option<String>;
    fn etag_of(&self, path: &str) -> Option<String>;
    /// Whether `token` unlocks `path`. An unlocked resource accepts
    /// any token.
    fn token_allowed(&self, path: &str, token: &str) -> bool;
    /// Whether a live lock with exactly this token sits on `path`.
    /// Only held tokens count as submitted.
    fn holds(&self, path: &str, token: &str) -> bool;
}

/// Outcome of checking a request's `If:` header.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ConditionalResult {
    /// The group disjunction held, and a parent token was matched when
    /// one was required.
    pub satisfied: bool,
    /// A token condition proved against the request resource itself.
    pub matched_main_token: Option<String>,
    /// A token condition proved against the request's parent resource.
    pub matched_parent_token: Option<String>,
    /// Other resources a token condition proved against. Their locks
    /// are considered submitted for the scope of this request.
    pub cleared_resources: BTreeSet<String>,
}

impl ConditionalResult {
    fn unconditional() -> Self {
        Self {
            satisfied: true,
            ..Self::default()
        }
    }
}

/// Evaluate a request's `If:` header against `main` (the request
/// resource) and, when the operation affects the parent's membership,
/// `parent`. An absent header leaves the request unconditional.
pub fn evaluate(
    header: Option<&str>,
    main: &str,
    parent: Option<&str>,
    source: &impl ConditionalSource,
) -> Result<ConditionalResult, ParsingError> {
    let raw = match header {
        None => return Ok(ConditionalResult::unconditional()),
        Some(raw) => raw,
    };
    let groups = match parse_if_header(raw) {
        Ok(groups) => groups,
        Err(e) => {
            warn!(header = raw, "rejecting malformed If header");
            return Err(e);
        }
    };
    Ok(evaluate_groups(&groups, main, parent, source))
}

pub fn evaluate_groups(
    groups: &[ConditionGroup],
    main: &str,
    parent: Option<&str>,
    source: &impl ConditionalSource,
) -> ConditionalResult {
    let mut result = ConditionalResult::default();
    let mut any_group_held = false;

    for group in groups {
        // an unresolvable tagged URI fails its checks but still lets
        // negated conditions succeed
        let target: Option<String> = match &group.resource {
            None => Some(main.to_string()),
            Some(uri) => source.resolve(uri),
        };

        let mut all_conditions_hold = true;
        for condition in &group.conditions {
            let raw = match (&condition.kind, &target) {
                (ConditionKind::Token(token), Some(path)) => source.token_allowed(path, token),
                (ConditionKind::Etag(etag), Some(path)) => {
                    source.etag_of(path).as_deref() == Some(etag.as_str())
                }
                (_, None) => false,
            };

            if raw == condition.negate {
                all_conditions_hold = false;
            }

            // every token proven against a held lock is submitted,
            // groups that end up failing included
            if raw && !condition.negate {
                if let (ConditionKind::Token(token), Some(path)) = (&condition.kind, &target) {
                    if !source.holds(path, token) {
                        continue;
                    }
                    if path == main {
                        if result.matched_main_token.is_none() {
                            result.matched_main_token = Some(token.clone());
                        }
                    } else if parent == Some(path.as_str()) {
                        if result.matched_parent_token.is_none() {
                            result.matched_parent_token = Some(token.clone());
                        }
                    } else {
                        result.cleared_resources.insert(path.clone());
                    }
                }
            }
        }

        any_group_held = any_group_held || all_conditions_hold;
    }

    result.satisfied =
        any_group_held && (parent.is_none() || result.matched_parent_token.is_some());
    result
}
