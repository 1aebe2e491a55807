//! Label filter parser using nom.
//!
//! ```text
//! service = "api" AND (endpoint IN ("/a", "/b") OR NOT region EXISTS)
//! le <= 2000 && host =~ "^web-" || env != staging
//! ```

use super::ast::*;
use crate::core::{Result, StrataError};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{map, map_res, not, value as nom_value},
    multi::{many0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Parse a filter expression into an AST. An empty expression matches all.
pub fn parse_filter(input: &str) -> Result<FilterExpr> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(FilterExpr::All);
    }

    match logical_or(input) {
        Ok((remaining, expr)) => {
            if !remaining.trim().is_empty() {
                Err(StrataError::parse(format!(
                    "Unexpected input after filter: '{}'",
                    remaining.trim()
                )))
            } else {
                Ok(expr)
            }
        },
        Err(e) => Err(StrataError::parse(format!("Failed to parse filter '{}': {}", input, e))),
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn is_bare_char(c: char) -> bool {
    is_key_char(c) || matches!(c, '/' | '+' | ':' | '*' | '@')
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(kw), not(satisfy(is_key_char)))
}

/// Parse logical OR expressions
fn logical_or(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = logical_and(input)?;

    let (input, rest) = many0(preceded(
        tuple((multispace0, alt((tag("||"), keyword("OR"))), multispace0)),
        logical_and,
    ))(input)?;

    Ok((
        input,
        rest.into_iter().fold(first, |acc, right| FilterExpr::Logical {
            op: LogicalOp::Or,
            left: Box::new(acc),
            right: Box::new(right),
        }),
    ))
}

/// Parse logical AND expressions
fn logical_and(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = unary(input)?;

    let (input, rest) = many0(preceded(
        tuple((multispace0, alt((tag("&&"), keyword("AND"))), multispace0)),
        unary,
    ))(input)?;

    Ok((
        input,
        rest.into_iter().fold(first, |acc, right| FilterExpr::Logical {
            op: LogicalOp::And,
            left: Box::new(acc),
            right: Box::new(right),
        }),
    ))
}

/// Parse `NOT expr` or a primary expression
fn unary(input: &str) -> IResult<&str, FilterExpr> {
    preceded(
        multispace0,
        alt((
            map(preceded(pair(keyword("NOT"), multispace0), unary), |inner| {
                FilterExpr::Not(Box::new(inner))
            }),
            grouped,
            predicate,
        )),
    )(input)
}

/// Parse grouped (parenthesized) expressions
fn grouped(input: &str) -> IResult<&str, FilterExpr> {
    map(
        delimited(char('('), logical_or, preceded(multispace0, char(')'))),
        |inner| FilterExpr::Group(Box::new(inner)),
    )(input)
}

/// Parse a single predicate on one label key
fn predicate(input: &str) -> IResult<&str, FilterExpr> {
    let (input, key) = label_key(input)?;
    let (input, _) = multispace0(input)?;
    let key = key.to_string();

    let parsed = alt((
        map(tuple((keyword("NOT"), multispace1, keyword("EXISTS"))), |_| FilterExpr::Exists {
            key: key.clone(),
            negated: true,
        }),
        map(keyword("EXISTS"), |_| FilterExpr::Exists {
            key: key.clone(),
            negated: false,
        }),
        map(
            preceded(tuple((keyword("NOT"), multispace1, keyword("IN"), multispace0)), value_list),
            |values| FilterExpr::In {
                key: key.clone(),
                values,
                negated: true,
            },
        ),
        map(preceded(pair(keyword("IN"), multispace0), value_list), |values| FilterExpr::In {
            key: key.clone(),
            values,
            negated: false,
        }),
        map(pair(operator, preceded(multispace0, literal)), |(op, value)| {
            FilterExpr::Comparison {
                key: key.clone(),
                op,
                value,
            }
        }),
    ))(input);
    parsed
}

/// Parse label keys (e.g., service, http.route, k8s.pod-name)
fn label_key(input: &str) -> IResult<&str, &str> {
    take_while1(is_key_char)(input)
}

/// Parse operators
fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        nom_value(Operator::Regex, tag("=~")),
        nom_value(Operator::NotRegex, tag("!~")),
        nom_value(Operator::NotEq, tag("!=")),
        nom_value(Operator::NotEq, tag("<>")),
        nom_value(Operator::Gte, tag(">=")),
        nom_value(Operator::Lte, tag("<=")),
        nom_value(Operator::Eq, tag("==")),
        nom_value(Operator::Eq, tag("=")),
        nom_value(Operator::Gt, tag(">")),
        nom_value(Operator::Lt, tag("<")),
        nom_value(Operator::Contains, keyword("CONTAINS")),
    ))(input)
}

/// Parse `(v1, v2, ...)`
fn value_list(input: &str) -> IResult<&str, Vec<Value>> {
    delimited(
        pair(char('('), multispace0),
        separated_list1(tuple((multispace0, char(','), multispace0)), literal),
        pair(multispace0, char(')')),
    )(input)
}

/// Parse a literal: quoted string, number, or bare word
fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(quoted, |s: &str| Value::String(s.to_string())),
        number,
        map(take_while1(is_bare_char), |s: &str| Value::String(s.to_string())),
    ))(input)
}

/// Parse single- or double-quoted strings
fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)
}

/// Parse numbers that are not the prefix of a bare word
fn number(input: &str) -> IResult<&str, Value> {
    map_res(terminated(recognize_float, not(satisfy(is_bare_char))), |raw: &str| {
        raw.parse::<f64>().map(|value| Value::Number {
            value,
            raw: raw.to_string(),
        })
    })(input)
}
