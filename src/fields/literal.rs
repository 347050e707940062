//! Composite literal parser
//!
//! Arrays, tuples and maps arrive on the wire in the same textual syntax
//! the SQL dialect uses for literals:
//!
//! ```text
//! ['a','b\'c',NULL]
//! (1,'x',[2,3])
//! {'key':1,'other':2}
//! map('key', 1)
//! ```
//!
//! This module parses that syntax into an untyped [`Literal`] tree which
//! the field codecs then convert element by element.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while1},
    character::complete::{anychar, char, multispace0},
    combinator::{map, value},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair, terminated},
    IResult,
};

use crate::fields::escape::unescape_char;

/// Untyped literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// SQL NULL
    Null,
    /// A quoted string (unescaped) or a bare token such as `42` or `nan`
    Scalar(String),
    /// `[...]` or `(...)`
    List(Vec<Literal>),
    /// `{k:v, ...}` or `map(k, v, ...)`
    Map(Vec<(Literal, Literal)>),
}

/// Parse a complete literal, rejecting trailing input
pub fn parse_literal(input: &str) -> Result<Literal, String> {
    match delimited(multispace0, literal, multispace0)(input) {
        Ok(("", lit)) => Ok(lit),
        Ok((rest, _)) => Err(format!("unexpected input after literal: '{}'", rest)),
        Err(e) => Err(format!("invalid literal '{}': {:?}", input, e)),
    }
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        null_literal,
        map(quoted_string, Literal::Scalar),
        array_literal,
        map_function,
        tuple_function,
        tuple_literal,
        map_literal,
        map(bare_token, |t: &str| Literal::Scalar(t.to_string())),
    ))(input)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn null_literal(input: &str) -> IResult<&str, Literal> {
    value(Literal::Null, alt((terminated(tag("NULL"), end_of_token), tag("\\N"))))(input)
}

/// Succeeds without consuming when the next char can't continue a bare token
fn end_of_token(input: &str) -> IResult<&str, ()> {
    match input.chars().next() {
        Some(c) if is_bare_char(c) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
        _ => Ok((input, ())),
    }
}

/// `'...'` with backslash escapes, also accepting the `''` quote-doubling form
pub(crate) fn quoted_string(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        if let Ok((r, chunk)) = is_not::<_, _, nom::error::Error<&str>>("\\'")(rest) {
            out.push_str(chunk);
            rest = r;
        }
        if let Ok((r, _)) = tag::<_, _, nom::error::Error<&str>>("''")(rest) {
            out.push('\'');
            rest = r;
            continue;
        }
        if let Ok((r, escaped)) =
            preceded(char::<_, nom::error::Error<&str>>('\\'), anychar)(rest)
        {
            out.push(unescape_char(escaped));
            rest = r;
            continue;
        }
        let (r, _) = char('\'')(rest)?;
        return Ok((r, out));
    }
}

fn is_bare_char(c: char) -> bool {
    !matches!(c, ',' | '[' | ']' | '(' | ')' | '{' | '}' | ':' | '\'') && !c.is_whitespace()
}

fn bare_token(input: &str) -> IResult<&str, &str> {
    take_while1(is_bare_char)(input)
}

fn items(input: &str) -> IResult<&str, Vec<Literal>> {
    separated_list0(char(','), ws(literal))(input)
}

fn array_literal(input: &str) -> IResult<&str, Literal> {
    map(delimited(char('['), ws(items), char(']')), Literal::List)(input)
}

fn tuple_literal(input: &str) -> IResult<&str, Literal> {
    map(delimited(char('('), ws(items), char(')')), Literal::List)(input)
}

fn tuple_function(input: &str) -> IResult<&str, Literal> {
    preceded(terminated(tag_no_case("tuple"), multispace0), tuple_literal)(input)
}

fn map_literal(input: &str) -> IResult<&str, Literal> {
    let pair = separated_pair(ws(literal), char(':'), ws(literal));
    map(
        delimited(char('{'), ws(separated_list0(char(','), pair)), char('}')),
        Literal::Map,
    )(input)
}

fn map_function(input: &str) -> IResult<&str, Literal> {
    let (rest, _) = terminated(tag_no_case("map"), multispace0)(input)?;
    let (rest, args) = delimited(char('('), ws(items), char(')'))(rest)?;
    if args.len() % 2 != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Count,
        )));
    }
    let mut pairs = Vec::with_capacity(args.len() / 2);
    let mut iter = args.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        pairs.push((k, v));
    }
    Ok((rest, Literal::Map(pairs)))
}

/// Parse a `'quoted'` string on its own (used for enum members and timezones)
pub fn parse_quoted(input: &str) -> IResult<&str, String> {
    quoted_string(input)
}
