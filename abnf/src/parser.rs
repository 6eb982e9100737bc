//! Recursive-descent reader for ABNF documents.
//!
//! Each production below reads one grammar-model value. Comments above a
//! production give its ABNF definition.

use nom::{
    branch::alt,
    bytes::complete::take_while,
    combinator::{cut, map, opt, recognize, value},
    error::context,
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use tracing::debug;

use crate::error::{Error, Mismatch};
use crate::merge::{merge_occurrences, Occurrence};
use crate::{
    Alternation, Base, Concatenation, DefinedAs, Element, NumericValue, Repeat, Repetition, Rule,
    RuleName,
};

type Res<'a, T> = IResult<&'a [u8], T, Mismatch<'a>>;

/// Read every rule in `full`, merging repeated names.
pub(crate) fn parse_rules(full: &[u8]) -> Result<Vec<Rule>, Error> {
    let mut occurrences = Vec::new();
    let mut input = full;
    while let Some(&first) = input.first() {
        if is_alpha(first) {
            let offset = full.len() - input.len();
            let (rem, rule) = rule(input).map_err(|err| Error::from_nom(full, err))?;
            occurrences.push(Occurrence { rule, offset });
            input = rem;
        } else {
            let (rem, _) = blank(input).map_err(|err| Error::from_nom(full, err))?;
            input = rem;
        }
    }
    debug!(occurrences = occurrences.len(), "read rule occurrences");
    merge_occurrences(full, occurrences)
}

/// Read a lone rule body, such as the right-hand side of a rule.
pub(crate) fn parse_alternation(full: &[u8]) -> Result<Alternation, Error> {
    let (rem, body) = elements(full).map_err(|err| Error::from_nom(full, err))?;
    end_of_input(rem).map_err(|err| Error::from_nom(full, err))?;
    Ok(body)
}

fn is_alpha(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_wsp(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_vchar(b: u8) -> bool {
    (0x21..=0x7E).contains(&b)
}

/// Match a single byte of the given class.
fn byte<'a, F>(expected: &'static str, class: F) -> impl Fn(&'a [u8]) -> Res<'a, u8>
where
    F: Fn(u8) -> bool,
{
    move |input: &'a [u8]| match input.first() {
        Some(&b) if class(b) => Ok((&input[1..], b)),
        _ => Err(nom::Err::Error(Mismatch::new(input, expected))),
    }
}

fn exact<'a>(expected: &'static str, value: u8) -> impl Fn(&'a [u8]) -> Res<'a, u8> {
    byte(expected, move |b| b == value)
}

fn end_of_input(input: &[u8]) -> Res<'_, ()> {
    if input.is_empty() {
        Ok((input, ()))
    } else {
        Err(nom::Err::Error(Mismatch::new(input, "end of input")))
    }
}

/// A run of digits in `base`, read as one value.
fn number<'a>(base: Base) -> impl Fn(&'a [u8]) -> Res<'a, u32> {
    move |input: &'a [u8]| {
        let len = input.iter().take_while(|&&b| base.is_digit(b)).count();
        if len == 0 {
            return Err(nom::Err::Error(Mismatch::new(input, digit_name(base))));
        }
        std::str::from_utf8(&input[..len])
            .ok()
            .and_then(|digits| u32::from_str_radix(digits, base.radix()).ok())
            .map(|value| (&input[len..], value))
            .ok_or_else(|| nom::Err::Failure(Mismatch::new(input, "value that fits in 32 bits")))
    }
}

fn digit_name(base: Base) -> &'static str {
    match base {
        Base::Binary => "binary digit",
        Base::Decimal => "decimal digit",
        Base::Hexadecimal => "hexadecimal digit",
    }
}

// WSP = SP / HTAB
fn wsp(input: &[u8]) -> Res<'_, u8> {
    byte("space or tab", is_wsp)(input)
}

// CRLF = CR LF. A bare LF is accepted as well.
fn line_break(input: &[u8]) -> Res<'_, ()> {
    alt((
        value((), pair(exact("CR", b'\r'), exact("LF after CR", b'\n'))),
        value((), exact("line break", b'\n')),
    ))(input)
}

// comment = ";" *(WSP / VCHAR) CRLF
fn comment(input: &[u8]) -> Res<'_, &[u8]> {
    preceded(
        exact("`;`", b';'),
        terminated(
            take_while(|b: u8| is_wsp(b) || is_vchar(b)),
            alt((line_break, end_of_input)),
        ),
    )(input)
}

// c-nl = comment / CRLF
fn c_nl(input: &[u8]) -> Res<'_, ()> {
    context(
        "comment or line break",
        alt((value((), comment), line_break)),
    )(input)
}

// c-wsp = WSP / (c-nl WSP)
fn c_wsp(input: &[u8]) -> Res<'_, ()> {
    alt((value((), wsp), value((), pair(c_nl, wsp))))(input)
}

// rulename = ALPHA *(ALPHA / DIGIT / "-")
fn rulename(input: &[u8]) -> Res<'_, RuleName> {
    map(
        recognize(pair(
            byte("rule name", is_alpha),
            take_while(|b: u8| is_alpha(b) || is_digit(b) || b == b'-'),
        )),
        |name: &[u8]| RuleName(String::from_utf8_lossy(name).into_owned()),
    )(input)
}

// defined-as = *c-wsp ("=" / "=/") *c-wsp
fn defined_as(input: &[u8]) -> Res<'_, DefinedAs> {
    delimited(
        many0(c_wsp),
        map(
            pair(exact("`=` or `=/`", b'='), opt(exact("`/`", b'/'))),
            |(_, slash)| match slash {
                Some(_) => DefinedAs::Incremental,
                None => DefinedAs::Fresh,
            },
        ),
        many0(c_wsp),
    )(input)
}

// rule = rulename defined-as elements c-nl
//
// The last rule of a document may end at end of input.
fn rule(input: &[u8]) -> Res<'_, Rule> {
    let (rem, name) = rulename(input)?;
    let (rem, (defined_as, body)) = cut(terminated(
        pair(defined_as, elements),
        context("comment or line break", alt((c_nl, end_of_input))),
    ))(rem)?;
    Ok((
        rem,
        Rule {
            name,
            defined_as,
            body,
        },
    ))
}

// (*c-wsp c-nl), the non-rule lines of a rulelist
fn blank(input: &[u8]) -> Res<'_, ()> {
    context(
        "rule name, comment, or line break",
        value((), pair(many0(c_wsp), c_nl)),
    )(input)
}

// elements = alternation *c-wsp
fn elements(input: &[u8]) -> Res<'_, Alternation> {
    terminated(alternation, many0(c_wsp))(input)
}

// alternation = concatenation *(*c-wsp "/" *c-wsp concatenation)
fn alternation(input: &[u8]) -> Res<'_, Alternation> {
    let (rem, first) = concatenation(input)?;
    let (rem, rest) = many0(preceded(
        pair(many0(c_wsp), exact("`/`", b'/')),
        cut(preceded(many0(c_wsp), concatenation)),
    ))(rem)?;

    let mut branches = Vec::with_capacity(rest.len() + 1);
    branches.push(first);
    branches.extend(rest);
    Ok((rem, Alternation(branches)))
}

// concatenation = repetition *(1*c-wsp repetition)
fn concatenation(input: &[u8]) -> Res<'_, Concatenation> {
    let (rem, first) = repetition(input)?;
    let (rem, rest) = many0(preceded(many1(c_wsp), repetition))(rem)?;

    let mut repetitions = Vec::with_capacity(rest.len() + 1);
    repetitions.push(first);
    repetitions.extend(rest);
    Ok((rem, Concatenation(repetitions)))
}

// repetition = [repeat] element
fn repetition(input: &[u8]) -> Res<'_, Repetition> {
    map(pair(opt(repeat), element), |(repeat, element)| Repetition {
        repeat,
        element,
    })(input)
}

// repeat = 1*DIGIT / (*DIGIT "*" *DIGIT)
fn repeat(input: &[u8]) -> Res<'_, Repeat> {
    let (rem, min) = opt(number(Base::Decimal))(input)?;
    let (rem, star) = opt(exact("`*`", b'*'))(rem)?;
    match (min, star) {
        (Some(n), None) => Ok((rem, Repeat::count(n))),
        (min, Some(_)) => {
            let (rem, max) = opt(number(Base::Decimal))(rem)?;
            Ok((rem, Repeat::between(min.unwrap_or(0), max)))
        }
        (None, None) => Err(nom::Err::Error(Mismatch::new(input, "repeat count"))),
    }
}

// element = rulename / group / option / char-val / num-val / prose-val
fn element(input: &[u8]) -> Res<'_, Element> {
    match input.first() {
        Some(&b) if is_alpha(b) => map(rulename, Element::Rule)(input),
        Some(b'(') => map(group, Element::Group)(input),
        Some(b'[') => map(option, Element::Option)(input),
        Some(b'"') => map(char_val, Element::Literal)(input),
        Some(b'%') => map(num_val, Element::NumericValue)(input),
        Some(b'<') => map(prose_val, Element::Prose)(input),
        _ => Err(nom::Err::Error(Mismatch::new(
            input,
            "rule name, group, option, or literal",
        ))),
    }
}

fn bracketed<'a>(
    open: u8,
    close: u8,
    close_expected: &'static str,
) -> impl Fn(&'a [u8]) -> Res<'a, Alternation> {
    move |input: &'a [u8]| {
        preceded(
            exact("opening bracket", open),
            cut(terminated(
                delimited(many0(c_wsp), alternation, many0(c_wsp)),
                exact(close_expected, close),
            )),
        )(input)
    }
}

// group = "(" *c-wsp alternation *c-wsp ")"
fn group(input: &[u8]) -> Res<'_, Alternation> {
    bracketed(b'(', b')', "`)`")(input)
}

// option = "[" *c-wsp alternation *c-wsp "]"
fn option(input: &[u8]) -> Res<'_, Alternation> {
    bracketed(b'[', b']', "`]`")(input)
}

// char-val = DQUOTE *(%x20-21 / %x23-7E) DQUOTE
fn char_val(input: &[u8]) -> Res<'_, Vec<u8>> {
    map(
        preceded(
            exact("`\"`", b'"'),
            cut(terminated(
                take_while(|b: u8| matches!(b, 0x20..=0x21 | 0x23..=0x7E)),
                exact("closing `\"`", b'"'),
            )),
        ),
        |value: &[u8]| value.to_vec(),
    )(input)
}

// prose-val = "<" *(%x20-3D / %x3F-7E) ">"
fn prose_val(input: &[u8]) -> Res<'_, Vec<u8>> {
    map(
        preceded(
            exact("`<`", b'<'),
            cut(terminated(
                take_while(|b: u8| matches!(b, 0x20..=0x3D | 0x3F..=0x7E)),
                exact("closing `>`", b'>'),
            )),
        ),
        |value: &[u8]| value.to_vec(),
    )(input)
}

// num-val = "%" (bin-val / dec-val / hex-val)
fn num_val(input: &[u8]) -> Res<'_, NumericValue> {
    preceded(exact("`%`", b'%'), cut(num_body))(input)
}

// bin-val = "b" 1*BIT [ 1*("." 1*BIT) / ("-" 1*BIT) ]
// dec-val = "d" 1*DIGIT [ 1*("." 1*DIGIT) / ("-" 1*DIGIT) ]
// hex-val = "x" 1*HEXDIG [ 1*("." 1*HEXDIG) / ("-" 1*HEXDIG) ]
//
// A `.` or `-` not followed by a digit of the base is left unread.
fn num_body(input: &[u8]) -> Res<'_, NumericValue> {
    let base = match input.first().copied().and_then(Base::from_prefix) {
        Some(base) => base,
        None => return Err(nom::Err::Error(Mismatch::new(input, "`b`, `d`, or `x`"))),
    };
    let (rem, first) = number(base)(&input[1..])?;

    let (rem, rest) = many0(preceded(exact("`.`", b'.'), number(base)))(rem)?;
    if !rest.is_empty() {
        let mut values = Vec::with_capacity(rest.len() + 1);
        values.push(first);
        values.extend(rest);
        return Ok((
            rem,
            NumericValue {
                base,
                ranged: false,
                values,
            },
        ));
    }

    let (rem, upper) = opt(preceded(exact("`-`", b'-'), number(base)))(rem)?;
    let value = match upper {
        Some(upper) => NumericValue {
            base,
            ranged: true,
            values: vec![first, upper],
        },
        None => NumericValue {
            base,
            ranged: false,
            values: vec![first],
        },
    };
    Ok((rem, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn numeric(base: Base, ranged: bool, values: Vec<u32>) -> Element {
        Element::NumericValue(NumericValue {
            base,
            ranged,
            values,
        })
    }

    #[test]
    fn elements_simple() {
        let tests: Vec<(&str, Element, &str)> = vec![
            ("rule-1a", Element::Rule("rule-1a".into()), ""),
            ("\"abc\" x", Element::Literal(b"abc".to_vec()), " x"),
            ("\"\"", Element::Literal(Vec::new()), ""),
            ("<any text>", Element::Prose(b"any text".to_vec()), ""),
            ("%x41", numeric(Base::Hexadecimal, false, vec![0x41]), ""),
            ("%X7f", numeric(Base::Hexadecimal, false, vec![0x7F]), ""),
            ("%d13.10", numeric(Base::Decimal, false, vec![13, 10]), ""),
            ("%b0-1", numeric(Base::Binary, true, vec![0, 1]), ""),
            ("%x30-39", numeric(Base::Hexadecimal, true, vec![0x30, 0x39]), ""),
        ];
        for (input, expected, rem) in tests {
            let (got_rem, got) = element(input.as_bytes()).unwrap();
            assert_eq!(got, expected, "input: {}", input);
            assert_eq!(got_rem, rem.as_bytes(), "input: {}", input);
        }
    }

    #[test]
    fn numeric_value_leaves_trailing_separators() {
        let tests = vec![
            ("%x41-", vec![0x41], "-"),
            ("%x41-g", vec![0x41], "-g"),
            ("%d1.", vec![1], "."),
            ("%b10-2", vec![0b10], "-2"),
        ];
        for (input, values, rem) in tests {
            let (got_rem, got) = num_val(input.as_bytes()).unwrap();
            assert_eq!(got.values, values, "input: {}", input);
            assert!(!got.ranged, "input: {}", input);
            assert_eq!(got_rem, rem.as_bytes(), "input: {}", input);
        }
    }

    #[test]
    fn repeat_forms() {
        let tests = vec![
            ("3", Repeat::count(3)),
            ("*", Repeat::between(0, None)),
            ("1*", Repeat::between(1, None)),
            ("*5", Repeat::between(0, Some(5))),
            ("2*4", Repeat::between(2, Some(4))),
        ];
        for (input, expected) in tests {
            let (rem, got) = repeat(input.as_bytes()).unwrap();
            assert_eq!(got, expected, "input: {}", input);
            assert!(rem.is_empty(), "input: {}", input);
        }
    }

    #[test]
    fn bare_count_is_an_open_minimum() {
        let (_, got) = repeat(b"3").unwrap();
        assert_eq!((got.min, got.max, got.starred), (3, None, false));
        assert_eq!(got.to_string(), "3");
    }

    #[test]
    fn concatenation_stops_before_trailing_whitespace() {
        let (rem, got) = concatenation(b"a \"b\"   ; note\r\n").unwrap();
        assert_eq!(got.0.len(), 2);
        assert_eq!(rem, b"   ; note\r\n");
    }

    #[test]
    fn alternation_continues_on_indented_lines() {
        let input = b"a\r\n  / b ; second\r\n  / c\r\nnext = x";
        let (rem, got) = alternation(input).unwrap();
        assert_eq!(got.0.len(), 3);
        assert_eq!(rem, b"\r\nnext = x");
    }

    #[test]
    fn rule_ends_at_comment_or_end_of_input() {
        let tests = vec!["a = b\r\n", "a = b ; trailing\r\n", "a = b", "a =/ b\n"];
        for input in tests {
            let (rem, got) = rule(input.as_bytes()).unwrap();
            assert_eq!(got.name, RuleName::from("a"), "input: {}", input);
            assert!(rem.is_empty(), "input: {}", input);
        }
    }

    #[test]
    fn defined_as_markers() {
        let (_, fresh) = rule(b"a = b").unwrap();
        let (_, incremental) = rule(b"a =/ b").unwrap();
        assert_eq!(fresh.defined_as, DefinedAs::Fresh);
        assert_eq!(incremental.defined_as, DefinedAs::Incremental);
    }

    fn parse_error(input: &str) -> (String, Option<u8>, usize, usize) {
        match parse_rules(input.as_bytes()).unwrap_err() {
            Error::Parse {
                expected,
                actual,
                line,
                column,
            } => (expected, actual, line, column),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn parse_errors_report_first_unexpected_byte() {
        let tests = vec![
            ("a = \"abc", "closing `\"`", None, 1, 9),
            ("a = b @\r\n", "comment or line break", Some(b'@'), 1, 7),
            ("a = (b\r\n", "`)`", Some(b'\r'), 1, 7),
            ("a = %q1\r\n", "`b`, `d`, or `x`", Some(b'q'), 1, 6),
            ("a = %x\r\n", "hexadecimal digit", Some(b'\r'), 1, 7),
            ("a b\r\n", "`=` or `=/`", Some(b'b'), 1, 3),
            ("a = b\r\n1 = c\r\n", "rule name, comment, or line break", Some(b'1'), 2, 1),
            ("a = b /\r\n", "rule name, group, option, or literal", Some(b'\r'), 1, 8),
            ("a = b\rc", "LF after CR", Some(b'c'), 1, 7),
        ];
        for (input, expected, actual, line, column) in tests {
            let got = parse_error(input);
            assert_eq!(
                got,
                (expected.to_owned(), actual, line, column),
                "input: {:?}",
                input
            );
        }
    }

    #[test]
    fn numeric_overflow_is_an_error() {
        let (expected, _, _, _) = parse_error("a = %xFFFFFFFFF\r\n");
        assert_eq!(expected, "value that fits in 32 bits");
    }

    #[test]
    fn empty_document_has_no_rules() {
        assert!(parse_rules(b"").unwrap().is_empty());
        assert!(parse_rules(b"\r\n; only a comment\r\n  \r\n").unwrap().is_empty());
    }
}
