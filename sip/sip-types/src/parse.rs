//! Parsing primitives shared by all SIP message components

use internal::IResult;
use nom::bytes::complete::{escaped, is_not};
use nom::character::complete::char;
use nom::sequence::delimited;

pub(crate) fn parse_quoted(i: &str) -> IResult<&str, &str> {
    delimited(char('"'), escaped(is_not("\""), '\\', char('"')), char('"'))(i)
}

pub(crate) fn whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

pub(crate) fn token(c: char) -> bool {
    lookup_table!(c => alpha; num; '-', '.', '!', '%', '*', '_', '`', '\'', '~', '+')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quoted() {
        assert!(matches!(parse_quoted(r#""Bob""#), Ok(("", "Bob"))));
        assert!(matches!(parse_quoted(r#""Bob" "#), Ok((" ", "Bob"))));
        assert!(matches!(
            parse_quoted(r#""Bob" "Alice""#),
            Ok((r#" "Alice""#, "Bob"))
        ));
    }
}
