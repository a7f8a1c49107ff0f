use crate::header::headers::OneOrMore;
use crate::header::{ConstNamed, ExtendValues, HeaderParse};
use crate::method::Method;
use crate::parse::whitespace;
use crate::print::PrintCtx;
use crate::Name;
use bytes::Bytes;
use internal::IResult;
use nom::bytes::complete::take_while;
use nom::character::complete::digit1;
use nom::combinator::{map, map_res, verify};
use nom::sequence::separated_pair;
use std::fmt;
use std::str::FromStr;

/// The sequence number may not exceed 2**31-1
pub const MAX_CSEQ: u32 = i32::MAX as u32;

/// `CSeq` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub cseq: u32,
    pub method: Method,
}

impl CSeq {
    #[inline]
    pub const fn new(cseq: u32, method: Method) -> CSeq {
        CSeq { cseq, method }
    }
}

impl ConstNamed for CSeq {
    const NAME: Name = Name::CSEQ;
}

impl HeaderParse for CSeq {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        map(
            separated_pair(
                verify(map_res(digit1, u32::from_str), |cseq| *cseq <= MAX_CSEQ),
                take_while(whitespace),
                Method::parse(src),
            ),
            |(cseq, method)| CSeq { cseq, method },
        )(i.trim_start())
    }
}

impl ExtendValues for CSeq {
    fn extend_values(&self, ctx: PrintCtx<'_>, values: &mut OneOrMore) {
        *values = self.create_values(ctx)
    }

    fn create_values(&self, _: PrintCtx<'_>) -> OneOrMore {
        OneOrMore::One(self.to_string().into())
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cseq, self.method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytesstr::BytesStr;

    #[test]
    fn cseq() {
        let input = BytesStr::from_static("43287 INVITE");

        let (rem, cseq) = CSeq::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());

        assert_eq!(cseq.cseq, 43287);
        assert_eq!(cseq.method, Method::INVITE);
    }

    #[test]
    fn cseq_more_spaces() {
        let input = BytesStr::from_static("43287        INVITE");

        let (rem, cseq) = CSeq::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());

        assert_eq!(cseq.cseq, 43287);
        assert_eq!(cseq.method, Method::INVITE);
    }

    #[test]
    fn cseq_max_value() {
        let input = BytesStr::from_static("2147483647 INVITE");

        let (_, cseq) = CSeq::parse(input.as_ref(), &input).unwrap();

        assert_eq!(cseq.cseq, 2147483647);
    }

    #[test]
    fn cseq_overflow() {
        let input = BytesStr::from_static("2147483648 INVITE");

        assert!(CSeq::parse(input.as_ref(), &input).is_err());
    }

    #[test]
    fn cseq_print() {
        let cseq = CSeq::new(3487, Method::INVITE);

        assert_eq!(cseq.to_string(), "3487 INVITE");
    }
}
