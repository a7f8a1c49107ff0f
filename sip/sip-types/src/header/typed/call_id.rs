use crate::header::headers::OneOrMore;
use crate::header::{ConstNamed, ExtendValues, HeaderParse};
use crate::print::PrintCtx;
use crate::Name;
use bytes::Bytes;
use bytesstr::BytesStr;
use internal::IResult;
use std::fmt;

/// `Call-ID` header, an opaque string identifying the call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallID(pub BytesStr);

impl CallID {
    #[inline]
    pub fn new<B>(call_id: B) -> Self
    where
        B: Into<BytesStr>,
    {
        Self(call_id.into())
    }
}

impl ConstNamed for CallID {
    const NAME: Name = Name::CALL_ID;
}

impl HeaderParse for CallID {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        Ok(("", Self(BytesStr::from_parse(src, i.trim()))))
    }
}

impl ExtendValues for CallID {
    fn extend_values(&self, ctx: PrintCtx<'_>, values: &mut OneOrMore) {
        *values = self.create_values(ctx)
    }

    fn create_values(&self, _: PrintCtx<'_>) -> OneOrMore {
        OneOrMore::One(self.0.clone())
    }
}

impl fmt::Display for CallID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn call_id() {
        let input = BytesStr::from_static(" 1j9FpLxk3uxtm8tn@biloxi.example.com ");

        let (rem, call_id) = CallID::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(call_id.0, "1j9FpLxk3uxtm8tn@biloxi.example.com");
    }
}
