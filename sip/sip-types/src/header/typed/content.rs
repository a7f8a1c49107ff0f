use crate::header::headers::OneOrMore;
use crate::header::{ConstNamed, ExtendValues, HeaderParse};
use crate::print::PrintCtx;
use crate::Name;
use bytes::Bytes;
use bytesstr::BytesStr;
use internal::IResult;
use std::fmt;

from_str_header!(
    /// `Content-Length` header
    ContentLength,
    Name::CONTENT_LENGTH,
    usize
);

/// `Content-Type` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType(pub BytesStr);

impl ConstNamed for ContentType {
    const NAME: Name = Name::CONTENT_TYPE;
}

impl HeaderParse for ContentType {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        Ok(("", Self(BytesStr::from_parse(src, i.trim()))))
    }
}

impl ExtendValues for ContentType {
    fn extend_values(&self, ctx: PrintCtx<'_>, values: &mut OneOrMore) {
        *values = self.create_values(ctx)
    }

    fn create_values(&self, _: PrintCtx<'_>) -> OneOrMore {
        OneOrMore::One(self.0.clone())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_length() {
        let input = BytesStr::from_static("341");

        let (rem, len) = ContentLength::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(len.0, 341);
    }

    #[test]
    fn content_type() {
        let input = BytesStr::from_static("application/sdp");

        let (rem, ct) = ContentType::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(ct.0, "application/sdp");
    }
}
