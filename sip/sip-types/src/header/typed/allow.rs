use crate::header::headers::OneOrMore;
use crate::header::{ConstNamed, ExtendValues, HeaderParse};
use crate::method::Method;
use crate::print::PrintCtx;
use crate::Name;
use bytes::Bytes;
use internal::IResult;
use nom::combinator::map;

/// `Allow` header, carries a single allowed method. Use [`Vec`] to access all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allow(pub Method);

impl ConstNamed for Allow {
    const NAME: Name = Name::ALLOW;
}

impl HeaderParse for Allow {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        map(Method::parse(src), Allow)(i.trim_start())
    }
}

impl ExtendValues for Allow {
    fn extend_values(&self, _: PrintCtx<'_>, values: &mut OneOrMore) {
        let value = match values {
            OneOrMore::One(value) => value,
            OneOrMore::More(values) => values.last_mut().expect("empty OneOrMore::More variant"),
        };

        *value = format!("{}, {}", value, self.0).into();
    }

    fn create_values(&self, _: PrintCtx<'_>) -> OneOrMore {
        OneOrMore::One(self.0.to_string().into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Headers;

    #[test]
    fn allow_csv() {
        let mut headers = Headers::new();
        headers.insert(Name::ALLOW, "INVITE, ACK, CANCEL, BYE");

        let allowed: Vec<Allow> = headers.get_named().unwrap();

        assert_eq!(
            allowed,
            vec![
                Allow(Method::INVITE),
                Allow(Method::ACK),
                Allow(Method::CANCEL),
                Allow(Method::BYE)
            ]
        );
    }

    #[test]
    fn allow_print() {
        let mut headers = Headers::new();
        headers.insert_named(&vec![Allow(Method::INVITE), Allow(Method::BYE)]);

        assert_eq!(headers.to_string(), "Allow: INVITE, BYE\r\n");
    }
}
