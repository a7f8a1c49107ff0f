use crate::parse::token;
use bytes::Bytes;
use bytesstr::BytesStr;
use internal::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while};
use nom::combinator::map;
use std::fmt;

/// Represents a SIP-Method.
///
/// Well known methods are available as constants, anything else is carried
/// verbatim.
///
/// # Example
///
/// ```
/// use sip_types::Method;
///
/// let _invite_method = Method::INVITE;
///
/// // custom methods can be also used:
/// let _custom_method = Method::from("HELLO");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Method(Repr);

macro_rules! methods {
    ($($print:literal, $ident:ident;)+) => {

        #[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[allow(clippy::upper_case_acronyms)]
        enum Repr {
            $($ident,)+
            Other(BytesStr),
        }

        impl Method {
            $(pub const $ident : Self = Self(Repr :: $ident );)+

            fn from_parse(src: &Bytes, slice: &str) -> Self {
                if let Ok((_, repr)) = alt((
                   $(
                   map(tag_no_case($print), |_| Repr::$ident),
                   )*
                ))(slice) as IResult<&str, Repr> {
                    Self(repr)
                } else {
                    Self(Repr::Other(BytesStr::from_parse(src, slice)))
                }
            }
        }

        impl fmt::Display for Method {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.0 {
                   $(Repr:: $ident => f.write_str($print),)+
                    Repr::Other(other) => f.write_str(other),
                }
            }
        }
    };
}

methods! {
    "INVITE",      INVITE;
    "ACK",         ACK;
    "CANCEL",      CANCEL;
    "BYE",         BYE;
    "REGISTER",    REGISTER;
    "MESSAGE",     MESSAGE;
    "UPDATE",      UPDATE;
    "OPTIONS",     OPTIONS;
}

impl Method {
    /// returns an nom-compatible method-parser
    pub fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| map(take_while(token), |slice| Self::from_parse(src, slice))(i)
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        let s = BytesStr::from(s);

        Self::from_parse(s.as_ref(), s.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::Method;
    use bytesstr::BytesStr;

    #[test]
    fn invite_method() {
        let input = BytesStr::from_static("INVITE");

        assert_eq!(
            Method::parse(input.as_ref())(&input[..]).unwrap(),
            ("", Method::INVITE)
        );

        assert_eq!(Method::INVITE.to_string(), "INVITE");
    }

    #[test]
    fn method_case_insensitive(){
        let input = BytesStr::from_static("invite");

        let (rem, method) = Method::parse(input.as_ref())(&input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(method, Method::INVITE);
    }

    #[test]
    fn other_method() {
        let input = BytesStr::from_static("SOMEOBSCUREMETHOD");

        let (rem, method) = Method::parse(input.as_ref())(&input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(method, Method::from("SOMEOBSCUREMETHOD"));
        assert_eq!(method.to_string(), "SOMEOBSCUREMETHOD");
    }
}
