//! SIP URI, its parameters and the name-addr form

use crate::host::HostPort;
use crate::method::Method;
use crate::print::{AppendCtx, Print, PrintCtx, UriContext};
use bytes::Bytes;
use bytesstr::BytesStr;
use internal::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while};
use nom::combinator::{map, map_res, opt};
use nom::sequence::{preceded, terminated, tuple};
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet};
use std::borrow::Cow;
use std::fmt;
use std::str::{FromStr, Utf8Error};
use thiserror::Error;

pub mod params;
mod name_addr;

pub use name_addr::NameAddr;

use params::{Params, CPS, HPS};

#[derive(Debug, Clone, PartialEq)]
pub struct UserPw {
    pub user: BytesStr,
    pub password: BytesStr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserPart {
    Empty,
    User(BytesStr),
    // Boxed because deprecated and rarely used
    UserPw(Box<UserPw>),
}

/// A `sip:`/`sips:` URI, or the `*` wildcard form found in Contact headers
#[derive(Clone)]
pub struct SipUri {
    pub sips: bool,
    pub wildcard: bool,

    pub user_part: UserPart,
    pub host_port: HostPort,

    pub uri_params: Params<CPS>,
    pub header_params: Params<HPS>,
}

impl SipUri {
    pub fn new(host_port: HostPort) -> Self {
        SipUri {
            sips: false,
            wildcard: false,
            user_part: UserPart::Empty,
            host_port,
            uri_params: Params::new(),
            header_params: Params::new(),
        }
    }

    /// Returns the `*` URI, only valid inside a Contact header
    pub fn wildcard() -> Self {
        SipUri {
            wildcard: true,
            ..SipUri::new(HostPort::host_name("*"))
        }
    }

    crate::impl_with_params!(uri_params, uri_param_key, uri_param_value);

    pub const fn sips(mut self, sips: bool) -> Self {
        self.sips = sips;
        self
    }

    pub fn set_user(&mut self, user: BytesStr) {
        match &mut self.user_part {
            UserPart::Empty => {
                self.user_part = UserPart::User(user);
            }
            UserPart::User(old) => *old = user,
            UserPart::UserPw(old) => old.user = user,
        }
    }

    pub fn user(mut self, user: BytesStr) -> Self {
        self.set_user(user);
        self
    }

    /// URI comparison following RFC 3261 Section 19.1.4.
    ///
    /// Scheme and host are compared case-insensitively, user and password
    /// case-sensitively. Parameters appearing in both URIs must agree, and
    /// `transport`, `user`, `ttl`, `method` and `maddr` may not appear in
    /// only one of the two.
    pub fn compare(&self, other: &Self) -> bool {
        if self.wildcard || other.wildcard {
            return self.wildcard == other.wildcard;
        }

        if self.sips != other.sips
            || self.user_part != other.user_part
            || !self.host_port.host.compare(&other.host_port.host)
            || self.host_port.port != other.host_port.port
        {
            return false;
        }

        const ONE_SIDED_MISMATCH: [&str; 5] = ["transport", "user", "ttl", "method", "maddr"];

        for name in ONE_SIDED_MISMATCH {
            let a = self.uri_params.get(name);
            let b = other.uri_params.get(name);

            match (a, b) {
                (None, None) => {}
                (Some(a), Some(b)) => {
                    if !param_value_eq(a.value.as_ref(), b.value.as_ref()) {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        for param in self.uri_params.iter() {
            if let Some(other_param) = other.uri_params.get(&param.name) {
                if !param_value_eq(param.value.as_ref(), other_param.value.as_ref()) {
                    return false;
                }
            }
        }

        true
    }

    /// Returns the routing relevant information of this URI
    pub fn info(&self) -> UriInfo<'_> {
        UriInfo {
            transport: self.uri_params.get_val("transport").map(BytesStr::as_str),
            secure: self.sips,
            host_port: &self.host_port,
        }
    }
}

fn param_value_eq(a: Option<&BytesStr>, b: Option<&BytesStr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl fmt::Debug for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print_ctx(PrintCtx::default()))
    }
}

impl Print for SipUri {
    fn print(&self, f: &mut fmt::Formatter<'_>, ctx: PrintCtx<'_>) -> fmt::Result {
        use fmt::Display;

        if self.wildcard {
            return f.write_str("*");
        }

        if self.sips {
            write!(f, "sips:")?;
        } else {
            write!(f, "sip:")?;
        }

        match &self.user_part {
            UserPart::Empty => {}
            UserPart::User(user) => write!(f, "{}@", percent_encode(user.as_ref(), &USER_SET))?,
            UserPart::UserPw(user_pw) => {
                write!(
                    f,
                    "{}:{}@",
                    percent_encode(user_pw.user.as_ref(), &USER_SET),
                    user_pw.password
                )?;
            }
        }

        write!(f, "{}", self.host_port.print_ctx(ctx))?;

        match (ctx.uri, &ctx.method) {
            (Some(UriContext::ReqUri), _) => write!(f, "{}", self.uri_params),
            (Some(UriContext::FromTo), _) => self
                .uri_params
                .filtered_print(|name| !matches!(name, "maddr" | "ttl" | "transport" | "lr"))
                .fmt(f),
            (Some(UriContext::Contact), Some(&Method::REGISTER)) => {
                self.uri_params
                    .filtered_print(|name| !matches!(name, "lr"))
                    .fmt(f)?;

                self.header_params.fmt(f)
            }
            (Some(UriContext::Contact | UriContext::Routing), _) => self
                .uri_params
                .filtered_print(|name| !matches!(name, "ttl"))
                .fmt(f),
            _ => {
                self.uri_params.fmt(f)?;
                self.header_params.fmt(f)
            }
        }
    }
}

encode_set!(user, USER_SET);

fn user(c: char) -> bool {
    lookup_table!(c => alpha; num; '-', '_', '.', '!', '~', '*', '\'', '(', ')', '%', '&', '=', '+', '$', ',', ';', '?', '/')
}

fn password(c: char) -> bool {
    lookup_table!(c => alpha; num; '-', '_', '.', '!', '~', '*', '\'', '(', ')', '%', '&', '=', '+', '$', ',')
}

impl SipUri {
    pub fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            map_res(
                tuple((
                    parse_scheme,
                    parse_user_pw,
                    HostPort::parse(src),
                    Params::<CPS>::parse(src),
                    Params::<HPS>::parse(src),
                )),
                |(sips, user_pw, host_port, uri_params, header_params)| -> Result<SipUri, Utf8Error> {
                    let user_part = user_part(src, user_pw)?;

                    Ok(SipUri {
                        sips,
                        wildcard: false,
                        user_part,
                        host_port,
                        uri_params,
                        header_params,
                    })
                },
            )(i)
        }
    }

    pub fn parse_no_params(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            map_res(
                tuple((parse_scheme, parse_user_pw, HostPort::parse(src))),
                |(sips, user_pw, host_port)| -> Result<SipUri, Utf8Error> {
                    let user_part = user_part(src, user_pw)?;

                    Ok(SipUri {
                        sips,
                        wildcard: false,
                        user_part,
                        host_port,
                        uri_params: Params::new(),
                        header_params: Params::new(),
                    })
                },
            )(i)
        }
    }
}

fn user_part(src: &Bytes, user_pw: Option<(&str, Option<&str>)>) -> Result<UserPart, Utf8Error> {
    if let Some((user, password)) = user_pw {
        let user = match percent_decode_str(user).decode_utf8()? {
            Cow::Borrowed(slice) => BytesStr::from_parse(src, slice),
            Cow::Owned(owned) => BytesStr::from(owned),
        };

        if let Some(pw) = password {
            Ok(UserPart::UserPw(Box::new(UserPw {
                user,
                password: BytesStr::from_parse(src, pw),
            })))
        } else {
            Ok(UserPart::User(user))
        }
    } else {
        Ok(UserPart::Empty)
    }
}

fn parse_scheme(i: &str) -> IResult<&str, bool> {
    alt((
        map(tag_no_case("sips:"), |_| true),
        map(tag_no_case("sip:"), |_| false),
    ))(i)
}

fn parse_user_pw(i: &str) -> IResult<&str, Option<(&str, Option<&str>)>> {
    opt(terminated(
        tuple((
            take_while(user),
            opt(preceded(tag(":"), take_while(password))),
        )),
        tag("@"),
    ))(i)
}

/// The routing relevant parts of a [`SipUri`]
pub struct UriInfo<'i> {
    /// URIs can specify a specific transport
    pub transport: Option<&'i str>,

    /// The URI __must__ be used in a secure context
    pub secure: bool,

    /// [`HostPort`] part of the uri
    pub host_port: &'i HostPort,
}

impl UriInfo<'_> {
    pub fn allows_security_level(&self, secure: bool) -> bool {
        if self.secure {
            secure
        } else {
            true
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid sip uri")]
pub struct InvalidSipUri(());

impl FromStr for SipUri {
    type Err = InvalidSipUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = BytesStr::from(s);

        let parser = Self::parse(s.as_ref());

        parser(s.as_ref())
            .map(|(_, uri)| uri)
            .map_err(|_| InvalidSipUri(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::host::Host;

    #[test]
    fn uri_full() {
        let input =
            BytesStr::from_static("sips:bob:hunter2@example.com:5061;transport=tcp?subject=call");

        let (rem, uri) = SipUri::parse(input.as_ref())(&input).unwrap();

        assert!(rem.is_empty());
        assert!(uri.sips);

        match &uri.user_part {
            UserPart::UserPw(user_pw) => {
                assert_eq!(user_pw.user, "bob");
                assert_eq!(user_pw.password, "hunter2");
            }
            other => panic!("{:?}", other),
        }

        assert!(matches!(&uri.host_port.host, Host::Name(n) if n == "example.com"));
        assert_eq!(uri.host_port.port, Some(5061));
        assert_eq!(uri.uri_params.get_val("transport").unwrap(), "tcp");
        assert_eq!(uri.header_params.get_val("subject").unwrap(), "call");
    }

    #[test]
    fn uri_round_trip() {
        let input = "sip:alice@example.com:5060;lr;maddr=10.0.0.1?priority=urgent";
        let uri: SipUri = input.parse().unwrap();

        let printed = uri.default_print_ctx().to_string();
        let reparsed: SipUri = printed.parse().unwrap();

        assert!(uri.compare(&reparsed));
        assert_eq!(printed, input);
    }

    #[test]
    fn uri_compare_host_case() {
        let a: SipUri = "sip:alice@Example.COM".parse().unwrap();
        let b: SipUri = "sip:alice@example.com".parse().unwrap();

        assert!(a.compare(&b));
    }

    #[test]
    fn uri_compare_user_case_sensitive() {
        let a: SipUri = "sip:Alice@example.com".parse().unwrap();
        let b: SipUri = "sip:alice@example.com".parse().unwrap();

        assert!(!a.compare(&b));
    }

    #[test]
    fn uri_compare_one_sided_transport() {
        let a: SipUri = "sip:alice@example.com;transport=tcp".parse().unwrap();
        let b: SipUri = "sip:alice@example.com".parse().unwrap();

        assert!(!a.compare(&b));
    }

    #[test]
    fn uri_compare_unrelated_param_ignored() {
        let a: SipUri = "sip:alice@example.com;foo=bar".parse().unwrap();
        let b: SipUri = "sip:alice@example.com".parse().unwrap();

        assert!(a.compare(&b));
    }

    #[test]
    fn uri_wildcard_print() {
        let uri = SipUri::wildcard();

        assert_eq!(uri.default_print_ctx().to_string(), "*");
    }
}
