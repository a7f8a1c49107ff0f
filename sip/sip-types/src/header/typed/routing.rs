use crate::print::{AppendCtx, Print, PrintCtx, UriContext};
use crate::uri::params::{Params, CPS};
use crate::uri::NameAddr;
use crate::Name;
use bytes::Bytes;
use internal::IResult;
use nom::combinator::map;
use nom::sequence::tuple;
use std::fmt;

/// Implementation for all Route-related headers.
#[derive(Debug, Clone)]
pub struct Routing {
    pub uri: NameAddr,
    pub params: Params<CPS>,
}

impl Routing {
    pub fn new(uri: NameAddr) -> Self {
        Self {
            uri,
            params: Params::new(),
        }
    }

    /// Returns whether the route is a loose router (contains the `lr` parameter)
    pub fn is_loose(&self) -> bool {
        self.uri.uri.uri_params.get("lr").is_some()
    }

    pub fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            map(
                tuple((NameAddr::parse_no_params(src), Params::<CPS>::parse(src))),
                |(uri, params)| Routing { uri, params },
            )(i)
        }
    }
}

impl crate::header::HeaderParse for Routing {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        Routing::parse(src)(i)
    }
}

impl Print for Routing {
    fn print(&self, f: &mut fmt::Formatter<'_>, mut ctx: PrintCtx<'_>) -> fmt::Result {
        ctx.uri = Some(UriContext::Routing);
        write!(f, "{}{}", self.uri.print_ctx(ctx), self.params)?;
        Ok(())
    }
}

impl_wrap_header!(
    /// `Route` header. Wraps [Routing].
    Routing,
    Route,
    CSV,
    Name::ROUTE
);

impl_wrap_header!(
    /// `Record-Route` header. Wraps [`Routing`]. Contains only one route. To get all routes use [`Vec`].
    Routing,
    RecordRoute,
    CSV,
    Name::RECORD_ROUTE
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::DecodeValues;
    use crate::host::Host;
    use crate::uri::{SipUri, UserPart};
    use bytesstr::BytesStr;
    use std::iter::once;

    #[test]
    fn routing() {
        let input = BytesStr::from_static(
            "<sip:bigbox3.site3.atlanta.com;lr>, <sip:server10.biloxi.com;lr>",
        );

        let (rem, routing) = Routing::parse(input.as_ref())(&input).unwrap();

        assert_eq!(rem, ", <sip:server10.biloxi.com;lr>");
        assert!(routing.params.is_empty());
        assert!(routing.uri.name.is_none());
        assert!(routing.is_loose());

        let sip_uri: &SipUri = &routing.uri.uri;

        assert!(!sip_uri.sips);
        assert!(sip_uri.header_params.is_empty());

        let lr = sip_uri.uri_params.get("lr").unwrap();
        assert!(lr.value.is_none());

        assert!(matches!(sip_uri.user_part, UserPart::Empty));
        assert!(
            matches!(&sip_uri.host_port.host, Host::Name(n) if n == "bigbox3.site3.atlanta.com")
        );
        assert!(sip_uri.host_port.port.is_none());
    }

    #[test]
    fn routing_multiple() {
        let input = BytesStr::from_static(
            "<sip:bigbox3.site3.atlanta.com;lr>, <sip:server10.biloxi.com;lr>",
        );
        let (_, routing) = Vec::<Route>::decode(&mut once(&input)).unwrap();

        assert_eq!(routing.len(), 2);
    }

    #[test]
    fn routing_print() {
        let routing = Routing {
            uri: NameAddr::uri(
                SipUri::new(crate::host::HostPort::host_name("bigbox3.site3.atlanta.com"))
                    .uri_param_key("lr"),
            ),
            params: Default::default(),
        };

        assert_eq!(
            routing.default_print_ctx().to_string(),
            "<sip:bigbox3.site3.atlanta.com;lr>"
        );
    }
}
