use super::consts::RFC3261_BRANCH_PREFIX;
use super::generate_branch;
use crate::BaseHeaders;
use anyhow::anyhow;
use bytesstr::BytesStr;
use sip_types::header::typed::{CSeq, Via};
use sip_types::header::HeaderError;
use sip_types::host::{Host, HostPort};
use sip_types::msg::MessageLine;
use sip_types::{Method, Name};
use std::fmt;

static EMPTY: BytesStr = BytesStr::empty();

/// Transaction key, used to match a message to an ongoing transaction
///
/// Can be generated new or created from an incoming message.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TsxKey(Repr);

impl fmt::Display for TsxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_server() {
            write!(f, "server:")?;
        } else {
            write!(f, "client:")?;
        }

        let method = match &self.0 {
            Repr::Rfc3261(repr) => repr.method.as_ref().unwrap_or(&Method::INVITE),
            Repr::Rfc2543(repr) => repr.method.as_ref().unwrap_or(&Method::INVITE),
        };

        write!(f, "{}:{}", self.branch(), method)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum Repr {
    Rfc3261(Rfc3261),
    Rfc2543(Box<Rfc2543>),
}

/// Fallback key for peers that do not use the RFC 3261 branch cookie
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Rfc2543 {
    role: Role,
    method: Option<Method>,
    cseq: u32,
    from_tag: BytesStr,
    call_id: BytesStr,
    via_host_port: HostPort,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Rfc3261 {
    role: Role,
    branch: BytesStr,
    method: Option<Method>,

    /// Server transactions additionally match on the top Via's sent-by,
    /// with the port defaulted by transport when absent
    sent_by: Option<(Host, u16)>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum Role {
    Server,
    Client,
}

// invite and ack are represented as None
// to match transaction-level ACK-requests to invite transactions
fn filter_method(method: &Method) -> Option<Method> {
    Some(method)
        .filter(|&m| !(matches!(m, &Method::INVITE | &Method::ACK)))
        .cloned()
}

/// Default port of the transport named in the Via header, used when
/// sent-by carries no explicit port
fn default_via_port(transport: &str) -> u16 {
    if transport.eq_ignore_ascii_case("TLS") {
        5061
    } else if transport.eq_ignore_ascii_case("WS") {
        80
    } else if transport.eq_ignore_ascii_case("WSS") {
        443
    } else {
        5060
    }
}

impl TsxKey {
    #[inline]
    pub fn is_server(&self) -> bool {
        match &self.0 {
            Repr::Rfc3261(rfc) => rfc.role == Role::Server,
            Repr::Rfc2543(rfc) => rfc.role == Role::Server,
        }
    }

    #[inline]
    pub fn is_invite(&self) -> bool {
        match &self.0 {
            Repr::Rfc3261(rfc) => rfc.method.is_none(),
            Repr::Rfc2543(rfc) => rfc.method.is_none(),
        }
    }

    /// Create a new client key with a freshly generated branch
    #[inline]
    pub fn client(method: &Method) -> Self {
        Self::client_with_branch(generate_branch(), method)
    }

    /// Create a client key reusing an existing branch.
    ///
    /// Used by CANCEL transactions which share the branch of the INVITE
    /// they cancel.
    #[inline]
    pub fn client_with_branch(branch: BytesStr, method: &Method) -> Self {
        TsxKey(Repr::Rfc3261(Rfc3261 {
            role: Role::Client,
            branch,
            method: filter_method(method),
            sent_by: None,
        }))
    }

    #[inline]
    pub fn branch(&self) -> &BytesStr {
        match &self.0 {
            Repr::Rfc3261(v) => &v.branch,
            Repr::Rfc2543(_) => &EMPTY,
        }
    }

    fn from_headers(headers: &BaseHeaders, role: Role) -> Result<Self, HeaderError> {
        let Via {
            transport,
            sent_by,
            params,
        } = headers.top_via();

        let branch = params.get_val("branch").unwrap_or(&EMPTY);

        let CSeq { method, cseq } = &headers.cseq;
        let method = filter_method(method);

        let repr = if branch.starts_with(RFC3261_BRANCH_PREFIX) {
            Repr::Rfc3261(Rfc3261 {
                branch: branch.clone(),
                method,
                sent_by: match role {
                    Role::Server => Some((
                        sent_by.host.clone(),
                        sent_by.port.unwrap_or_else(|| default_via_port(transport)),
                    )),
                    Role::Client => None,
                },
                role,
            })
        } else {
            Repr::Rfc2543(Box::new(Rfc2543 {
                role,
                method,
                cseq: *cseq,
                from_tag: headers
                    .from
                    .tag
                    .as_ref()
                    .ok_or_else(|| HeaderError::malformed(Name::FROM, anyhow!("missing tag")))?
                    .clone(),
                call_id: headers.call_id.0.clone(),
                via_host_port: sent_by.clone(),
            }))
        };

        Ok(TsxKey(repr))
    }

    /// Create a [`TsxKey`] from the line and headers of any message
    #[inline]
    pub fn from_message_parts(
        line: &MessageLine,
        headers: &BaseHeaders,
    ) -> Result<Self, HeaderError> {
        match &line {
            MessageLine::Request(_) => Self::from_headers(headers, Role::Server),
            MessageLine::Response(_) => Self::from_headers(headers, Role::Client),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sip_types::header::typed::{CallID, FromTo};
    use sip_types::msg::RequestLine;
    use sip_types::uri::{NameAddr, SipUri};

    fn base_headers(branch: &'static str, method: Method) -> BaseHeaders {
        let uri: SipUri = "sip:bob@example.com".parse().unwrap();

        let from = FromTo::new(NameAddr::uri(uri.clone()), Some("fromtag".into()));

        BaseHeaders {
            via: vec![Via::new("UDP", HostPort::host_name("client.example.com"), branch)],
            from,
            to: FromTo::new(NameAddr::uri(uri), None),
            call_id: CallID::new("callid"),
            cseq: CSeq::new(1, method),
        }
    }

    fn request_line(method: Method) -> MessageLine {
        MessageLine::Request(RequestLine {
            method,
            uri: "sip:bob@example.com".parse().unwrap(),
        })
    }

    #[test]
    fn ack_folds_onto_invite() {
        let invite = TsxKey::from_message_parts(
            &request_line(Method::INVITE),
            &base_headers("z9hG4bKabc", Method::INVITE),
        )
        .unwrap();

        let ack = TsxKey::from_message_parts(
            &request_line(Method::ACK),
            &base_headers("z9hG4bKabc", Method::ACK),
        )
        .unwrap();

        assert_eq!(invite, ack);
    }

    #[test]
    fn same_branch_different_method() {
        let invite = TsxKey::from_message_parts(
            &request_line(Method::INVITE),
            &base_headers("z9hG4bKabc", Method::INVITE),
        )
        .unwrap();

        let bye = TsxKey::from_message_parts(
            &request_line(Method::BYE),
            &base_headers("z9hG4bKabc", Method::BYE),
        )
        .unwrap();

        assert_ne!(invite, bye);
    }

    #[test]
    fn sent_by_distinguishes_server_keys() {
        let mut headers = base_headers("z9hG4bKabc", Method::INVITE);

        let a = TsxKey::from_message_parts(&request_line(Method::INVITE), &headers).unwrap();

        headers.via[0].sent_by = HostPort::host_name("other.example.com");

        let b = TsxKey::from_message_parts(&request_line(Method::INVITE), &headers).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn sent_by_port_defaults_by_transport() {
        let mut headers = base_headers("z9hG4bKabc", Method::INVITE);

        let defaulted = TsxKey::from_message_parts(&request_line(Method::INVITE), &headers).unwrap();

        headers.via[0].sent_by.port = Some(5060);

        let explicit = TsxKey::from_message_parts(&request_line(Method::INVITE), &headers).unwrap();

        assert_eq!(defaulted, explicit);
    }

    #[test]
    fn rfc2543_fallback() {
        let headers = base_headers("oldstylebranch", Method::INVITE);

        let key = TsxKey::from_message_parts(&request_line(Method::INVITE), &headers).unwrap();

        assert!(key.branch().is_empty());
        assert!(key.is_invite());
    }
}
