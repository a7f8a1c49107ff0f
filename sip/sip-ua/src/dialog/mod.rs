use crate::dialog::layer::DialogEntry;
use bytesstr::BytesStr;
use sip_core::transport::{OutgoingResponse, TargetTransportInfo};
use sip_core::{Endpoint, IncomingRequest, LayerKey, Request, Result};
use sip_types::header::typed::{CSeq, CallID, Contact, FromTo, Route, Routing};
use sip_types::print::AppendCtx;
use sip_types::uri::NameAddr;
use sip_types::{Code, Method, Name};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

mod client_builder;
mod key;
mod layer;

pub use client_builder::ClientDialogBuilder;
pub use key::DialogKey;
pub use layer::{register_usage, DialogError, DialogLayer, Usage, UsageGuard};

/// Life stage of a dialog, readable without locking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DialogStateKind {
    /// Created but not yet accepted with a final response
    Early = 0,

    /// A 2XX response was sent/received
    Established = 1,

    /// The 2XX response was acknowledged
    Confirmed = 2,

    /// BYE was sent/received or the INVITE failed
    Ended = 3,
}

/// Current [`DialogStateKind`] stored as an atomic
#[derive(Debug)]
pub struct DialogState(AtomicU8);

impl DialogState {
    pub fn new(kind: DialogStateKind) -> Self {
        Self(AtomicU8::new(kind as u8))
    }

    pub fn get(&self) -> DialogStateKind {
        match self.0.load(Ordering::Relaxed) {
            0 => DialogStateKind::Early,
            1 => DialogStateKind::Established,
            2 => DialogStateKind::Confirmed,
            _ => DialogStateKind::Ended,
        }
    }

    pub fn set(&self, kind: DialogStateKind) {
        self.0.store(kind as u8, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct Dialog {
    pub endpoint: Endpoint,

    dialog_layer: LayerKey<DialogLayer>,

    /// Current stage of the dialog
    pub state: Arc<DialogState>,

    /// Next CSeq number for requests constructed using this dialog
    pub local_cseq: u32,

    /// Remote CSeq number as seen in the first request, if any
    pub peer_cseq: Option<u32>,

    /// From header used to construct requests inside the dialog
    ///
    /// All dialog code assumes that the tag is some
    pub local_fromto: FromTo,

    /// To header used to construct requests inside the dialog
    ///
    /// Tag may be `None` to provide backwards compatibility
    pub peer_fromto: FromTo,

    /// Local Contact header, used to construct requests inside the dialog
    pub local_contact: Contact,

    /// Remote Contact header, its URI is the remote target of the dialog
    pub peer_contact: Contact,

    /// CallID of the Dialog which is part of the dialog key
    pub call_id: CallID,

    /// Dialog's Route set. For UAC dialogs this is the reversed
    /// Record-Route set of the dialog forming exchange, for UAS dialogs it
    /// is kept in message order.
    pub route_set: Vec<Routing>,

    /// Was a secure transport used to construct this dialog
    pub secure: bool,

    /// Cached transport/destination of the peer
    pub target_tp_info: Mutex<TargetTransportInfo>,
}

impl Dialog {
    /// Create a dialog from an incoming request (may be early).
    ///
    /// Expects the To-tag of the request to already be set.
    pub fn new_server(
        endpoint: Endpoint,
        dialog_layer: LayerKey<DialogLayer>,
        invite: &IncomingRequest,
        local_contact: Contact,
    ) -> Result<Self> {
        assert!(invite.base_headers.to.tag.is_some());

        let peer_contact: Contact = invite.headers.get_named()?;

        let route_set: Vec<Routing> = invite
            .headers
            .get(Name::RECORD_ROUTE)
            .unwrap_or_default();

        let dialog = Self {
            endpoint,
            dialog_layer,
            state: Arc::new(DialogState::new(DialogStateKind::Early)),
            local_cseq: random_cseq(),
            peer_cseq: Some(invite.base_headers.cseq.cseq),

            // On server dialogs the from/to headers are reversed
            // since they are taken from an incoming request
            local_fromto: invite.base_headers.to.clone(),
            peer_fromto: invite.base_headers.from.clone(),
            local_contact,
            peer_contact,
            call_id: invite.base_headers.call_id.clone(),
            route_set,
            secure: invite.line.uri.sips,
            target_tp_info: Mutex::new(TargetTransportInfo::default()),
        };

        let entry = DialogEntry::new(dialog.peer_cseq);

        dialog.endpoint[dialog_layer]
            .dialogs
            .lock()
            .insert(dialog.key(), entry);

        Ok(dialog)
    }

    /// Create a key that the dialog can be identified with
    pub fn key(&self) -> DialogKey {
        DialogKey {
            call_id: self.call_id.0.clone(),
            peer_tag: self.peer_fromto.tag.clone(),
            local_tag: self
                .local_fromto
                .tag
                .clone()
                .expect("local_fromto always has a tag"),
        }
    }

    /// Register a usage to this dialog, receiving the requests matching the dialog
    pub fn register_usage<U>(&self, usage: U) -> Option<UsageGuard>
    where
        U: Usage,
    {
        register_usage(
            self.endpoint.clone(),
            self.dialog_layer,
            self.key(),
            usage,
        )
    }

    /// Create an in-dialog request.
    ///
    /// The route set decides the request target: with a loose first route
    /// the request-URI stays the remote target and the routes travel in
    /// Route headers, with a strict first route that route becomes the
    /// request-URI and the remote target is appended to the route set.
    pub fn create_request(&mut self, method: Method) -> Request {
        // ACK and CANCEL reuse the sequence number of the request they
        // belong to, all other requests consume a fresh one
        let cseq = if matches!(method, Method::ACK | Method::CANCEL) {
            CSeq::new(self.local_cseq - 1, method.clone())
        } else {
            let cseq = CSeq::new(self.local_cseq, method.clone());
            self.local_cseq += 1;
            cseq
        };

        let mut uri = self.peer_contact.uri.uri.clone();
        let mut routes = self.route_set.clone();

        if let Some(first) = routes.first() {
            if !first.is_loose() {
                let first = routes.remove(0);
                routes.push(Routing::new(NameAddr::uri(uri)));
                uri = first.uri.uri;
            }
        }

        let mut request = Request::new(method.clone(), uri);

        request.headers.insert(
            Name::FROM,
            self.local_fromto.default_print_ctx().to_string(),
        );
        request
            .headers
            .insert(Name::TO, self.peer_fromto.default_print_ctx().to_string());
        request.headers.insert_named(&self.call_id);
        request.headers.insert_named(&cseq);

        if !routes.is_empty() {
            let routes: Vec<Route> = routes.into_iter().map(Route).collect();

            request.headers.insert_named(&routes);
        }

        if method == Method::INVITE {
            request.headers.insert_named(&self.local_contact);
        }

        request
    }

    /// Create a response to a request received inside this dialog
    pub fn create_response(
        &self,
        request: &IncomingRequest,
        code: Code,
        reason: Option<BytesStr>,
    ) -> Result<OutgoingResponse> {
        let mut response = self.endpoint.create_response(request, code, reason);

        if request.line.method == Method::INVITE {
            let code = code.into_u16();

            if let 101..=399 | 485 = code {
                if !response.msg.headers.contains(&Name::CONTACT) {
                    response.msg.headers.insert_named(&self.local_contact);
                }
            }

            if let 180..=189 | 200..=299 | 405 = code {
                if !self.endpoint.allowed().is_empty() {
                    response.msg.headers.insert_named(self.endpoint.allowed());
                }
            }
        }

        Ok(response)
    }
}

fn random_cseq() -> u32 {
    use rand::Rng;

    rand::rng().random_range(0..(u32::MAX >> 1))
}

impl Drop for Dialog {
    fn drop(&mut self) {
        self.endpoint[self.dialog_layer]
            .dialogs
            .lock()
            .remove(&self.key());
    }
}

impl fmt::Display for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sip_types::header::typed::Route;
    use sip_types::uri::SipUri;

    fn route(s: &str) -> Routing {
        let s = BytesStr::from(s);

        let parser = Routing::parse(s.as_ref());

        parser(&s).unwrap().1
    }

    fn test_dialog(route_set: Vec<Routing>) -> Dialog {
        let mut builder = Endpoint::builder();
        let dialog_layer = builder.add_layer(DialogLayer::default());
        let endpoint = builder.build();

        let local_uri: SipUri = "sip:alice@example.com".parse().unwrap();
        let peer_uri: SipUri = "sip:bob@example.com".parse().unwrap();
        let peer_target: SipUri = "sip:bob@192.0.2.5".parse().unwrap();
        let local_target: SipUri = "sip:alice@10.0.0.1".parse().unwrap();

        Dialog {
            endpoint,
            dialog_layer,
            state: Arc::new(DialogState::new(DialogStateKind::Established)),
            local_cseq: 10,
            peer_cseq: None,
            local_fromto: FromTo::new(NameAddr::uri(local_uri), Some("localtag".into())),
            peer_fromto: FromTo::new(NameAddr::uri(peer_uri), Some("peertag".into())),
            local_contact: Contact::new(NameAddr::uri(local_target)),
            peer_contact: Contact::new(NameAddr::uri(peer_target)),
            call_id: CallID::new("test-call-id"),
            route_set,
            secure: false,
            target_tp_info: Mutex::new(TargetTransportInfo::default()),
        }
    }

    #[test]
    fn in_dialog_request_without_route_set() {
        let mut dialog = test_dialog(vec![]);

        let request = dialog.create_request(Method::BYE);

        assert!(request.line.uri.compare(&"sip:bob@192.0.2.5".parse().unwrap()));
        assert!(!request.headers.contains(&Name::ROUTE));
        assert_eq!(request.headers.get_named::<CSeq>().unwrap().cseq, 10);
        assert_eq!(dialog.local_cseq, 11);
    }

    #[test]
    fn in_dialog_request_loose_routing() {
        let mut dialog = test_dialog(vec![
            route("<sip:p1.example.com;lr>"),
            route("<sip:p2.example.com;lr>"),
        ]);

        let request = dialog.create_request(Method::BYE);

        // the remote target stays in the request-uri
        assert!(request.line.uri.compare(&"sip:bob@192.0.2.5".parse().unwrap()));

        let routes: Vec<Route> = request.headers.get_named().unwrap();

        assert_eq!(routes.len(), 2);
        assert!(routes[0]
            .uri
            .uri
            .compare(&"sip:p1.example.com;lr".parse().unwrap()));
        assert!(routes[1]
            .uri
            .uri
            .compare(&"sip:p2.example.com;lr".parse().unwrap()));
    }

    #[test]
    fn in_dialog_request_strict_routing() {
        let mut dialog = test_dialog(vec![
            route("<sip:p1.example.com>"),
            route("<sip:p2.example.com;lr>"),
        ]);

        let request = dialog.create_request(Method::BYE);

        // the first route becomes the request-uri
        assert!(request.line.uri.compare(&"sip:p1.example.com".parse().unwrap()));

        let routes: Vec<Route> = request.headers.get_named().unwrap();

        // remaining routes followed by the remote target
        assert_eq!(routes.len(), 2);
        assert!(routes[0]
            .uri
            .uri
            .compare(&"sip:p2.example.com;lr".parse().unwrap()));
        assert!(routes[1].uri.uri.compare(&"sip:bob@192.0.2.5".parse().unwrap()));
    }

    #[test]
    fn ack_reuses_sequence_number() {
        let mut dialog = test_dialog(vec![]);

        let invite = dialog.create_request(Method::INVITE);
        let ack = dialog.create_request(Method::ACK);
        let bye = dialog.create_request(Method::BYE);

        let invite_cseq = invite.headers.get_named::<CSeq>().unwrap().cseq;
        let ack_cseq = ack.headers.get_named::<CSeq>().unwrap().cseq;
        let bye_cseq = bye.headers.get_named::<CSeq>().unwrap().cseq;

        assert_eq!(invite_cseq, ack_cseq);
        assert_eq!(bye_cseq, invite_cseq + 1);
    }
}
