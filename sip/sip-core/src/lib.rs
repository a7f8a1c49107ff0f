//! Core part of the sipline SIP stack
//!
//! Implementing transport and transaction abstractions it can be used to
//! build any kind of stateful SIP application.

use bytes::Bytes;
use downcast_rs::{impl_downcast, Downcast};
use sip_types::header::typed::{CSeq, CallID, FromTo, Via};
use sip_types::header::HeaderError;
use sip_types::msg::{RequestLine, StatusLine};
use sip_types::print::AppendCtx;
use sip_types::uri::SipUri;
use sip_types::{Headers, Method, Name};
use std::fmt;
use transaction::TsxKey;
use transport::MessageTpInfo;

mod endpoint;
mod error;
mod may_take;
pub mod transaction;
pub mod transport;

pub use endpoint::Endpoint;
pub use endpoint::EndpointBuilder;
pub use endpoint::LayerKey;
pub use error::{Error, Result};
pub use may_take::MayTake;

/// Basic Response
#[derive(Debug)]
pub struct Response {
    pub line: StatusLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.line.default_print_ctx().fmt(f)
    }
}

/// Basic request
#[derive(Debug)]
pub struct Request {
    pub line: RequestLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.line.default_print_ctx().fmt(f)
    }
}

impl Request {
    /// Create an empty request
    pub fn new(method: Method, uri: SipUri) -> Self {
        Self {
            line: RequestLine { method, uri },
            headers: Default::default(),
            body: Bytes::new(),
        }
    }
}

/// Parsed SIP headers that are part of every message
#[derive(Debug)]
pub struct BaseHeaders {
    /// All via headers, guaranteed to not be empty
    pub via: Vec<Via>,
    pub from: FromTo,
    pub to: FromTo,
    pub call_id: CallID,
    pub cseq: CSeq,
}

impl BaseHeaders {
    pub(crate) fn extract_from(headers: &Headers) -> Result<Self, HeaderError> {
        let base = BaseHeaders {
            via: headers.get_named()?,
            from: headers.get(Name::FROM)?,
            to: headers.get(Name::TO)?,
            call_id: headers.get_named()?,
            cseq: headers.get_named()?,
        };

        if base.via.is_empty() {
            return Err(HeaderError::missing(Name::VIA));
        }

        Ok(base)
    }

    /// Returns the topmost via header
    pub fn top_via(&self) -> &Via {
        &self.via[0]
    }

    pub fn top_via_mut(&mut self) -> &mut Via {
        &mut self.via[0]
    }
}

/// Request received by the endpoint and passed to every layer
#[derive(Debug)]
pub struct IncomingRequest {
    pub tp_info: MessageTpInfo,
    pub tsx_key: TsxKey,

    pub line: RequestLine,
    pub base_headers: BaseHeaders,
    pub headers: Headers,
    pub body: Bytes,
}

impl fmt::Display for IncomingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.line.default_print_ctx().fmt(f)
    }
}

/// Layers are extensions to the endpoint.
///
/// They can be added to the endpoint in the building stage by calling
/// [`EndpointBuilder::add_layer`], and later be accessed via [`LayerKey`]s.
#[async_trait::async_trait]
pub trait Layer: Downcast + Send + Sync + 'static {
    /// Return a descriptive and unique name of the layer
    fn name(&self) -> &'static str;

    /// When building the endpoint each layer may make modifications to the [`EndpointBuilder`]
    fn init(&mut self, _endpoint: &mut EndpointBuilder) {}

    /// Whenever the endpoint receives a request which is outside any transaction,
    /// it will call this function on each layer (in insertion order).
    ///
    /// The message is wrapped inside a [`MayTake`] which allows the layer to inspect
    /// and modify the request or take ownership of it. If it takes the request the
    /// endpoint will no longer own the request and thus will not pass the request to
    /// the remaining layers.
    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>);
}

impl_downcast!(Layer);
