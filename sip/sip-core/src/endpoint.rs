use crate::error::Error;
use crate::transaction::{
    ClientInvTsx, ClientTsx, ServerInvTsx, ServerTsx, TransactionTimers, Transactions, TsxKey,
    TsxMessage,
};
use crate::transport::resolver::Resolver;
use crate::transport::{
    Direction, Factory, OutgoingParts, OutgoingRequest, OutgoingResponse, ReceivedMessage,
    TargetTransportInfo, TpHandle, Transport, Transports, TransportsBuilder,
};
use crate::{BaseHeaders, IncomingRequest, Layer, MayTake, Request, Response, Result};
use bytes::{Bytes, BytesMut};
use bytesstr::BytesStr;
use sip_types::header::typed::{Allow, Via};
use sip_types::host::{Host, HostPort};
use sip_types::msg::{MessageLine, StatusLine};
use sip_types::print::{AppendCtx, BytesPrint, PrintCtx};
use sip_types::{Code, Headers, Method, Name};
use std::fmt::Write;
use std::marker::PhantomData;
use std::mem::take;
use std::net::{IpAddr, SocketAddr};
use std::ops::Index;
use std::sync::Arc;
use std::{fmt, io};
use tokio::sync::broadcast;
use tracing::Instrument;

/// The endpoint is the centerpiece of the sip stack. It contains all information about the
/// application and a stack of layered modules which build the logic of SIP applications and
/// its extensions.
///
/// It being a wrapper of a `Arc<Inner>` (where `Inner` is an internal struct) makes it relatively
/// cheap to clone and store where needed, but sometimes tricky to store as the endpoint may never
/// contain itself to avoid cyclic references.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("inner_refcount", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

struct Inner {
    // capabilities
    allow: Vec<Allow>,

    timers: TransactionTimers,

    transports: Transports,
    transactions: Transactions,

    layer: Box<[Box<dyn Layer>]>,
}

impl Endpoint {
    /// Construct a new [`EndpointBuilder`]
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// Returns the endpoint's immutable transaction timer configuration
    pub fn timers(&self) -> &TransactionTimers {
        &self.inner.timers
    }

    /// Sends an INVITE request and return a [`ClientInvTsx`] which MUST be used to drive the transaction
    pub async fn send_invite(
        &self,
        request: Request,
        target: &mut TargetTransportInfo,
    ) -> Result<ClientInvTsx> {
        ClientInvTsx::send(self.clone(), request, target).await
    }

    /// Sends a request and return a [`ClientTsx`] which MUST be used to drive the transaction
    pub async fn send_request(
        &self,
        request: Request,
        target: &mut TargetTransportInfo,
    ) -> Result<ClientTsx> {
        ClientTsx::send(self.clone(), request, target).await
    }

    /// Create a [`ServerTsx`] from an [`IncomingRequest`]. The returned transaction
    /// can be used to form and send responses to the request.
    pub fn create_server_tsx(&self, request: &IncomingRequest) -> ServerTsx {
        ServerTsx::new(self.clone(), request)
    }

    /// Create a [`ServerInvTsx`] from an INVITE [`IncomingRequest`]. The returned transaction
    /// can be used to form and send responses to the request.
    pub fn create_server_inv_tsx(&self, request: &IncomingRequest) -> ServerInvTsx {
        ServerInvTsx::new(self.clone(), request)
    }

    /// Returns all ALLOW headers this endpoint supports
    pub fn allowed(&self) -> &Vec<Allow> {
        &self.inner.allow
    }

    /// Create a VIA header with the given transport and transaction key
    pub fn create_via(
        &self,
        transport: &TpHandle,
        tsx_key: &TsxKey,
        via_host_port: Option<HostPort>,
    ) -> Via {
        Via::new(
            transport.name(),
            via_host_port.unwrap_or_else(|| transport.sent_by().into()),
            tsx_key.branch().clone(),
        )
    }

    /// Takes a request and converts it into an [`OutgoingRequest`].
    /// To do so it calculates the destination and retrieves a suitable transport
    pub async fn create_outgoing(
        &self,
        request: Request,
        target: &mut TargetTransportInfo,
    ) -> Result<OutgoingRequest> {
        let cached = match (&target.transport, target.destination.is_empty()) {
            (Some(transport), false) => Some((transport.clone(), target.destination.clone())),
            _ => None,
        };

        let (transport, destination) = match cached {
            Some(cached) => cached,
            None => {
                let (transport, destination) =
                    self.transports().select(self, &request.line.uri).await?;

                target.transport = Some(transport.clone());
                target.destination = destination.clone();

                (transport, destination)
            }
        };

        Ok(OutgoingRequest {
            msg: request,
            parts: OutgoingParts {
                transport,
                destination,
                buffer: Default::default(),
            },
        })
    }

    /// Print the request to its buffer (if needed) and send it via the transport
    pub async fn send_outgoing_request(&self, message: &mut OutgoingRequest) -> Result<()> {
        if message.parts.buffer.is_empty() {
            let mut buffer = BytesMut::new();

            let ctx = PrintCtx {
                method: Some(&message.msg.line.method),
                uri: None,
            };

            message
                .msg
                .headers
                .insert(Name::CONTENT_LENGTH, message.msg.body.len().to_string());

            write!(
                buffer,
                "{}\r\n{}\r\n",
                message.msg.line.print_ctx(ctx),
                message.msg.headers
            )
            .map_err(io::Error::other)?;

            buffer.extend_from_slice(&message.msg.body);

            message.parts.buffer = buffer.freeze();
        }

        self.check_payload_size(&message.parts)?;

        let target = message.parts.destination[0];

        log::trace!(
            "Sending request via {} ({} -> {})\n{:?}",
            message.parts.transport.name(),
            message.parts.transport.bound(),
            target,
            BytesPrint(&message.parts.buffer)
        );

        message
            .parts
            .transport
            .send(&message.parts.buffer, &message.parts.destination)
            .await?;

        Ok(())
    }

    /// Print the response to its buffer (if needed) and send it via the transport
    pub async fn send_outgoing_response(&self, message: &mut OutgoingResponse) -> Result<()> {
        if message.parts.buffer.is_empty() {
            let mut buffer = BytesMut::new();

            let ctx = PrintCtx {
                method: None,
                uri: None,
            };

            message
                .msg
                .headers
                .insert(Name::CONTENT_LENGTH, message.msg.body.len().to_string());

            write!(
                buffer,
                "{}\r\n{}\r\n",
                message.msg.line.print_ctx(ctx),
                message.msg.headers
            )
            .map_err(io::Error::other)?;

            buffer.extend_from_slice(&message.msg.body);

            message.parts.buffer = buffer.freeze();
        }

        self.check_payload_size(&message.parts)?;

        let target = message.parts.destination[0];

        log::trace!(
            "Sending response via {} ({} -> {})\n{:?}",
            message.parts.transport.name(),
            message.parts.transport.bound(),
            target,
            BytesPrint(&message.parts.buffer)
        );

        message
            .parts
            .transport
            .send(&message.parts.buffer, &message.parts.destination)
            .await?;

        Ok(())
    }

    fn check_payload_size(&self, parts: &OutgoingParts) -> Result<()> {
        if let Some(limit) = parts.transport.max_payload_size() {
            if parts.buffer.len() > limit {
                return Err(Error::MessageTooLarge {
                    size: parts.buffer.len(),
                    limit,
                });
            }
        }

        Ok(())
    }

    /// Create a response to an incoming request with a given status code and optional reason.
    ///
    /// Copies all Via headers, From, To, Call-ID, CSeq and Record-Route of
    /// the request. A 100 response never carries a To-tag, any other
    /// response gets a fresh one if the request's To had none.
    pub fn create_response(
        &self,
        request: &IncomingRequest,
        code: Code,
        reason: Option<BytesStr>,
    ) -> OutgoingResponse {
        assert_ne!(request.line.method, Method::ACK);

        let mut headers = Headers::with_capacity(5);

        headers.insert_named(&request.base_headers.via);

        let mut to = request.base_headers.to.clone();

        if code == Code::TRYING {
            to.tag = None;
        } else if to.tag.is_none() {
            to.tag = Some(generate_tag());
        }

        headers.insert(
            Name::FROM,
            request.base_headers.from.default_print_ctx().to_string(),
        );
        headers.insert(Name::TO, to.default_print_ctx().to_string());
        headers.insert_named(&request.base_headers.call_id);
        headers.insert_named(&request.base_headers.cseq);

        // mirror the record-route set on dialog forming responses
        let _ = request
            .headers
            .clone_into(&mut headers, Name::RECORD_ROUTE);

        let destination = response_destination(request);

        OutgoingResponse {
            msg: Response {
                line: StatusLine {
                    code,
                    reason: reason.or_else(|| code.text().map(BytesStr::from_static)),
                },
                headers,
                body: Bytes::new(),
            },
            parts: OutgoingParts {
                transport: request.tp_info.transport.clone(),
                destination: vec![destination],
                buffer: Default::default(),
            },
        }
    }

    /// Pass a received message to the endpoint for further processing
    ///
    /// Spawns a task internally which will let every registered layer have a look at the message
    /// and let it decide if it is going to handle it.
    pub fn receive(&self, message: ReceivedMessage) {
        tokio::spawn(self.clone().do_receive(message));
    }

    #[tracing::instrument(level = "debug", skip(self, message), fields(%message))]
    async fn do_receive(self, message: ReceivedMessage) {
        log::trace!(
            "Received message via {} ({} <- {})\n{:?}",
            message.tp_info.transport.name(),
            message.tp_info.local,
            message.tp_info.source,
            BytesPrint(&message.tp_info.buffer)
        );

        let mut base_headers = match BaseHeaders::extract_from(&message.headers) {
            Ok(base_headers) => base_headers,
            Err(e) => {
                log::warn!("Failed to get base headers for incoming message, {}", e);
                return;
            }
        };

        if message.line.is_request() {
            add_received_rport(base_headers.top_via_mut(), message.tp_info.source);
        }

        let tsx_key = match TsxKey::from_message_parts(&message.line, &base_headers) {
            Ok(tsx_key) => tsx_key,
            Err(e) => {
                log::warn!("Failed to get tsx key for incoming message, {}", e);
                return;
            }
        };

        let tsx_message = TsxMessage {
            tp_info: message.tp_info,
            line: message.line,
            base_headers,
            headers: message.headers,
            body: message.body,
        };

        let tsx_message = match self.transactions().deliver(&tsx_key, tsx_message) {
            None => {
                log::debug!("delegated message to transaction {}", tsx_key);
                return;
            }
            Some(tsx_message) => tsx_message,
        };

        let line = match tsx_message.line {
            MessageLine::Request(line) => line,
            MessageLine::Response(_) => {
                log::warn!("the received message is an orphaned response");
                return;
            }
        };

        let incoming = IncomingRequest {
            tp_info: tsx_message.tp_info,
            line,
            base_headers: tsx_message.base_headers,
            headers: tsx_message.headers,
            body: tsx_message.body,
            tsx_key,
        };

        let mut request = Some(incoming);

        for layer in self.inner.layer.iter() {
            let span = tracing::info_span!("receive", layer = %layer.name());

            layer
                .receive(&self, MayTake::new(&mut request))
                .instrument(span)
                .await;

            if request.is_none() {
                return;
            }
        }

        log::debug!("No layer handled the request");

        // Safe unwrap. Loop checks every iteration if request is none
        let request = request.unwrap();

        if let Err(e) = self.handle_unwanted_request(request).await {
            log::error!("Failed to respond to unhandled incoming request, {:?}", e);
        }
    }

    async fn handle_unwanted_request(&self, request: IncomingRequest) -> Result<()> {
        if request.line.method == Method::ACK {
            // Cannot respond to unhandled ACK requests
            return Ok(());
        }

        let allowed = self.allowed();

        let method_allowed =
            allowed.is_empty() || allowed.iter().any(|allow| allow.0 == request.line.method);

        let response = if method_allowed {
            self.create_response(&request, Code::CALL_OR_TRANSACTION_DOES_NOT_EXIST, None)
        } else {
            let mut response = self.create_response(&request, Code::METHOD_NOT_ALLOWED, None);

            response.msg.headers.insert_named(allowed);

            response
        };

        if request.line.method == Method::INVITE {
            let tsx = self.create_server_inv_tsx(&request);

            tsx.respond_failure(response).await
        } else {
            let tsx = self.create_server_tsx(&request);

            tsx.respond(response).await
        }
    }

    pub(crate) fn transactions(&self) -> &Transactions {
        &self.inner.transactions
    }

    pub(crate) fn transports(&self) -> &Transports {
        &self.inner.transports
    }
}

/// RFC 3581: stamp the source of the request into its top Via, so
/// responses travel back through the same NAT binding
fn add_received_rport(via: &mut Via, source: SocketAddr) {
    let source_host: Host = source.ip().into();

    let has_rport = via.params.get("rport").is_some();

    if has_rport || source_host != via.sent_by.host {
        via.params.push_or_edit("received", source.ip().to_string());
    }

    if has_rport {
        via.params
            .push_or_edit("rport", source.port().to_string());
    }
}

/// Compute where to send a response, without consulting DNS
fn response_destination(request: &IncomingRequest) -> SocketAddr {
    match request.tp_info.transport.direction() {
        // Use the connection the request came in on, same remote addr
        Direction::Outgoing(remote) | Direction::Incoming(remote) => remote,
        Direction::None => {
            let via = request.base_headers.top_via();

            let port = via
                .params
                .get_val("rport")
                .and_then(|rport| rport.parse::<u16>().ok())
                .or(via.sent_by.port)
                .unwrap_or(5060);

            if let Some(maddr) = via
                .params
                .get_val("maddr")
                .and_then(|maddr| maddr.parse::<IpAddr>().ok())
            {
                SocketAddr::new(maddr, port)
            } else if let Some(received) = via
                .params
                .get_val("received")
                .and_then(|received| received.parse::<IpAddr>().ok())
            {
                SocketAddr::new(received, port)
            } else if let Some(ip) = via.sent_by.ip() {
                SocketAddr::new(ip, port)
            } else {
                SocketAddr::new(request.tp_info.source.ip(), port)
            }
        }
    }
}

fn generate_tag() -> BytesStr {
    use rand::distr::Alphanumeric;
    use rand::Rng;

    rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect::<String>()
        .into()
}

/// Builder instance for [`Endpoint`]
pub struct EndpointBuilder {
    sender: broadcast::Sender<Endpoint>,

    allow: Vec<Allow>,
    timers: TransactionTimers,

    transports: TransportsBuilder,
    layer: Vec<Box<dyn Layer>>,
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointBuilder {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);

        Self {
            sender,
            allow: vec![],
            timers: TransactionTimers::default(),
            transports: Default::default(),
            layer: Default::default(),
        }
    }

    /// Add an ALLOW header to the endpoints capabilities
    pub fn add_allow(&mut self, allowed: Method) {
        self.allow.push(Allow(allowed))
    }

    /// Override the default transaction timer configuration
    pub fn set_transaction_timers(&mut self, timers: TransactionTimers) -> &mut Self {
        self.timers = timers;
        self
    }

    /// Replace the default DNS resolver
    pub fn set_resolver<R>(&mut self, resolver: R) -> &mut Self
    where
        R: Resolver + 'static,
    {
        self.transports.set_resolver(Box::new(resolver));
        self
    }

    /// Add an unmanaged transport to the endpoint which will never vanish or break (e.g. UDP)
    pub fn add_unmanaged_transport<T>(&mut self, transport: T) -> &mut Self
    where
        T: Transport,
    {
        self.transports.insert_unmanaged(TpHandle::new(transport));
        self
    }

    /// Add a transport factory to the endpoint
    pub fn add_transport_factory(&mut self, factory: Arc<dyn Factory>) -> &mut Self {
        self.transports.insert_factory(factory);
        self
    }

    /// Add an implementation of [`Layer`] to the endpoint.
    ///
    /// Note that the insertion order is relevant in how the SIP Stack may react to requests,
    /// as its the same order in that modules are called on incoming requests.
    ///
    /// Returns a [`LayerKey`] which can later be used to access the added layer.
    pub fn add_layer<L>(&mut self, layer: L) -> LayerKey<L>
    where
        L: Layer,
    {
        let index = self.layer.len();

        self.layer.push(Box::new(layer));

        LayerKey {
            index,
            m: PhantomData::<fn() -> L>,
        }
    }

    /// "Subscribe" to the creation of the endpoint.
    ///
    /// The broadcast channel will receive the endpoint on successful creation or error if the
    /// builder is prematurely dropped. On error any task waiting for the endpoint should exit.
    pub fn subscribe(&self) -> broadcast::Receiver<Endpoint> {
        self.sender.subscribe()
    }

    /// Complete building the endpoint
    pub fn build(&mut self) -> Endpoint {
        let mut layer = take(&mut self.layer).into_boxed_slice();
        for layer in layer.iter_mut() {
            layer.init(self);
        }

        let inner = Inner {
            allow: take(&mut self.allow),
            timers: self.timers,
            transports: self.transports.build(),
            transactions: Default::default(),
            layer,
        };

        let endpoint = Endpoint {
            inner: Arc::new(inner),
        };

        let _ = self.sender.send(endpoint.clone());

        endpoint
    }
}

impl<L: Layer> Index<LayerKey<L>> for Endpoint {
    type Output = L;

    fn index(&self, index: LayerKey<L>) -> &Self::Output {
        self.inner.layer[index.index]
            .downcast_ref()
            .expect("invalid layer key")
    }
}

/// Key which can be used to access a layer which was added to an [`Endpoint`].
pub struct LayerKey<L> {
    index: usize,
    m: PhantomData<fn() -> L>,
}

impl<L> fmt::Debug for LayerKey<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LayerKey").finish()
    }
}

impl<L> Clone for LayerKey<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for LayerKey<L> {}
