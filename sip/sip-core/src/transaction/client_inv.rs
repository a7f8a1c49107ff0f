use super::key::TsxKey;
use super::{ClientTsx, TsxRegistration, TsxResponse};
use crate::error::Error;
use crate::transport::{OutgoingParts, OutgoingRequest, TargetTransportInfo};
use crate::Result;
use crate::{Endpoint, Request};
use bytes::Bytes;
use sip_types::header::typed::CSeq;
use sip_types::header::HeaderError;
use sip_types::msg::RequestLine;
use sip_types::{CodeKind, Headers, Method, Name};
use std::time::{Duration, Instant};
use tokio::time::{timeout, timeout_at};

/// Client INVITE transaction. Used to receive responses to an INVITE request.
///
/// Dropping it prematurely may result in an invalid transaction and it cannot be guaranteed
/// that the peer has received the request, as the transaction is also responsible
/// for retransmitting the original request until a response is received or the
/// timeout is triggered.
#[must_use]
#[derive(Debug)]
pub struct ClientInvTsx {
    registration: Option<TsxRegistration>,
    request: OutgoingRequest,
    timeout: Instant,
    state: State,
    cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Calling,
    Proceeding,
    Accepted,
    Completed,
    Terminated,
}

impl ClientInvTsx {
    /// Internal: Used by [Endpoint::send_invite]
    #[tracing::instrument(
        name = "tsx_inv_send",
        level = "debug",
        skip(endpoint, request, target), fields(%request)
    )]
    pub(crate) async fn send(
        endpoint: Endpoint,
        request: Request,
        target: &mut TargetTransportInfo,
    ) -> Result<Self> {
        assert_eq!(
            request.line.method,
            Method::INVITE,
            "tried to create client invite transaction from {} request",
            request.line.method
        );

        let mut request = endpoint.create_outgoing(request, target).await?;

        let registration = TsxRegistration::create(endpoint, TsxKey::client(&Method::INVITE));

        let via = registration.endpoint.create_via(
            &request.parts.transport,
            &registration.tsx_key,
            target.via_host_port.clone(),
        );

        request.msg.headers.insert_named_front(&via);
        registration
            .endpoint
            .send_outgoing_request(&mut request)
            .await?;

        let timeout = Instant::now() + registration.endpoint.timers().timeout();

        Ok(Self {
            registration: Some(registration),
            request,
            timeout,
            state: State::Calling,
            cancelled: false,
        })
    }

    /// Send a CANCEL for this INVITE while it has not received a final response.
    ///
    /// The CANCEL reuses the top Via (including its branch), Call-ID, From, To and
    /// the CSeq sequence number of the INVITE, and is driven by its own
    /// non-INVITE client transaction. The INVITE transaction itself is expected to
    /// conclude with a failure response from the peer, which
    /// [`receive`](ClientInvTsx::receive) surfaces as [`Error::Cancelled`].
    pub async fn cancel(&mut self) -> Result<ClientTsx> {
        let registration = match &self.registration {
            Some(registration) if matches!(self.state, State::Calling | State::Proceeding) => {
                registration
            }
            _ => return Err(Error::TransactionTerminated),
        };

        let cancel = create_cancel(&self.request)?;

        let tsx_key = TsxKey::client_with_branch(
            registration.tsx_key.branch().clone(),
            &Method::CANCEL,
        );

        let tsx = ClientTsx::send_cancel(registration.endpoint.clone(), cancel, tsx_key).await?;

        self.cancelled = true;

        Ok(tsx)
    }

    /// Returns the request the transaction was created from
    pub fn request(&self) -> &OutgoingRequest {
        &self.request
    }

    /// Receive one or more responses.
    ///
    /// The return type differs from [`ClientTsx::receive`](super::ClientTsx::receive)
    /// as this transaction can return multiple final responses (2XX in this case), due
    /// to INVITE forking. Only once `None` is returned, due to the timeout, is the
    /// INVITE transaction terminated and will no longer be able to receive any responses.
    #[tracing::instrument(name = "tsx_inv_receive", level = "debug", skip(self))]
    pub async fn receive(&mut self) -> Result<Option<TsxResponse>> {
        let registration = match &mut self.registration {
            Some(registration) => registration,
            None => return Ok(None),
        };

        let timers = *registration.endpoint.timers();

        match self.state {
            State::Calling if !self.request.parts.transport.reliable() => {
                // Timer A, doubling with each retransmission
                let mut n = timers.t1;

                loop {
                    let receive = timeout(n, registration.receive_response());

                    match timeout_at(self.timeout.into(), receive).await {
                        Ok(Ok(msg)) => return self.handle_msg(msg).await,
                        Ok(Err(_)) => {
                            // retransmit
                            registration
                                .endpoint
                                .send_outgoing_request(&mut self.request)
                                .await?;

                            n *= 2;
                        }
                        // Timer B
                        Err(_) => return Err(Error::RequestTimedOut),
                    }
                }
            }
            State::Calling | State::Proceeding => {
                match timeout_at(self.timeout.into(), registration.receive_response()).await {
                    Ok(msg) => self.handle_msg(msg).await,
                    Err(_) => Err(Error::RequestTimedOut),
                }
            }
            State::Accepted => {
                // pass up 2xx retransmissions until Timer M fires
                match timeout_at(self.timeout.into(), registration.receive_response()).await {
                    Ok(msg) => Ok(Some(msg)),
                    Err(_) => {
                        self.state = State::Terminated;
                        self.registration = None;
                        Ok(None)
                    }
                }
            }
            State::Completed | State::Terminated => Ok(None),
        }
    }

    async fn handle_msg(&mut self, msg: TsxResponse) -> Result<Option<TsxResponse>> {
        match msg.line.code.kind() {
            CodeKind::Provisional => {
                self.state = State::Proceeding;
            }
            CodeKind::Success => {
                // Timer M
                self.timeout = Instant::now()
                    + self
                        .registration
                        .as_ref()
                        .expect("state is not terminated")
                        .endpoint
                        .timers()
                        .timeout();
                self.state = State::Accepted;
            }
            _ => {
                let mut registration = self.registration.take().expect("already checked");

                let mut ack = create_ack(&self.request, &msg)?;

                registration
                    .endpoint
                    .send_outgoing_request(&mut ack)
                    .await?;

                if self.request.parts.transport.reliable() {
                    self.state = State::Terminated;
                } else {
                    self.state = State::Completed;

                    // Timer D, re-acknowledge response retransmissions
                    tokio::spawn(async move {
                        let timeout = Instant::now() + Duration::from_secs(32);

                        while timeout_at(timeout.into(), registration.receive())
                            .await
                            .is_ok()
                        {
                            registration
                                .endpoint
                                .send_outgoing_request(&mut ack)
                                .await
                                .ok();
                        }
                    });
                }

                if self.cancelled {
                    // the cancelled invite concluded, this is the terminal error
                    return Err(Error::Cancelled);
                }
            }
        }

        Ok(Some(msg))
    }
}

/// Build the transaction-internal ACK for a non-2xx final response
fn create_ack(
    request: &OutgoingRequest,
    response: &TsxResponse,
) -> Result<OutgoingRequest, HeaderError> {
    let mut headers = Headers::with_capacity(5);

    request.msg.headers.clone_into(&mut headers, Name::VIA)?;
    request.msg.headers.clone_into(&mut headers, Name::FROM)?;
    response.headers.clone_into(&mut headers, Name::TO)?;
    request
        .msg
        .headers
        .clone_into(&mut headers, Name::CALL_ID)?;

    let cseq = request.msg.headers.get_named::<CSeq>()?;

    headers.insert_named(&CSeq {
        cseq: cseq.cseq,
        method: Method::ACK,
    });

    Ok(OutgoingRequest {
        msg: Request {
            line: RequestLine {
                method: Method::ACK,
                uri: request.msg.line.uri.clone(),
            },
            headers,
            body: Bytes::new(),
        },
        parts: OutgoingParts {
            transport: request.parts.transport.clone(),
            destination: request.parts.destination.clone(),
            buffer: Default::default(),
        },
    })
}

/// Build the CANCEL request for a pending INVITE
fn create_cancel(request: &OutgoingRequest) -> Result<OutgoingRequest, HeaderError> {
    let mut headers = Headers::with_capacity(6);

    request.msg.headers.clone_into(&mut headers, Name::VIA)?;
    request
        .msg
        .headers
        .clone_into(&mut headers, Name::MAX_FORWARDS)
        .ok();
    request.msg.headers.clone_into(&mut headers, Name::FROM)?;
    request.msg.headers.clone_into(&mut headers, Name::TO)?;
    request
        .msg
        .headers
        .clone_into(&mut headers, Name::CALL_ID)?;

    let cseq = request.msg.headers.get_named::<CSeq>()?;

    headers.insert_named(&CSeq {
        cseq: cseq.cseq,
        method: Method::CANCEL,
    });

    Ok(OutgoingRequest {
        msg: Request {
            line: RequestLine {
                method: Method::CANCEL,
                uri: request.msg.line.uri.clone(),
            },
            headers,
            body: Bytes::new(),
        },
        parts: OutgoingParts {
            transport: request.parts.transport.clone(),
            destination: request.parts.destination.clone(),
            buffer: Default::default(),
        },
    })
}
