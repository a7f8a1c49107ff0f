//! INVITE handling: the [`Acceptor`](acceptor::Acceptor) answers incoming
//! calls, the [`Initiator`](initiator::Initiator) places them and the
//! [`Session`](session::Session) drives the call once established.

use crate::dialog::{Dialog, DialogStateKind, Usage};
use acceptor::CancellableKey;
use parking_lot as pl;
use session::UsageEvent;
use sip_core::transaction::{Accepted, ServerInvTsx, TransactionTimers, TsxKey};
use sip_core::transport::OutgoingRequest;
use sip_core::{
    Endpoint, EndpointBuilder, Error, IncomingRequest, Layer, LayerKey, MayTake, Result,
};
use sip_types::header::typed::CSeq;
use sip_types::{Code, Method};
use std::collections::HashMap;
use std::fmt;
use std::mem::replace;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

pub mod acceptor;
pub mod initiator;
pub mod session;

#[derive(Debug)]
struct AwaitedAck {
    cseq: u32,
    ack_sender: oneshot::Sender<IncomingRequest>,
}

/// The shared state which is used by all
/// INVITE objects and the usage.
struct Inner {
    invite_layer: LayerKey<InviteLayer>,
    state: Mutex<InviteSessionState>,

    awaited_ack: pl::Mutex<Option<AwaitedAck>>,
}

#[allow(clippy::large_enum_variant)]
enum InviteSessionState {
    /// Provisional state before a final response was sent
    UasProvisional {
        dialog: Dialog,
        tsx: ServerInvTsx,
        invite: IncomingRequest,
        on_cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
    },

    /// Cancelled: A CANCEL request for the invite has been received
    /// aborting the invite-transaction.
    Cancelled,

    /// The session has been established from our point of view. This state holds
    /// a Sender which is used to send requests received inside the
    /// invite-usage to the session-object.
    Established {
        evt_sink: mpsc::Sender<session::UsageEvent>,
    },

    /// The session has received a BYE request and thus can no
    /// longer receive any events
    Terminated,
}

impl fmt::Debug for InviteSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UasProvisional {
                dialog,
                tsx,
                invite,
                on_cancel: _,
            } => f
                .debug_struct("UasProvisional")
                .field("dialog", dialog)
                .field("tsx", tsx)
                .field("invite", invite)
                .finish(),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Established { evt_sink: _ } => f.debug_struct("Established").finish(),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

impl InviteSessionState {
    /// Set the state to Cancelled and return the pending transaction, if the current state is Provisional
    fn set_cancelled(&mut self) -> Option<(Dialog, ServerInvTsx, IncomingRequest)> {
        if matches!(self, InviteSessionState::UasProvisional { .. }) {
            if let InviteSessionState::UasProvisional {
                dialog,
                tsx,
                invite,
                on_cancel,
            } = replace(self, InviteSessionState::Cancelled)
            {
                if let Some(on_cancel) = on_cancel {
                    on_cancel();
                }

                Some((dialog, tsx, invite))
            } else {
                unreachable!()
            }
        } else {
            None
        }
    }

    /// Set the state to Established and return the pending transaction, dialog and initial INVITE,
    /// if the current state is Provisional
    fn set_established(
        &mut self,
        evt_sink: mpsc::Sender<session::UsageEvent>,
    ) -> Option<(Dialog, ServerInvTsx, IncomingRequest)> {
        if matches!(self, InviteSessionState::UasProvisional { .. }) {
            if let InviteSessionState::UasProvisional {
                dialog,
                tsx,
                invite,
                on_cancel: _,
            } = replace(self, InviteSessionState::Established { evt_sink })
            {
                Some((dialog, tsx, invite))
            } else {
                unreachable!()
            }
        } else {
            None
        }
    }

    /// Set the state to Terminated and return last state
    fn set_terminated(&mut self) -> Self {
        replace(self, Self::Terminated)
    }
}

/// Endpoint layer pairing incoming CANCEL requests with the INVITE
/// transaction they abort
#[derive(Default)]
pub struct InviteLayer {
    cancellables: pl::Mutex<HashMap<CancellableKey, Arc<Inner>>>,
}

#[async_trait::async_trait]
impl Layer for InviteLayer {
    fn name(&self) -> &'static str {
        "invite"
    }

    fn init(&mut self, endpoint: &mut EndpointBuilder) {
        endpoint.add_allow(Method::INVITE);
        endpoint.add_allow(Method::ACK);
        endpoint.add_allow(Method::CANCEL);
        endpoint.add_allow(Method::BYE);
    }

    async fn receive(&self, endpoint: &Endpoint, mut request: MayTake<'_, IncomingRequest>) {
        if let Method::CANCEL = request.line.method {
            if let Err(e) = self
                .handle_cancel(endpoint, MayTake::new(request.inner()))
                .await
            {
                log::error!("Failed to handle CANCEL request {:?}", e);
            }
        }
    }
}

impl InviteLayer {
    async fn handle_cancel(
        &self,
        endpoint: &Endpoint,
        cancel: MayTake<'_, IncomingRequest>,
    ) -> Result<()> {
        let inner = {
            let branch = cancel.tsx_key.branch();

            let mut running = self.cancellables.lock();

            running.remove(&CancellableKey {
                cseq: cancel.base_headers.cseq.cseq,
                branch: branch.clone(),
            })
        };

        // Check if any matching INVITE has been found
        // Transaction found and in progress: respond 200 to cancel and 487 to INVITE
        // Transaction found but completed: respond 200 to cancel
        // No matching transaction: don't handle it, the endpoint will respond accordingly
        if let Some(inner) = inner {
            let cancel = cancel.take();
            let cancel_tsx = endpoint.create_server_tsx(&cancel);

            if let Some((dialog, invite_tsx, invite)) = inner.state.lock().await.set_cancelled() {
                let invite_response =
                    dialog.create_response(&invite, Code::REQUEST_TERMINATED, None)?;

                let cancel_response = dialog.create_response(&cancel, Code::OK, None)?;

                dialog.state.set(DialogStateKind::Ended);

                let (r1, r2) = tokio::join!(
                    invite_tsx.respond_failure(invite_response),
                    cancel_tsx.respond(cancel_response)
                );

                r1?;
                r2
            } else {
                let response = endpoint.create_response(&cancel, Code::OK, None);

                cancel_tsx.respond(response).await
            }
        } else {
            Ok(())
        }
    }
}

struct InviteUsage {
    inner: Arc<Inner>,
}

#[async_trait::async_trait]
impl Usage for InviteUsage {
    fn name(&self) -> &'static str {
        "invite-usage"
    }

    async fn receive(&self, endpoint: &Endpoint, mut request: MayTake<'_, IncomingRequest>) {
        match request.line.method {
            Method::INVITE => {
                let state = self.inner.state.lock().await;

                if let InviteSessionState::Established { evt_sink } = &*state {
                    let invite = request.inner().take().unwrap();

                    if let Err(SendError(UsageEvent::ReInvite(invite))) =
                        evt_sink.send(UsageEvent::ReInvite(invite)).await
                    {
                        *request.inner() = Some(invite);
                    }
                }
            }
            Method::ACK => {
                let mut awaited_ack_opt = self.inner.awaited_ack.lock();

                if let Some(awaited_ack) = awaited_ack_opt.take() {
                    if awaited_ack.cseq == request.base_headers.cseq.cseq {
                        let ack = request.inner().take().unwrap();

                        if let Err(ack) = awaited_ack.ack_sender.send(ack) {
                            *request.inner() = Some(ack);
                        }
                    } else {
                        // ACK not expected, put awaited ack back
                        *awaited_ack_opt = Some(awaited_ack);
                    }
                }
            }
            Method::BYE => {
                let mut state = self.inner.state.lock().await;

                match state.set_terminated() {
                    InviteSessionState::UasProvisional {
                        dialog,
                        tsx,
                        invite,
                        on_cancel: _,
                    } => {
                        if let Err(e) = self
                            .handle_bye_in_provisional_state(
                                endpoint,
                                dialog,
                                tsx,
                                invite,
                                request.take(),
                            )
                            .await
                        {
                            log::warn!(
                                "Failed to handle bye request in provisional state: {:?}",
                                e
                            );
                        }
                    }
                    InviteSessionState::Established { evt_sink } => {
                        let bye = request.inner().take().unwrap();

                        if let Err(SendError(UsageEvent::Bye(bye))) =
                            evt_sink.send(UsageEvent::Bye(bye)).await
                        {
                            *request.inner() = Some(bye);
                        }
                    }
                    InviteSessionState::Cancelled | InviteSessionState::Terminated => {
                        // These states don't need to handle BYE requests
                    }
                }
            }
            _ => {}
        }
    }
}

impl InviteUsage {
    async fn handle_bye_in_provisional_state(
        &self,
        endpoint: &Endpoint,
        dialog: Dialog,
        invite_tsx: ServerInvTsx,
        invite: IncomingRequest,
        bye: IncomingRequest,
    ) -> Result<()> {
        let bye_response = dialog.create_response(&bye, Code::OK, None)?;
        let bye_tsx = endpoint.create_server_tsx(&bye);

        let invite_response = dialog.create_response(&invite, Code::REQUEST_TERMINATED, None)?;

        dialog.state.set(DialogStateKind::Ended);

        let (r1, r2) = tokio::join!(
            invite_tsx.respond_failure(invite_response),
            bye_tsx.respond(bye_response)
        );

        r1?;
        r2
    }
}

/// Build and address an ACK request for a 2XX response inside `dialog`.
///
/// The ACK reuses the sequence number of the INVITE it acknowledges but
/// gets a fresh branch, as it forms its own transaction on the UA level.
pub async fn create_ack(dialog: &mut Dialog, cseq_num: u32) -> Result<OutgoingRequest> {
    let mut ack = dialog.create_request(Method::ACK);

    // Set CSeq to the value of the INVITE
    ack.headers
        .edit_named(|cseq: &mut CSeq| cseq.cseq = cseq_num)?;

    let mut target_tp_info = dialog.target_tp_info.lock().await;

    let mut ack = dialog
        .endpoint
        .create_outgoing(ack, &mut target_tp_info)
        .await?;

    // Create temporary transaction key to create a Via, but never register it
    // as we don't need to receive responses
    let tsx_key = TsxKey::client(&Method::ACK);
    let via = dialog.endpoint.create_via(
        &ack.parts.transport,
        &tsx_key,
        target_tp_info.via_host_port.clone(),
    );

    ack.msg.headers.insert_named_front(&via);

    Ok(ack)
}

/// Helper function to receive the ACK request from the invite-usage
/// after sending a success-response
async fn receive_ack(
    mut accepted: Accepted,
    mut ack_recv: oneshot::Receiver<IncomingRequest>,
    timers: TransactionTimers,
) -> Result<IncomingRequest> {
    let mut delta = timers.t1;

    loop {
        if accepted.timed_out() {
            // Timer L
            return Err(Error::RequestTimedOut);
        }

        match timeout(delta, &mut ack_recv).await {
            Ok(res) => {
                // Unwrap should be safe as there should never be
                // multiple invite transactions
                return Ok(res.expect("ack sender vanished"));
            }
            Err(_) => {
                // retransmit the 2XX on timeout
                accepted.retransmit().await?;
                delta = (delta * 2).min(timers.t2);
            }
        }
    }
}
