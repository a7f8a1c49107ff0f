use super::{AwaitedAck, Inner};
use crate::dialog::{Dialog, DialogStateKind, UsageGuard};
use sip_core::transaction::{ServerInvTsx, ServerTsx};
use sip_core::{Endpoint, Error, IncomingRequest, Result};
use sip_types::{Code, CodeKind, Method};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Uac,
    Uas,
}

/// An established INVITE session
pub struct Session {
    pub endpoint: Endpoint,
    inner: Arc<Inner>,

    pub role: Role,

    /// Receiver side of dialog-usage events
    usage_events: Receiver<UsageEvent>,

    /// CSeq of the initial INVITE, which the UAC still has to acknowledge
    uac_invite_cseq: Option<u32>,

    // drop usage before dialog
    _usage_guard: UsageGuard,
    pub dialog: Dialog,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialog", &self.dialog)
            .finish_non_exhaustive()
    }
}

pub struct ReInviteReceived<'s> {
    pub session: &'s mut Session,
    pub invite: IncomingRequest,
    pub transaction: ServerInvTsx,
}

impl ReInviteReceived<'_> {
    /// Process the RE-INVITE, responding with a 200 OK
    pub async fn process_default(self) -> Result<IncomingRequest> {
        let response = self
            .session
            .dialog
            .create_response(&self.invite, Code::OK, None)?;

        let (ack_sender, ack_recv) = oneshot::channel();

        *self.session.inner.awaited_ack.lock() = Some(AwaitedAck {
            cseq: self.invite.base_headers.cseq.cseq,
            ack_sender,
        });

        let accepted = self.transaction.respond_success(response).await?;

        super::receive_ack(accepted, ack_recv, *self.session.endpoint.timers()).await
    }
}

pub struct ByeEvent<'s> {
    pub session: &'s mut Session,
    pub bye: IncomingRequest,
    pub transaction: ServerTsx,
}

impl ByeEvent<'_> {
    /// Process the BYE as one would expect, respond with a 200 OK
    pub async fn process_default(self) -> Result<()> {
        let response = self
            .session
            .dialog
            .create_response(&self.bye, Code::OK, None)?;

        self.session.dialog.state.set(DialogStateKind::Ended);

        self.transaction.respond(response).await
    }
}

#[allow(clippy::large_enum_variant)]
pub enum Event<'s> {
    ReInviteReceived(ReInviteReceived<'s>),
    Bye(ByeEvent<'s>),
    Terminated,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        endpoint: Endpoint,
        inner: Arc<Inner>,
        role: Role,
        usage_events: mpsc::Receiver<UsageEvent>,
        usage_guard: UsageGuard,
        dialog: Dialog,
        uac_invite_cseq: Option<u32>,
    ) -> Self {
        Self {
            endpoint,
            inner,
            role,
            usage_events,
            uac_invite_cseq,
            _usage_guard: usage_guard,
            dialog,
        }
    }

    /// Acknowledge the 2XX response which established this session.
    ///
    /// Only meaningful on the UAC side, where it moves the dialog
    /// into its confirmed state.
    pub async fn confirm(&mut self) -> Result<()> {
        let Some(cseq) = self.uac_invite_cseq.take() else {
            return Ok(());
        };

        let mut ack = super::create_ack(&mut self.dialog, cseq).await?;

        self.endpoint.send_outgoing_request(&mut ack).await?;

        self.dialog.state.set(DialogStateKind::Confirmed);

        Ok(())
    }

    /// Wait for the next event inside this session
    pub async fn drive(&mut self) -> Result<Event<'_>> {
        let event = self.usage_events.recv().await;

        self.handle_usage_event(event)
    }

    /// End the session by sending a BYE request
    pub async fn terminate(&mut self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.set_terminated();

        self.dialog.state.set(DialogStateKind::Ended);

        let request = self.dialog.create_request(Method::BYE);

        let mut target_tp_info = self.dialog.target_tp_info.lock().await;

        let mut transaction = self
            .endpoint
            .send_request(request, &mut target_tp_info)
            .await?;

        drop(target_tp_info);

        let response = transaction.receive_final().await?;

        match response.line.code.kind() {
            CodeKind::Success => Ok(()),
            _ => Err(Error::Failure(response.line.code)),
        }
    }

    fn handle_usage_event(&mut self, evt: Option<UsageEvent>) -> Result<Event<'_>> {
        let evt = if let Some(evt) = evt {
            evt
        } else {
            // Usage events channel has been dropped,
            // because the state was set to Terminated.
            return Ok(Event::Terminated);
        };

        match evt {
            UsageEvent::Bye(request) => {
                let transaction = self.endpoint.create_server_tsx(&request);

                Ok(Event::Bye(ByeEvent {
                    session: self,
                    bye: request,
                    transaction,
                }))
            }
            UsageEvent::ReInvite(invite) => {
                let transaction = self.endpoint.create_server_inv_tsx(&invite);

                Ok(Event::ReInviteReceived(ReInviteReceived {
                    session: self,
                    invite,
                    transaction,
                }))
            }
        }
    }
}

pub(super) enum UsageEvent {
    ReInvite(IncomingRequest),
    Bye(IncomingRequest),
}
