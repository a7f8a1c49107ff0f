use super::session::{Role, Session};
use super::{AwaitedAck, Inner, InviteLayer, InviteSessionState, InviteUsage};
use crate::dialog::{Dialog, DialogLayer, DialogStateKind, UsageGuard};
use crate::util::random_string;
use anyhow::anyhow;
use bytesstr::BytesStr;
use parking_lot as pl;
use sip_core::transport::OutgoingResponse;
use sip_core::{Endpoint, Error, IncomingRequest, LayerKey, Result};
use sip_types::header::typed::Contact;
use sip_types::header::HeaderError;
use sip_types::{Code, Method, Name};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Accepts an incoming INVITE: it owns the dialog (minting its To-tag),
/// the INVITE server transaction and the registration which lets a CANCEL
/// find this INVITE.
pub struct Acceptor {
    endpoint: Endpoint,
    inner: Arc<Inner>,
    cancellable_key: CancellableKey,
    usage_guard: Option<UsageGuard>,
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.endpoint[self.inner.invite_layer]
            .cancellables
            .lock()
            .remove(&self.cancellable_key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct CancellableKey {
    pub cseq: u32,
    pub branch: BytesStr,
}

impl Acceptor {
    pub fn new(
        endpoint: Endpoint,
        dialog_layer: LayerKey<DialogLayer>,
        invite_layer: LayerKey<InviteLayer>,
        mut invite: IncomingRequest,
        local_contact: Contact,
    ) -> Result<Self> {
        assert_eq!(
            invite.line.method,
            Method::INVITE,
            "incoming request must be invite"
        );

        if invite.base_headers.from.tag.is_none() {
            return Err(Error::Header(HeaderError::malformed(
                Name::FROM,
                anyhow!("missing tag"),
            )));
        }

        // mint the To-tag, all responses to the INVITE will carry it
        invite.base_headers.to.tag = Some(random_string());

        let dialog = Dialog::new_server(endpoint.clone(), dialog_layer, &invite, local_contact)?;

        let dialog_key = dialog.key();

        let cancellable_key = CancellableKey {
            cseq: invite.base_headers.cseq.cseq,
            branch: invite.tsx_key.branch().clone(),
        };

        // Create Inner shared state
        let tsx = endpoint.create_server_inv_tsx(&invite);
        let inner = Arc::new(Inner {
            invite_layer,
            state: Mutex::new(InviteSessionState::UasProvisional {
                dialog,
                tsx,
                invite,
                on_cancel: None,
            }),
            awaited_ack: pl::Mutex::new(None),
        });

        // Register the usage to the dialog
        let usage_guard = crate::dialog::register_usage(
            endpoint.clone(),
            dialog_layer,
            dialog_key,
            InviteUsage {
                inner: inner.clone(),
            },
        )
        // Unwrap is safe as we still hold the dialog
        .unwrap();

        // Register Inner to the invite layer so a CANCEL can find it
        endpoint[invite_layer]
            .cancellables
            .lock()
            .insert(cancellable_key.clone(), inner.clone());

        Ok(Self {
            endpoint,
            inner,
            usage_guard: Some(usage_guard),
            cancellable_key,
        })
    }

    /// Register a callback which fires when a CANCEL matching this INVITE
    /// is received
    pub async fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock().await;

        if let InviteSessionState::UasProvisional { on_cancel, .. } = &mut *state {
            *on_cancel = Some(Box::new(callback));
        }
    }

    pub async fn create_response(
        &self,
        code: Code,
        reason: Option<BytesStr>,
    ) -> Result<OutgoingResponse> {
        let state = self.inner.state.lock().await;

        if let InviteSessionState::UasProvisional { dialog, invite, .. } = &*state {
            dialog.create_response(invite, code, reason)
        } else {
            Err(Error::TransactionTerminated)
        }
    }

    pub async fn respond_provisional(&mut self, mut response: OutgoingResponse) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        if let InviteSessionState::UasProvisional { tsx, .. } = &mut *state {
            tsx.respond_provisional(&mut response).await
        } else {
            Err(Error::TransactionTerminated)
        }
    }

    pub async fn respond_success(
        mut self,
        response: OutgoingResponse,
    ) -> Result<(Session, IncomingRequest)> {
        // Lock the state over the duration of the responding process and
        // while waiting for the ACK. This avoids handling of other
        // requests that assume a completed session.
        let mut state = self.inner.state.lock().await;

        let (evt_sink, events) = mpsc::channel(4);
        let res = state.set_established(evt_sink);

        let Some((dialog, transaction, invite)) = res else {
            return Err(Error::TransactionTerminated);
        };

        // We are going to respond with a successful response soon, register the cseq of
        // the initial invite in `awaited_ack` where it will be used to match the
        // incoming ACK request to this transaction.
        let (ack_sink, ack_recv) = oneshot::channel();
        *self.inner.awaited_ack.lock() = Some(AwaitedAck {
            cseq: invite.base_headers.cseq.cseq,
            ack_sender: ack_sink,
        });

        let accepted = transaction.respond_success(response).await?;

        dialog.state.set(DialogStateKind::Established);

        let ack = super::receive_ack(accepted, ack_recv, *self.endpoint.timers()).await?;

        dialog.state.set(DialogStateKind::Confirmed);

        let session = Session::new(
            self.endpoint.clone(),
            self.inner.clone(),
            Role::Uas,
            events,
            self.usage_guard.take().unwrap(),
            dialog,
            None,
        );

        Ok((session, ack))
    }

    pub async fn respond_failure(self, response: OutgoingResponse) -> Result<()> {
        if let Some((dialog, transaction, _)) = self.inner.state.lock().await.set_cancelled() {
            dialog.state.set(DialogStateKind::Ended);

            transaction.respond_failure(response).await
        } else {
            Err(Error::TransactionTerminated)
        }
    }
}
