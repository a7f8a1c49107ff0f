use super::session::{Role, Session};
use super::{Inner, InviteLayer, InviteSessionState, InviteUsage};
use crate::dialog::{ClientDialogBuilder, DialogLayer};
use parking_lot as pl;
use sip_core::transaction::{ClientInvTsx, TsxResponse};
use sip_core::{Endpoint, LayerKey, Request, Result};
use sip_types::header::typed::Contact;
use sip_types::header::HeaderError;
use sip_types::uri::{NameAddr, SipUri};
use sip_types::Method;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Responses the [`Initiator`] surfaces while driving the INVITE
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Response {
    Provisional(TsxResponse),
    Failure(TsxResponse),
    Session(Session, TsxResponse),
    Finished,
}

/// Places an outgoing call: builds the INVITE, drives its client
/// transaction and hands out the [`Session`] on a 2XX response
pub struct Initiator {
    dialog_builder: ClientDialogBuilder,

    transaction: Option<ClientInvTsx>,

    invite_layer: LayerKey<InviteLayer>,
}

impl Initiator {
    pub fn new(
        endpoint: Endpoint,
        dialog_layer: LayerKey<DialogLayer>,
        invite_layer: LayerKey<InviteLayer>,
        local_addr: NameAddr,
        local_contact: Contact,
        target: SipUri,
    ) -> Self {
        let dialog_builder =
            ClientDialogBuilder::new(endpoint, dialog_layer, local_addr, local_contact, target);

        Self {
            dialog_builder,
            transaction: None,
            invite_layer,
        }
    }

    pub fn create_invite(&mut self) -> Request {
        self.dialog_builder.create_request(Method::INVITE)
    }

    pub async fn send_invite(&mut self, request: Request) -> Result<()> {
        let transaction = self
            .dialog_builder
            .endpoint
            .send_invite(request, &mut self.dialog_builder.target_tp_info)
            .await?;

        self.transaction = Some(transaction);

        Ok(())
    }

    /// Cancel the pending INVITE.
    ///
    /// The CANCEL is built and driven by the INVITE transaction itself. Once
    /// the peer concludes the INVITE with its 487 response,
    /// [`Initiator::receive`] returns [`Error::Cancelled`](sip_core::Error::Cancelled).
    pub async fn cancel(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .as_mut()
            .expect("must send invite before calling cancel");

        let mut cancel_tsx = transaction.cancel().await?;

        tokio::spawn(async move {
            if let Err(e) = cancel_tsx.receive_final().await {
                log::warn!("CANCEL transaction failed, {}", e);
            }
        });

        Ok(())
    }

    pub fn transaction(&self) -> Option<&ClientInvTsx> {
        self.transaction.as_ref()
    }

    pub async fn receive(&mut self) -> Result<Response> {
        let transaction = self
            .transaction
            .as_mut()
            .expect("must send invite before calling receive");

        loop {
            let response = match transaction.receive().await? {
                Some(response) => response,
                None => return Ok(Response::Finished),
            };

            let code = response.line.code.into_u16();

            if code <= 100 {
                // 100 Trying, cannot create dialog - just return
                return Ok(Response::Provisional(response));
            }

            if code >= 300 {
                return Ok(Response::Failure(response));
            }

            match code {
                101..=199 => {
                    return Ok(Response::Provisional(response));
                }
                200..=299 => {
                    // Ignore success responses without a To-tag
                    if response.base_headers.to.tag.is_none() {
                        log::warn!("Cannot handle success response without To-tag, ignoring");
                        continue;
                    }

                    let session = self.create_session(&response)?;

                    return Ok(Response::Session(session, response));
                }
                _ => unreachable!(),
            }
        }
    }

    fn create_session(&mut self, response: &TsxResponse) -> Result<Session, HeaderError> {
        let dialog = self.dialog_builder.create_dialog_from_response(response)?;

        let (evt_sink, usage_events) = mpsc::channel(4);

        let inner = Arc::new(Inner {
            invite_layer: self.invite_layer,
            state: Mutex::new(InviteSessionState::Established { evt_sink }),
            awaited_ack: pl::Mutex::new(None),
        });

        let usage_guard = dialog
            .register_usage(InviteUsage {
                inner: inner.clone(),
            })
            .expect("dialog was just created");

        Ok(Session::new(
            self.dialog_builder.endpoint.clone(),
            inner,
            Role::Uac,
            usage_events,
            usage_guard,
            dialog,
            Some(response.base_headers.cseq.cseq),
        ))
    }
}
