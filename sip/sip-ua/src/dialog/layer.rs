use super::key::DialogKey;
use parking_lot::Mutex;
use sip_core::{Endpoint, EndpointBuilder, IncomingRequest, Layer, LayerKey, MayTake, Result};
use sip_types::{Code, Method};
use slotmap::{DefaultKey, SlotMap};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// A dialog usage receives the requests which match its dialog.
///
/// The INVITE session is one usage, extensions like event subscriptions
/// would be others.
#[async_trait::async_trait]
pub trait Usage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>);
}

/// Reason a request could not be delivered inside a dialog.
///
/// Either way the peer is answered with 481.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DialogError {
    /// The request is only valid inside a dialog but carried no to-tag
    #[error("in-dialog request received outside any dialog")]
    OutsideDialog,

    /// No dialog exists which could process the request
    #[error("request matches no dialog")]
    DoesNotExist,
}

pub(super) struct DialogEntry {
    backlog: BTreeMap<u32, IncomingRequest>,
    next_peer_cseq: Option<u32>,
    usages: SlotMap<DefaultKey, Arc<dyn Usage>>,
}

impl DialogEntry {
    pub(super) fn new(peer_cseq: Option<u32>) -> Self {
        Self {
            backlog: Default::default(),
            next_peer_cseq: peer_cseq.map(|cseq| cseq + 1),
            usages: Default::default(),
        }
    }
}

/// Endpoint layer tracking all dialogs and routing in-dialog requests
/// to their usages
#[derive(Default)]
pub struct DialogLayer {
    pub(super) dialogs: Mutex<HashMap<DialogKey, DialogEntry>>,
}

#[async_trait::async_trait]
impl Layer for DialogLayer {
    fn name(&self) -> &'static str {
        "dialog"
    }

    fn init(&mut self, _: &mut EndpointBuilder) {
        // dialog layer adds no capabilities
    }

    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>) {
        let key = match DialogKey::from_incoming(&request) {
            Some(key) => key,
            None => {
                // Requests without a to-tag may legitimately form a new
                // dialog elsewhere, except those only valid inside one
                if request.line.method == Method::BYE {
                    let bye = request.take();

                    if let Err(e) = self
                        .respond_unmatched(endpoint, bye, DialogError::OutsideDialog)
                        .await
                    {
                        log::warn!("failed to respond to out-of-dialog request, {:?}", e);
                    }
                }

                return;
            }
        };

        // The request carries a dialog key, it is answered here from now on
        let request = request.take();

        let matched = {
            let mut dialogs = self.dialogs.lock();

            match dialogs.get_mut(&key) {
                None => Err(request),
                Some(dialog_entry) => {
                    let request_cseq = request.base_headers.cseq.cseq;

                    let next_peer_cseq = match dialog_entry.next_peer_cseq {
                        Some(next_peer_cseq) => next_peer_cseq,
                        None => {
                            // First request seen inside this dialog
                            dialog_entry.next_peer_cseq = Some(request_cseq + 1);

                            request_cseq
                        }
                    };

                    match request_cseq.cmp(&next_peer_cseq) {
                        Ordering::Less => {
                            // CSeq number is lower than expected. ACK requests have the CSeq
                            // number of the initial INVITE request they acknowledge as they are
                            // considered part of the transaction, but on the UA level and thus
                            // have their own transaction id. That is why we warn here if it's
                            // not an ACK request
                            if request.line.method != Method::ACK {
                                log::warn!("Incoming request has CSeq number lower than expected.");
                            }

                            Ok((dialog_entry.usages.clone(), vec![request]))
                        }
                        Ordering::Equal => {
                            // CSeq number is correct!
                            //
                            // Clone the usage map to unlock the mutex while distributing the
                            // message to the registered usages.
                            let usages = dialog_entry.usages.clone();

                            // Then create the requests vector and look if the backlog has any
                            // messages that would come after this one. If found put them in the
                            // messages vector in the correct order and distribute them to the
                            // usages as well.
                            let mut requests = vec![request];

                            for next_cseq in request_cseq.. {
                                if let Some(message) = dialog_entry.backlog.remove(&next_cseq) {
                                    requests.push(message);
                                } else {
                                    break;
                                }
                            }

                            // set the next expected cseq to the one of the last message we
                            // handle + 1
                            dialog_entry.next_peer_cseq =
                                Some(requests.last().unwrap().base_headers.cseq.cseq + 1);

                            Ok((usages, requests))
                        }
                        Ordering::Greater => {
                            // If its larger than the expected one store it inside the dialog's backlog
                            dialog_entry.backlog.insert(request_cseq, request);
                            log::debug!("dialog received a message with cseq value above the expected one, saving it for later");
                            return;
                        }
                    }
                }
            }
        };

        let (usages, requests) = match matched {
            Ok(matched) => matched,
            Err(request) => {
                if let Err(e) = self
                    .respond_unmatched(endpoint, request, DialogError::DoesNotExist)
                    .await
                {
                    log::warn!("failed to respond to unmatched request, {:?}", e);
                }

                return;
            }
        };

        log::debug!("message matches {:?}", key);

        for request in requests {
            let mut request = Some(request);

            for usage in usages.values() {
                let span = info_span!("usage", name = %usage.name());

                usage
                    .receive(endpoint, MayTake::new(&mut request))
                    .instrument(span)
                    .await;

                if request.is_none() {
                    return;
                }
            }

            // Requests not handled by any usage get the default response
            if let Some(request) = request {
                if let Err(e) = self
                    .respond_unmatched(endpoint, request, DialogError::DoesNotExist)
                    .await
                {
                    log::warn!("failed to respond to unwanted request, {:?}", e);
                }
            }
        }
    }
}

impl DialogLayer {
    /// Answer a request that cannot be delivered inside a dialog with 481
    async fn respond_unmatched(
        &self,
        endpoint: &Endpoint,
        request: IncomingRequest,
        error: DialogError,
    ) -> Result<()> {
        if request.line.method == Method::ACK {
            // Cannot respond to an ACK
            log::debug!("{}, dropping ACK", error);
            return Ok(());
        }

        log::debug!("{}, responding 481 to {}", error, request.line.method);

        let response =
            endpoint.create_response(&request, Code::CALL_OR_TRANSACTION_DOES_NOT_EXIST, None);

        if request.line.method == Method::INVITE {
            let tsx = endpoint.create_server_inv_tsx(&request);

            tsx.respond_failure(response).await
        } else {
            let tsx = endpoint.create_server_tsx(&request);

            tsx.respond(response).await
        }
    }
}

/// The lifetime of the guard ensures the existence of the
/// usage inside a dialog. When dropped the usage will be
/// removed from the dialog.
#[derive(Debug)]
pub struct UsageGuard {
    endpoint: Endpoint,
    dialog_layer: LayerKey<DialogLayer>,
    dialog_key: DialogKey,
    usage_key: DefaultKey,
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        let mut dialogs = self.endpoint[self.dialog_layer].dialogs.lock();

        if let Some(dialog_entry) = dialogs.get_mut(&self.dialog_key) {
            dialog_entry.usages.remove(self.usage_key);
        } else {
            log::warn!("usage dropped after dialog")
        }
    }
}

/// Register the given `usage` inside the dialog with the `dialog_key`
///
/// Returns `Some(Self)` when the usage was successfully registered inside the dialog
pub fn register_usage<U>(
    endpoint: Endpoint,
    dialog_layer: LayerKey<DialogLayer>,
    dialog_key: DialogKey,
    usage: U,
) -> Option<UsageGuard>
where
    U: Usage,
{
    let mut dialogs = endpoint[dialog_layer].dialogs.lock();
    let dialog_entry = dialogs.get_mut(&dialog_key)?;

    let usage_key = dialog_entry.usages.insert(Arc::new(usage));

    drop(dialogs);

    Some(UsageGuard {
        endpoint,
        dialog_layer,
        dialog_key,
        usage_key,
    })
}
