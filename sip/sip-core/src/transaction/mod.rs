//! Transaction layer: matching store, keys and the four RFC 3261 section 17
//! state machines

use crate::transport::MessageTpInfo;
use crate::BaseHeaders;
use bytes::Bytes;
use bytesstr::BytesStr;
use parking_lot::RwLock;
use sip_types::msg::{MessageLine, StatusLine};
use sip_types::Headers;
use std::collections::HashMap;
use std::time::Duration;

mod client;
mod client_inv;
mod key;
mod registration;
mod server;
mod server_inv;

pub(crate) use registration::TsxRegistration;

pub mod consts {
    /// Branch parameters of this cookie mark RFC 3261 compliant transaction keys
    pub const RFC3261_BRANCH_PREFIX: &str = "z9hG4bK";
}

pub use client::ClientTsx;
pub use client_inv::ClientInvTsx;
pub use key::TsxKey;
pub use server::ServerTsx;
pub use server_inv::{Accepted, ServerInvTsx};

/// Immutable timer configuration for the transaction layer.
///
/// Installed once on the [`EndpointBuilder`](crate::EndpointBuilder), every
/// transaction of the endpoint reads its timings from this value. Tests
/// which need different timings construct a separate endpoint.
#[derive(Debug, Clone, Copy)]
pub struct TransactionTimers {
    /// RTT estimate, base retransmission interval (default 500ms)
    pub t1: Duration,

    /// Maximum retransmission interval for non-INVITE requests and INVITE
    /// responses (default 4s)
    pub t2: Duration,

    /// Maximum duration a message can stay in the network (default 5s)
    pub t4: Duration,

    /// Delay before a server INVITE transaction emits an automatic
    /// 100 Trying (default 200ms)
    pub trying_delay: Duration,
}

impl TransactionTimers {
    /// Duration of the timeout timers B, F and H, and of the
    /// wait-timers L and M (64 times T1)
    pub fn timeout(&self) -> Duration {
        self.t1 * 64
    }
}

impl Default for TransactionTimers {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            trying_delay: Duration::from_millis(200),
        }
    }
}

type TsxHandler = Box<dyn Fn(TsxMessage) -> Option<TsxMessage> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Transactions {
    map: RwLock<HashMap<TsxKey, TsxHandler>>,
}

impl Transactions {
    /// Try to hand `message` to a registered transaction.
    ///
    /// Returns the message back if no transaction consumed it, either
    /// because none is registered under the key or its filter rejected it.
    pub(crate) fn deliver(&self, key: &TsxKey, message: TsxMessage) -> Option<TsxMessage> {
        let map = self.map.read();

        match map.get(key) {
            Some(handler) => handler(message),
            None => Some(message),
        }
    }

    pub(crate) fn register_transaction(&self, key: TsxKey, handler: TsxHandler) {
        self.map.write().insert(key, handler);
    }

    pub(crate) fn remove_transaction(&self, key: &TsxKey) {
        self.map.write().remove(key);
    }

    pub(crate) fn map(&self) -> &RwLock<HashMap<TsxKey, TsxHandler>> {
        &self.map
    }
}

/// Response received inside a transaction
#[derive(Debug)]
pub struct TsxResponse {
    pub tp_info: MessageTpInfo,

    pub line: StatusLine,
    pub base_headers: BaseHeaders,
    pub headers: Headers,
    pub body: Bytes,
}

/// Message received inside a transaction context
#[derive(Debug)]
pub struct TsxMessage {
    pub tp_info: MessageTpInfo,

    pub line: MessageLine,
    pub base_headers: BaseHeaders,
    pub headers: Headers,
    pub body: Bytes,
}

pub(crate) fn generate_branch() -> BytesStr {
    use rand::distr::Alphanumeric;
    use rand::Rng;

    consts::RFC3261_BRANCH_PREFIX
        .bytes()
        .chain(rand::rng().sample_iter(Alphanumeric).take(23))
        .map(char::from)
        .collect::<String>()
        .into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn branch_has_magic_cookie() {
        let branch = generate_branch();

        assert!(branch.starts_with(consts::RFC3261_BRANCH_PREFIX));
        assert!(branch.len() >= consts::RFC3261_BRANCH_PREFIX.len() + 16);
        assert!(branch
            .bytes()
            .skip(consts::RFC3261_BRANCH_PREFIX.len())
            .all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn branches_are_unique() {
        assert_ne!(generate_branch(), generate_branch());
    }
}
