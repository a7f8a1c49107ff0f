use bytesstr::BytesStr;
use sip_core::IncomingRequest;
use std::fmt;

/// Identifies a dialog by `call-id`, `local-tag` and `peer-tag`
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct DialogKey {
    pub call_id: BytesStr,
    pub peer_tag: Option<BytesStr>,
    pub local_tag: BytesStr,
}

impl DialogKey {
    pub(crate) fn from_incoming(request: &IncomingRequest) -> Option<Self> {
        let base_headers = &request.base_headers;
        Some(Self {
            call_id: base_headers.call_id.0.clone(),
            peer_tag: base_headers.from.tag.clone(),
            local_tag: base_headers.to.tag.clone()?,
        })
    }
}

impl fmt::Display for DialogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.call_id,
            self.local_tag,
            self.peer_tag.as_deref().unwrap_or("")
        )
    }
}
