use super::TsxRegistration;
use crate::transport::OutgoingResponse;
use crate::{Endpoint, IncomingRequest, Result};
use sip_types::{CodeKind, Method};
use std::time::Instant;
use tokio::time::timeout_at;

/// Server non-INVITE transaction. Used to respond to the incoming request.
///
/// Dropping the transaction prematurely can lead to weird/unexpected behavior.
#[derive(Debug)]
pub struct ServerTsx {
    registration: TsxRegistration,
}

impl ServerTsx {
    /// Internal: Used by [Endpoint::create_server_tsx]
    pub(crate) fn new(endpoint: Endpoint, request: &IncomingRequest) -> Self {
        assert!(
            !matches!(request.line.method, Method::INVITE | Method::ACK),
            "tried to create server transaction from {} request",
            request.line.method
        );

        let registration = TsxRegistration::create(endpoint, request.tsx_key.clone());

        Self { registration }
    }

    /// Respond with a provisional response (1XX)
    ///
    /// # Panics
    /// Panics if the given response is not a provisional response
    pub async fn respond_provisional(&mut self, response: &mut OutgoingResponse) -> Result<()> {
        assert_eq!(response.msg.line.code.kind(), CodeKind::Provisional);

        self.registration
            .endpoint
            .send_outgoing_response(response)
            .await?;

        // absorb request retransmissions which queued up, answering
        // each with the latest response
        while let Some(msg) = self.registration.try_receive() {
            if msg.line.is_request() {
                self.registration
                    .endpoint
                    .send_outgoing_response(response)
                    .await?;
            }
        }

        Ok(())
    }

    /// Respond with a final response (2XX-6XX), consuming the transaction
    ///
    /// # Panics
    /// Panics if the given response is a provisional response
    pub async fn respond(mut self, mut response: OutgoingResponse) -> Result<()> {
        assert_ne!(response.msg.line.code.kind(), CodeKind::Provisional);

        self.registration
            .endpoint
            .send_outgoing_response(&mut response)
            .await?;

        if response.parts.transport.reliable() {
            return Ok(());
        }

        // Timer J, absorb request retransmissions by replaying the final response
        let abandon = Instant::now() + self.registration.endpoint.timers().timeout();

        tokio::spawn(async move {
            while let Ok(msg) = timeout_at(abandon.into(), self.registration.receive()).await {
                if msg.line.is_request() {
                    if let Err(e) = self
                        .registration
                        .endpoint
                        .send_outgoing_response(&mut response)
                        .await
                    {
                        log::warn!("Failed to retransmit response, {}", e);
                    }
                }
            }
        });

        Ok(())
    }
}
