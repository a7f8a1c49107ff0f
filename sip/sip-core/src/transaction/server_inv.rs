use super::TsxRegistration;
use crate::error::Error;
use crate::transport::OutgoingResponse;
use crate::{Endpoint, IncomingRequest, Result};
use sip_types::msg::MessageLine;
use sip_types::{Code, CodeKind, Method};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout_at};

/// Server INVITE transaction. Used to respond to the incoming request.
///
/// Note that the correct functions must be used to send different kinds
/// of responses, as provisional, success and error responses all need
/// different handling.
///
/// If the transaction user has not responded 200ms after the transaction
/// was created, a 100 Trying is sent automatically.
///
/// Dropping the transaction prematurely can lead to weird/unexpected behavior.
#[derive(Debug)]
pub struct ServerInvTsx {
    registration: TsxRegistration,
    responded: Arc<AtomicBool>,
}

impl ServerInvTsx {
    /// Internal: Used by [Endpoint::create_server_inv_tsx]
    pub(crate) fn new(endpoint: Endpoint, request: &IncomingRequest) -> Self {
        assert_eq!(
            request.line.method,
            Method::INVITE,
            "tried to create invite transaction from {} request",
            request.line.method
        );

        let registration = TsxRegistration::create(endpoint, request.tsx_key.clone());

        let responded = Arc::new(AtomicBool::new(false));

        // automatic 100 Trying if the transaction user stays quiet too long
        let mut trying = registration
            .endpoint
            .create_response(request, Code::TRYING, None);
        let delay = registration.endpoint.timers().trying_delay;
        let endpoint = registration.endpoint.clone();
        let responded_flag = responded.clone();

        tokio::spawn(async move {
            sleep(delay).await;

            if !responded_flag.load(Ordering::Relaxed) {
                if let Err(e) = endpoint.send_outgoing_response(&mut trying).await {
                    log::warn!("Failed to send automatic 100 Trying, {}", e);
                }
            }
        });

        Self {
            registration,
            responded,
        }
    }

    /// Respond with a provisional response (1XX)
    ///
    /// # Panics
    /// Panics if the given response is not a provisional response
    pub async fn respond_provisional(&mut self, response: &mut OutgoingResponse) -> Result<()> {
        assert_eq!(response.msg.line.code.kind(), CodeKind::Provisional);

        self.responded.store(true, Ordering::Relaxed);

        self.registration
            .endpoint
            .send_outgoing_response(response)
            .await?;

        // INVITE retransmissions which queued up are answered with
        // the latest provisional response
        while let Some(msg) = self.registration.try_receive() {
            if matches!(&msg.line, MessageLine::Request(line) if line.method == Method::INVITE) {
                self.registration
                    .endpoint
                    .send_outgoing_response(response)
                    .await?;
            }
        }

        Ok(())
    }

    /// Respond with a success response (2XX)
    ///
    /// # Returns
    /// The [`Accepted`] struct represents the `Accepted` state of the transaction.
    /// The TU is responsible for retransmits of the final success response since the TU is the
    /// one receiving the ACK request and not the transaction.
    ///
    /// # Panics
    /// Panics if the given response is not a success response
    pub async fn respond_success(self, mut response: OutgoingResponse) -> Result<Accepted> {
        assert_eq!(response.msg.line.code.kind(), CodeKind::Success);

        self.responded.store(true, Ordering::Relaxed);

        // Responding with a success message!
        // Add filter to reject any ACK messages as some implementations seem to re-use the
        // transaction-id for the ACK sent by the UAC.
        self.registration.add_filter(
            |tsx_msg| !matches!(&tsx_msg.line, MessageLine::Request(line) if line.method == Method::ACK),
        );

        self.registration
            .endpoint
            .send_outgoing_response(&mut response)
            .await?;

        // Timer L bounds how long the accepted transaction may linger
        let abandon = Instant::now() + self.registration.endpoint.timers().timeout();

        Ok(Accepted {
            registration: self.registration,
            response,
            abandon,
        })
    }

    /// Respond with a failure response (3XX-6XX)
    ///
    /// # Panics
    /// Panics if the given response is not a failure response
    pub async fn respond_failure(mut self, mut response: OutgoingResponse) -> Result<()> {
        assert!(!matches!(
            response.msg.line.code.kind(),
            CodeKind::Provisional | CodeKind::Success
        ));

        self.responded.store(true, Ordering::Relaxed);

        let timers = *self.registration.endpoint.timers();

        self.registration
            .endpoint
            .send_outgoing_response(&mut response)
            .await?;

        // Timer H, after this instant is over the tsx will time out
        let abandon_retransmit = Instant::now() + timers.timeout();

        // Timer G, the duration to wait until next retransmit
        let mut retransmit_delta = timers.t1;

        // timestamp for next retransmit
        let mut retransmit = Instant::now() + retransmit_delta;

        // wait for ack and retransmit if necessary
        loop {
            match timeout_at(retransmit.into(), self.registration.receive()).await {
                Ok(inc_msg) => {
                    // two things are allowed to happen here
                    // 1 - the transaction receives a retransmission of the initial invite
                    // 2 - it receives an ACK request which completes the transaction
                    match &inc_msg.line {
                        MessageLine::Request(line) if line.method == Method::INVITE => {
                            // in case of a retransmission,
                            // retransmit the response
                            self.registration
                                .endpoint
                                .send_outgoing_response(&mut response)
                                .await?;
                        }
                        MessageLine::Request(line) if line.method == Method::ACK => {
                            // Confirmed, wait out Timer I to absorb further
                            // ACK retransmissions before terminating
                            if !response.parts.transport.reliable() {
                                let mut registration = self.registration;
                                tokio::spawn(async move {
                                    let timeout = Instant::now() + timers.t4;

                                    while timeout_at(timeout.into(), registration.receive())
                                        .await
                                        .is_ok()
                                    {}
                                });
                            }

                            return Ok(());
                        }
                        _ => {
                            // everything else gets ignored
                        }
                    }
                }
                Err(_) => {
                    // retransmit timeout triggered

                    if Instant::now() > abandon_retransmit {
                        return Err(Error::RequestTimedOut);
                    }

                    if !response.parts.transport.reliable() {
                        // do the retransmit
                        self.registration
                            .endpoint
                            .send_outgoing_response(&mut response)
                            .await?;
                    }

                    // increase the wait time until next retransmit
                    retransmit_delta = (retransmit_delta * 2).min(timers.t2);

                    // set next timestamp
                    retransmit = Instant::now() + retransmit_delta;
                }
            }
        }
    }
}

/// Represents the `Accepted` state of a transaction. Its used to retransmit the
/// final success response to eventually receive the ACK request from the peer.
#[must_use]
#[derive(Debug)]
pub struct Accepted {
    registration: TsxRegistration,
    response: OutgoingResponse,
    abandon: Instant,
}

impl Accepted {
    /// Retransmit the final response
    pub async fn retransmit(&mut self) -> io::Result<()> {
        self.registration
            .endpoint
            .send_outgoing_response(&mut self.response)
            .await
            .map_err(|e| match e {
                Error::Io(io) => io,
                other => io::Error::other(other),
            })
    }

    /// Returns whether Timer L has expired and the transaction should be abandoned
    pub fn timed_out(&self) -> bool {
        Instant::now() > self.abandon
    }
}
