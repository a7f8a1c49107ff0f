use sip_core::transport::udp::Udp;
use sip_core::{Endpoint, IncomingRequest, Layer, LayerKey, MayTake};
use sip_types::header::typed::Contact;
use sip_types::uri::{NameAddr, SipUri};
use sip_types::{Code, Method};
use sip_ua::dialog::{DialogLayer, DialogStateKind};
use sip_ua::invite::acceptor::Acceptor;
use sip_ua::invite::initiator::{Initiator, Response};
use sip_ua::invite::session::Event;
use sip_ua::invite::InviteLayer;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, PartialEq)]
enum ServerEvent {
    Confirmed,
    ByeAnswered,
    Cancelled,
}

/// Accepts incoming calls with 180 + 200 and then waits for the BYE
struct AnswerLayer {
    dialog_layer: LayerKey<DialogLayer>,
    invite_layer: LayerKey<InviteLayer>,
    contact: Contact,
    events: mpsc::UnboundedSender<ServerEvent>,
}

#[async_trait::async_trait]
impl Layer for AnswerLayer {
    fn name(&self) -> &'static str {
        "answer"
    }

    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>) {
        if request.line.method != Method::INVITE {
            return;
        }

        let invite = request.take();

        let mut acceptor = Acceptor::new(
            endpoint.clone(),
            self.dialog_layer,
            self.invite_layer,
            invite,
            self.contact.clone(),
        )
        .unwrap();

        let ringing = acceptor.create_response(Code::RINGING, None).await.unwrap();
        acceptor.respond_provisional(ringing).await.unwrap();

        let ok = acceptor.create_response(Code::OK, None).await.unwrap();
        let (mut session, _ack) = acceptor.respond_success(ok).await.unwrap();

        assert_eq!(session.dialog.state.get(), DialogStateKind::Confirmed);
        self.events.send(ServerEvent::Confirmed).unwrap();

        match session.drive().await.unwrap() {
            Event::Bye(bye) => {
                bye.process_default().await.unwrap();
                self.events.send(ServerEvent::ByeAnswered).unwrap();
            }
            _ => panic!("expected BYE"),
        }
    }
}

/// Rings forever, expecting the caller to CANCEL
struct RingingLayer {
    dialog_layer: LayerKey<DialogLayer>,
    invite_layer: LayerKey<InviteLayer>,
    contact: Contact,
    events: mpsc::UnboundedSender<ServerEvent>,
}

#[async_trait::async_trait]
impl Layer for RingingLayer {
    fn name(&self) -> &'static str {
        "ringing"
    }

    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>) {
        if request.line.method != Method::INVITE {
            return;
        }

        let invite = request.take();

        let mut acceptor = Acceptor::new(
            endpoint.clone(),
            self.dialog_layer,
            self.invite_layer,
            invite,
            self.contact.clone(),
        )
        .unwrap();

        let (cancelled_tx, cancelled_rx) = tokio::sync::oneshot::channel();

        acceptor
            .on_cancel(move || {
                let _ = cancelled_tx.send(());
            })
            .await;

        let ringing = acceptor.create_response(Code::RINGING, None).await.unwrap();
        acceptor.respond_provisional(ringing).await.unwrap();

        // the invite layer responds 487/200, the acceptor just has to
        // stay alive until then
        cancelled_rx.await.unwrap();

        self.events.send(ServerEvent::Cancelled).unwrap();
    }
}

struct TestServer {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    _endpoint: Endpoint,
}

async fn spawn_server<F, L>(make_layer: F) -> TestServer
where
    F: FnOnce(
        LayerKey<DialogLayer>,
        LayerKey<InviteLayer>,
        Contact,
        mpsc::UnboundedSender<ServerEvent>,
    ) -> L,
    L: Layer,
{
    let mut builder = Endpoint::builder();

    let dialog_layer = builder.add_layer(DialogLayer::default());
    let invite_layer = builder.add_layer(InviteLayer::default());

    let addr = Udp::spawn(&mut builder, "127.0.0.1:0").await.unwrap();

    let contact_uri: SipUri = format!("sip:server@{}", addr).parse().unwrap();
    let contact = Contact::new(NameAddr::uri(contact_uri));

    let (events_tx, events) = mpsc::unbounded_channel();

    builder.add_layer(make_layer(dialog_layer, invite_layer, contact, events_tx));

    TestServer {
        addr,
        events,
        _endpoint: builder.build(),
    }
}

async fn spawn_client(server_addr: SocketAddr) -> Initiator {
    let mut builder = Endpoint::builder();

    let dialog_layer = builder.add_layer(DialogLayer::default());
    let invite_layer = builder.add_layer(InviteLayer::default());

    let addr = Udp::spawn(&mut builder, "127.0.0.1:0").await.unwrap();

    let endpoint = builder.build();

    let local_addr = NameAddr::uri("sip:client@example.com".parse().unwrap());

    let contact_uri: SipUri = format!("sip:client@{}", addr).parse().unwrap();
    let contact = Contact::new(NameAddr::uri(contact_uri));

    let target: SipUri = format!("sip:server@{}", server_addr).parse().unwrap();

    Initiator::new(
        endpoint,
        dialog_layer,
        invite_layer,
        local_addr,
        contact,
        target,
    )
}

#[tokio::test]
async fn call_established_and_terminated() {
    let mut server = spawn_server(|dialog_layer, invite_layer, contact, events| AnswerLayer {
        dialog_layer,
        invite_layer,
        contact,
        events,
    })
    .await;

    let mut initiator = spawn_client(server.addr).await;

    let invite = initiator.create_invite();
    initiator.send_invite(invite).await.unwrap();

    let mut got_ringing = false;

    let run = async {
        loop {
            match initiator.receive().await.unwrap() {
                Response::Provisional(response) => {
                    if response.line.code == Code::RINGING {
                        got_ringing = true;
                    }
                }
                Response::Session(mut session, response) => {
                    assert_eq!(response.line.code, Code::OK);
                    assert_eq!(session.dialog.state.get(), DialogStateKind::Established);

                    session.confirm().await.unwrap();
                    assert_eq!(session.dialog.state.get(), DialogStateKind::Confirmed);

                    session.terminate().await.unwrap();
                    assert_eq!(session.dialog.state.get(), DialogStateKind::Ended);

                    return;
                }
                other => panic!("unexpected response {:?}", other),
            }
        }
    };

    timeout(Duration::from_secs(10), run).await.unwrap();

    assert!(got_ringing);

    let first = timeout(Duration::from_secs(10), server.events.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(ServerEvent::Confirmed));

    let second = timeout(Duration::from_secs(10), server.events.recv())
        .await
        .unwrap();
    assert_eq!(second, Some(ServerEvent::ByeAnswered));
}

#[tokio::test]
async fn call_cancelled_while_ringing() {
    let mut server = spawn_server(|dialog_layer, invite_layer, contact, events| RingingLayer {
        dialog_layer,
        invite_layer,
        contact,
        events,
    })
    .await;

    let mut initiator = spawn_client(server.addr).await;

    let invite = initiator.create_invite();
    initiator.send_invite(invite).await.unwrap();

    let run = async {
        let mut cancel_sent = false;

        loop {
            match initiator.receive().await {
                Ok(Response::Provisional(response)) => {
                    if response.line.code == Code::RINGING && !cancel_sent {
                        initiator.cancel().await.unwrap();
                        cancel_sent = true;
                    }
                }
                Err(e) => {
                    // the peer's 487 concludes the cancelled INVITE
                    assert!(cancel_sent);
                    assert!(matches!(e, sip_core::Error::Cancelled));
                    return;
                }
                Ok(other) => panic!("unexpected response {:?}", other),
            }
        }
    };

    timeout(Duration::from_secs(10), run).await.unwrap();

    let event = timeout(Duration::from_secs(10), server.events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(ServerEvent::Cancelled));
}
