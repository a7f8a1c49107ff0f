use sip_core::transport::udp::Udp;
use sip_core::transport::TargetTransportInfo;
use sip_core::{Endpoint, IncomingRequest, Layer, MayTake, Request};
use sip_types::header::typed::{CSeq, CallID, MaxForwards};
use sip_types::uri::SipUri;
use sip_types::{Code, Method, Name};

/// Minimal transaction user answering every OPTIONS request with 200 OK
struct OptionsLayer;

#[async_trait::async_trait]
impl Layer for OptionsLayer {
    fn name(&self) -> &'static str {
        "options"
    }

    async fn receive(&self, endpoint: &Endpoint, request: MayTake<'_, IncomingRequest>) {
        if request.line.method != Method::OPTIONS {
            return;
        }

        let request = request.take();

        let response = endpoint.create_response(&request, Code::OK, None);

        let tsx = endpoint.create_server_tsx(&request);

        tsx.respond(response).await.unwrap();
    }
}

fn options_request(target: SipUri) -> Request {
    let mut request = Request::new(Method::OPTIONS, target);

    request
        .headers
        .insert(Name::FROM, "<sip:client@example.com>;tag=abc123");
    request.headers.insert(Name::TO, "<sip:test@example.com>");
    request
        .headers
        .insert_named(&CallID::new("option-round-trip-test"));
    request
        .headers
        .insert_named(&CSeq::new(1, Method::OPTIONS));
    request.headers.insert_named(&MaxForwards(70));

    request
}

#[tokio::test]
async fn options_round_trip_over_udp() {
    let mut server = Endpoint::builder();
    server.add_layer(OptionsLayer);
    let server_addr = Udp::spawn(&mut server, "127.0.0.1:0").await.unwrap();
    let _server = server.build();

    let mut client = Endpoint::builder();
    Udp::spawn(&mut client, "127.0.0.1:0").await.unwrap();
    let client = client.build();

    let target: SipUri = format!("sip:test@{}", server_addr).parse().unwrap();

    let mut target_info = TargetTransportInfo::default();

    let mut tsx = client
        .send_request(options_request(target), &mut target_info)
        .await
        .unwrap();

    let response = tsx.receive_final().await.unwrap();

    assert_eq!(response.line.code, Code::OK);
    assert_eq!(response.base_headers.cseq.cseq, 1);

    // the final response terminated the transaction
    assert!(tsx.receive().await.is_err());
}

#[tokio::test]
async fn oversized_udp_request_is_refused() {
    let mut server = Endpoint::builder();
    let server_addr = Udp::spawn(&mut server, "127.0.0.1:0").await.unwrap();
    let _server = server.build();

    let mut client = Endpoint::builder();
    Udp::spawn(&mut client, "127.0.0.1:0").await.unwrap();
    let client = client.build();

    let target: SipUri = format!("sip:test@{}", server_addr).parse().unwrap();

    let mut request = options_request(target);
    request.body = bytes::Bytes::from(vec![b'x'; 1400]);

    let mut target_info = TargetTransportInfo::default();

    let err = client
        .send_request(request, &mut target_info)
        .await
        .unwrap_err();

    assert!(matches!(err, sip_core::Error::MessageTooLarge { .. }));
}

#[tokio::test]
async fn unhandled_request_is_answered_481() {
    let mut server = Endpoint::builder();
    let server_addr = Udp::spawn(&mut server, "127.0.0.1:0").await.unwrap();
    let _server = server.build();

    let mut client = Endpoint::builder();
    Udp::spawn(&mut client, "127.0.0.1:0").await.unwrap();
    let client = client.build();

    let target: SipUri = format!("sip:test@{}", server_addr).parse().unwrap();

    let mut request = options_request(target);
    request.line.method = Method::BYE;
    request
        .headers
        .edit_named(|cseq: &mut CSeq| cseq.method = Method::BYE)
        .unwrap();

    let mut target_info = TargetTransportInfo::default();

    let mut tsx = client
        .send_request(request, &mut target_info)
        .await
        .unwrap();

    let response = tsx.receive_final().await.unwrap();

    assert_eq!(response.line.code, Code::CALL_OR_TRANSACTION_DOES_NOT_EXIST);

    // non-100 responses carry a To-tag
    assert!(response.base_headers.to.tag.is_some());
}
