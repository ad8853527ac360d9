//! Requests through the RPC facade against a running media server
//!
//! These tests verify:
//! - Object and connection operations by name
//! - Error code mapping
//! - Event push to client sessions and session teardown
//! - SDP offer processing

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rmedia_infra_common::ServerConfig;
use rmedia_media_core::MediaServer;
use rmedia_rpc_core::prelude::*;

async fn setup() -> (RpcFacade, ClientSession, mpsc::Receiver<RpcNotification>) {
    let sessions = Arc::new(SessionRegistry::new());
    let sink = Arc::new(SessionEventSink::new(sessions.clone()));
    let server = Arc::new(MediaServer::with_builtins(ServerConfig::default(), sink).unwrap());
    server.start().await.unwrap();

    let facade = RpcFacade::new(server, sessions);
    let (session, rx) = facade.open_session(16);
    (facade, session, rx)
}

async fn call(facade: &RpcFacade, session: &ClientSession, request: RpcRequest) -> Value {
    match facade.handle(session, request.clone()).await {
        RpcResponse::Result(value) => value,
        RpcResponse::Error(e) => panic!("{} failed: {:?}", request.operation, e),
    }
}

async fn code(facade: &RpcFacade, session: &ClientSession, request: RpcRequest) -> i32 {
    facade
        .handle(session, request)
        .await
        .code()
        .expect("request should fail")
}

fn id_of(value: &Value, key: &str) -> rmedia_media_core::ObjectId {
    serde_json::from_value(value[key].clone()).unwrap()
}

#[tokio::test]
async fn test_create_describe_destroy() {
    let (facade, session, _rx) = setup().await;

    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let endpoint = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create")
                .on(pipeline)
                .with_params(json!({ "type": "RtpEndpoint", "name": "leg-a", "retentionMs": 5000 })),
        )
        .await,
        "objectId",
    );

    let info = call(&facade, &session, RpcRequest::new("describe").on(endpoint)).await;
    assert_eq!(info["typeName"], "RtpEndpoint");
    assert_eq!(info["name"], "leg-a");
    assert_eq!(info["retentionMs"], 5000);

    let children = call(&facade, &session, RpcRequest::new("children").on(pipeline)).await;
    assert_eq!(children["children"], json!([endpoint]));

    let outcome = call(&facade, &session, RpcRequest::new("destroy").on(pipeline)).await;
    assert_eq!(outcome, json!({ "outcome": "destroyed", "count": 2 }));
    let outcome = call(&facade, &session, RpcRequest::new("destroy").on(pipeline)).await;
    assert_eq!(outcome, json!({ "outcome": "alreadyReleased" }));
}

#[tokio::test]
async fn test_error_codes() {
    let (facade, session, _rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let filter = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "GStreamerFilter" })),
        )
        .await,
        "objectId",
    );

    assert_eq!(code(&facade, &session, RpcRequest::new("explode")).await, error_codes::METHOD_NOT_FOUND);
    assert_eq!(code(&facade, &session, RpcRequest::new("describe")).await, error_codes::INVALID_PARAMS);
    assert_eq!(
        code(&facade, &session, RpcRequest::new("describe").on(rmedia_media_core::ObjectId::new())).await,
        error_codes::NOT_FOUND
    );
    assert_eq!(
        code(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "RtpEndpoint" }))).await,
        error_codes::INVALID_PARENT
    );
    assert_eq!(
        code(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "HologramEndpoint" }))
        )
        .await,
        error_codes::UNSUPPORTED_KIND
    );
    assert_eq!(
        code(
            &facade,
            &session,
            RpcRequest::new("subscribe").on(filter).with_params(json!({ "type": "Negotiated" }))
        )
        .await,
        error_codes::UNSUPPORTED_EVENT
    );
    assert_eq!(
        code(&facade, &session, RpcRequest::new("createConnection").on(filter)).await,
        error_codes::INVALID_PARENT
    );
}

#[tokio::test]
async fn test_connection_errors() {
    let (facade, session, _rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let endpoint = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "WebRtcEndpoint" })),
        )
        .await,
        "objectId",
    );
    let created = call(&facade, &session, RpcRequest::new("createConnection").on(endpoint)).await;
    let connection = created["connectionId"].clone();

    let remote = json!({ "connectionId": connection, "sdp": "v=0\r\nm=audio 4000 RTP/AVP 0\r\n" });
    assert_eq!(
        code(&facade, &session, RpcRequest::new("negotiate").with_params(remote.clone())).await,
        error_codes::MISSING_LOCAL_SPEC
    );

    // Both or neither description forms
    assert_eq!(
        code(
            &facade,
            &session,
            RpcRequest::new("setLocalSpec").with_params(json!({ "connectionId": connection }))
        )
        .await,
        error_codes::INVALID_PARAMS
    );
    assert_eq!(
        code(
            &facade,
            &session,
            RpcRequest::new("setLocalSpec").with_params(json!({ "connectionId": connection, "sdp": "m=audio" }))
        )
        .await,
        error_codes::INVALID_PARAMS
    );

    let close = RpcRequest::new("closeConnection").with_params(json!({ "connectionId": connection }));
    call(&facade, &session, close.clone()).await;
    assert_eq!(code(&facade, &session, close).await, error_codes::INVALID_STATE);
    assert_eq!(
        code(&facade, &session, RpcRequest::new("negotiate").with_params(remote)).await,
        error_codes::INVALID_STATE
    );

    let info = call(
        &facade,
        &session,
        RpcRequest::new("connectionInfo").with_params(json!({ "connectionId": connection })),
    )
    .await;
    assert_eq!(info["state"], "closed");
}

#[tokio::test]
async fn test_events_are_pushed_to_the_session() {
    let (facade, session, mut rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let player = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "PlayerEndpoint" })),
        )
        .await,
        "objectId",
    );
    let subscribed = call(
        &facade,
        &session,
        RpcRequest::new("subscribe").on(player).with_params(json!({ "type": "Destroyed" })),
    )
    .await;

    call(&facade, &session, RpcRequest::new("destroy").on(player)).await;

    let pushed = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(pushed.jsonrpc, "2.0");
    assert_eq!(pushed.method, "onEvent");
    assert_eq!(pushed.params.object_id, player);
    assert_eq!(json!(pushed.params.subscription_id), subscribed["subscriptionId"]);

    let removed = call(
        &facade,
        &session,
        RpcRequest::new("unsubscribe").with_params(json!({ "subscriptionId": subscribed["subscriptionId"] })),
    )
    .await;
    assert_eq!(removed, json!({ "removed": false }));
}

#[tokio::test]
async fn test_closing_a_session_releases_subscriptions() {
    let (facade, session, _rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    for event in ["Created", "Destroyed"] {
        call(
            &facade,
            &session,
            RpcRequest::new("subscribe").on(pipeline).with_params(json!({ "type": event })),
        )
        .await;
    }

    assert_eq!(facade.close_session(&session), 2);
    assert!(!facade.sessions().contains(&session.token));
    assert_eq!(facade.server().stats().dispatch.subscriptions, 0);
}

#[tokio::test]
async fn test_process_offer_returns_answer() {
    let (facade, session, _rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let endpoint = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "RtpEndpoint" })),
        )
        .await,
        "objectId",
    );
    let created = call(
        &facade,
        &session,
        RpcRequest::new("createConnection").on(endpoint).with_params(json!({ "role": "answerer" })),
    )
    .await;
    let connection = created["connectionId"].clone();

    call(
        &facade,
        &session,
        RpcRequest::new("setLocalSpec").with_params(json!({
            "connectionId": connection,
            "sdp": "v=0\r\nm=audio 9 RTP/AVP 0\r\nm=video 9 RTP/AVP 96\r\na=rtpmap:96 VP8/90000\r\n",
        })),
    )
    .await;

    let offer = "v=0\r\n\
                 o=- 42 1 IN IP4 192.0.2.10\r\n\
                 s=call\r\n\
                 c=IN IP4 192.0.2.10\r\n\
                 t=0 0\r\n\
                 m=audio 49170 RTP/AVP 111 0\r\n\
                 a=rtpmap:111 opus/48000/2\r\n\
                 a=rtpmap:0 PCMU/8000\r\n\
                 m=video 49172 RTP/AVP 98\r\n\
                 a=rtpmap:98 H264/90000\r\n";
    let answered = call(
        &facade,
        &session,
        RpcRequest::new("processOffer").with_params(json!({ "connectionId": connection, "offer": offer })),
    )
    .await;

    assert_eq!(answered["empty"], false);
    let answer = answered["answer"].as_str().unwrap();
    assert!(answer.contains("m=audio 9 RTP/AVP 0\r\n"), "{}", answer);
    assert!(answer.contains("a=rtpmap:0 PCMU/8000\r\n"), "{}", answer);
    assert!(answer.contains("m=video 0 RTP/AVP 0\r\n"), "{}", answer);

    // Same offer again is served from the stored session
    let negotiated = call(
        &facade,
        &session,
        RpcRequest::new("negotiate").with_params(json!({ "connectionId": connection, "sdp": offer })),
    )
    .await;
    assert_eq!(negotiated["cached"], true);
}

#[tokio::test]
async fn test_process_offer_needs_answerer() {
    let (facade, session, _rx) = setup().await;
    let pipeline = id_of(
        &call(&facade, &session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" }))).await,
        "objectId",
    );
    let endpoint = id_of(
        &call(
            &facade,
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "RtpEndpoint" })),
        )
        .await,
        "objectId",
    );
    let created = call(
        &facade,
        &session,
        RpcRequest::new("createConnection").on(endpoint).with_params(json!({ "role": "offerer" })),
    )
    .await;

    let request = RpcRequest::new("processOffer")
        .with_params(json!({ "connectionId": created["connectionId"], "offer": "v=0\r\n" }));
    assert_eq!(code(&facade, &session, request).await, error_codes::INVALID_STATE);
}

#[tokio::test]
async fn test_ping_and_server_info() {
    let (facade, session, _rx) = setup().await;
    assert_eq!(call(&facade, &session, RpcRequest::new("ping")).await, json!({ "pong": true }));

    let info = call(&facade, &session, RpcRequest::new("serverInfo")).await;
    assert_eq!(info["running"], true);
    let types: Vec<String> = serde_json::from_value(info["elementTypes"].clone()).unwrap();
    assert!(types.contains(&"WebRtcEndpoint".to_string()));
    assert!(types.contains(&"Composite".to_string()));
}
