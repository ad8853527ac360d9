//! End-to-end walk through the control plane as a client sees it

use serde_json::json;
use std::time::Duration;

use rmedia::infra_common::ServerConfig;
use rmedia::prelude::*;

#[tokio::test]
async fn test_two_party_call_setup_and_teardown() {
    let plane = ControlPlane::start(ServerConfig::default()).await.unwrap();
    let facade = plane.facade();
    let (session, mut events) = facade.open_session(32);

    let pipeline = facade
        .handle(&session, RpcRequest::new("create").with_params(json!({ "type": "MediaPipeline" })))
        .await;
    let pipeline: ObjectId = serde_json::from_value(pipeline.result().unwrap()["objectId"].clone()).unwrap();

    let mut legs = Vec::new();
    for name in ["alice", "bob"] {
        let created = facade
            .handle(
                &session,
                RpcRequest::new("create")
                    .on(pipeline)
                    .with_params(json!({ "type": "RtpEndpoint", "name": name })),
            )
            .await;
        let leg: ObjectId = serde_json::from_value(created.result().unwrap()["objectId"].clone()).unwrap();
        facade
            .handle(
                &session,
                RpcRequest::new("subscribe").on(leg).with_params(json!({ "type": "Destroyed" })),
            )
            .await;
        legs.push(leg);
    }

    let mixer = facade
        .handle(
            &session,
            RpcRequest::new("create").on(pipeline).with_params(json!({ "type": "Composite" })),
        )
        .await;
    let mixer: ObjectId = serde_json::from_value(mixer.result().unwrap()["objectId"].clone()).unwrap();
    for leg in &legs {
        let port = facade
            .handle(
                &session,
                RpcRequest::new("create")
                    .on(mixer)
                    .with_params(json!({ "type": "MixerPort", "routed": leg })),
            )
            .await;
        assert!(port.is_success(), "{:?}", port);
    }

    let info = facade.handle(&session, RpcRequest::new("serverInfo")).await;
    assert_eq!(info.result().unwrap()["stats"]["objects"]["mixerPorts"], 2);

    let destroyed = facade.handle(&session, RpcRequest::new("destroy").on(pipeline)).await;
    assert_eq!(destroyed.result().unwrap()["count"], 6);

    let mut gone = Vec::new();
    for _ in 0..2 {
        let pushed = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.params.event_type, EventType::Destroyed);
        gone.push(pushed.params.object_id);
    }
    gone.sort();
    legs.sort();
    assert_eq!(gone, legs);

    assert_eq!(facade.close_session(&session), 0);
    plane.shutdown().await.unwrap();
}
