//! Connections, negotiation and their coupling to endpoint lifetime

mod common;

use common::*;
use rmedia_media_core::prelude::*;
use rmedia_sdp_core::{parse_sdp, CapabilityDescription, Direction, MediaDescriptor, PayloadDescriptor};
use std::sync::Arc;

fn audio(codecs: &[(&str, u32)]) -> CapabilityDescription {
    CapabilityDescription::new(vec![MediaDescriptor::audio(
        codecs
            .iter()
            .enumerate()
            .map(|(rank, (name, rate))| PayloadDescriptor::new(*name, *rate).with_rank(rank as u32))
            .collect(),
    )])
}

#[tokio::test]
async fn test_negotiate_without_local_spec() {
    let (server, _, _) = server_with_engine(test_config());
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let conn = server.create_connection(endpoint, Role::Answerer).await.unwrap();

    let err = server.negotiate(conn, audio(&[("PCMU", 8000)])).await.unwrap_err();
    assert!(matches!(err, MediaError::MissingLocalSpec(_)));
    assert_eq!(server.connection_info(conn).unwrap().state, ConnectionState::Created);
}

#[tokio::test]
async fn test_answerer_negotiation_from_sdp() {
    let (server, _, _) = server_with_engine(test_config());
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("RtpEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let conn = server.create_connection(endpoint, Role::Answerer).await.unwrap();

    server
        .set_local_spec(conn, audio(&[("PCMU", 8000), ("PCMA", 8000)]))
        .await
        .unwrap();
    assert_eq!(server.connection_info(conn).unwrap().state, ConnectionState::LocalSpecSet);

    let offer = parse_sdp(
        "v=0\r\n\
         o=- 1 1 IN IP4 10.0.0.1\r\n\
         s=-\r\n\
         c=IN IP4 10.0.0.1\r\n\
         t=0 0\r\n\
         m=audio 5004 RTP/AVP 111 8 0\r\n\
         a=rtpmap:111 opus/48000/2\r\n\
         a=rtpmap:8 PCMA/8000\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=sendonly\r\n",
    )
    .unwrap();

    let outcome = server.negotiate(conn, offer).await.unwrap();
    let line = &outcome.session.result.media[0];
    assert!(!line.rejected);
    assert_eq!(line.direction, Direction::SendOnly);
    let names: Vec<&str> = line.payloads.iter().map(|p| p.encoding_name.as_str()).collect();
    assert_eq!(names, vec!["PCMA", "PCMU"]);

    let info = server.connection_info(conn).unwrap();
    assert_eq!(info.state, ConnectionState::Negotiated);
    assert_eq!(info.result.as_ref(), Some(&outcome.session.result));
}

#[tokio::test]
async fn test_renegotiation_replaces_session() {
    let (server, _, _) = server_with_engine(test_config());
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let conn = server.create_connection(endpoint, Role::Offerer).await.unwrap();
    server
        .set_local_spec(conn, audio(&[("opus", 48000), ("PCMU", 8000)]))
        .await
        .unwrap();

    let first = server.negotiate(conn, audio(&[("PCMU", 8000)])).await.unwrap();
    let cached = server.negotiate(conn, audio(&[("PCMU", 8000)])).await.unwrap();
    assert!(cached.cached);
    assert!(Arc::ptr_eq(&first.session, &cached.session));

    let second = server.negotiate(conn, audio(&[("opus", 48000)])).await.unwrap();
    assert!(!second.cached);
    assert_eq!(second.session.result.media[0].payloads[0].encoding_name, "opus");

    // Local spec is fixed once negotiation started
    let err = server.set_local_spec(conn, audio(&[("PCMA", 8000)])).await.unwrap_err();
    assert!(matches!(err, MediaError::InvalidState(_)));
}

#[tokio::test]
async fn test_unmatched_offer_is_rejected_not_failed() {
    let (server, _, _) = server_with_engine(test_config());
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("RtpEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let conn = server.create_connection(endpoint, Role::Answerer).await.unwrap();
    server.set_local_spec(conn, audio(&[("PCMU", 8000)])).await.unwrap();

    let outcome = server.negotiate(conn, audio(&[("G722", 8000)])).await.unwrap();
    assert!(outcome.session.result.is_empty());
    assert_eq!(outcome.session.result.media[0].direction, Direction::Inactive);
}

#[tokio::test]
async fn test_concurrent_negotiations_settle_on_one_result() {
    let (server, _, _) = server_with_engine(test_config());
    let server = Arc::new(server);
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let conn = server.create_connection(endpoint, Role::Answerer).await.unwrap();
    server
        .set_local_spec(conn, audio(&[("opus", 48000), ("PCMU", 8000), ("PCMA", 8000)]))
        .await
        .unwrap();

    let offers = [
        audio(&[("opus", 48000)]),
        audio(&[("PCMU", 8000)]),
        audio(&[("PCMA", 8000)]),
    ];
    let mut handles = Vec::new();
    for offer in offers.iter().cloned() {
        let server = server.clone();
        handles.push(tokio::spawn(async move { server.negotiate(conn, offer).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let info = server.connection_info(conn).unwrap();
    assert_eq!(info.state, ConnectionState::Negotiated);
    let result = info.result.unwrap();
    let remote = info.remote.unwrap();
    assert!(offers.contains(&remote));
    assert_eq!(
        result.media[0].payloads[0].encoding_name,
        remote.media[0].payloads[0].encoding_name
    );
}

#[tokio::test]
async fn test_destroying_endpoint_releases_connections() {
    let (server, _, _) = server_with_engine(test_config());
    let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
    let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
    let first = server.create_connection(endpoint, Role::Offerer).await.unwrap();
    let second = server.create_connection(endpoint, Role::Answerer).await.unwrap();
    assert_eq!(server.connections_for(endpoint), vec![first, second]);

    server.destroy(pipeline).await.unwrap();

    assert!(server.connections_for(endpoint).is_empty());
    assert!(matches!(server.connection_info(first), Err(MediaError::NotFound(_))));
    assert!(matches!(
        server.negotiate(second, audio(&[("PCMU", 8000)])).await,
        Err(MediaError::NotFound(_))
    ));
    assert!(matches!(
        server.create_connection(endpoint, Role::Offerer).await,
        Err(MediaError::NotFound(_))
    ));
}
