//! Offer/answer negotiation behaviour

use proptest::prelude::*;
use rmedia_sdp_core::prelude::*;

fn audio(payloads: &[(&str, u32, u32)]) -> MediaDescriptor {
    MediaDescriptor::audio(
        payloads
            .iter()
            .map(|(name, rate, rank)| PayloadDescriptor::new(*name, *rate).with_rank(*rank))
            .collect(),
    )
}

#[test]
fn test_preferred_common_codec_wins() {
    let offer = CapabilityDescription::new(vec![audio(&[("opus", 48000, 0), ("pcmu", 8000, 1)])]);
    let answer = CapabilityDescription::new(vec![audio(&[("pcmu", 8000, 0)])]);

    let result = negotiate(&offer, &answer);

    assert_eq!(result.media.len(), 1);
    let line = &result.media[0];
    assert!(!line.rejected);
    assert_eq!(line.direction, Direction::SendRecv);
    assert_eq!(line.payloads.len(), 1);
    assert_eq!(line.payloads[0].encoding_name, "pcmu");
    assert_eq!(line.payloads[0].clock_rate, 8000);
}

#[test]
fn test_missing_answer_line_is_rejected() {
    let offer = CapabilityDescription::new(vec![
        audio(&[("opus", 48000, 0)]),
        MediaDescriptor::video(vec![PayloadDescriptor::new("VP8", 90000)]),
    ]);
    let answer = CapabilityDescription::new(vec![audio(&[("OPUS", 48000, 0)])]);

    let result = negotiate(&offer, &answer);

    assert_eq!(result.media.len(), 2);
    assert!(!result.media[0].rejected);
    assert!(result.media[1].rejected);
    assert!(result.media[1].payloads.is_empty());
    assert_eq!(result.media[1].kind, MediaKind::Video);
    assert!(!result.is_empty());
}

#[test]
fn test_answerer_sendonly_means_offerer_receives() {
    let offer = CapabilityDescription::new(vec![audio(&[("PCMU", 8000, 0)])]);
    let answer = CapabilityDescription::new(vec![
        audio(&[("PCMU", 8000, 0)]).with_direction(Direction::SendOnly),
    ]);

    let result = negotiate(&offer, &answer);
    assert_eq!(result.media[0].direction, Direction::RecvOnly);
}

#[test]
fn test_no_common_payload_is_empty_not_error() {
    let offer = CapabilityDescription::new(vec![audio(&[("opus", 48000, 0)])]);
    let answer = CapabilityDescription::new(vec![audio(&[("opus", 16000, 0), ("PCMA", 8000, 1)])]);

    let result = negotiate(&offer, &answer);
    assert!(result.is_empty());
    assert_eq!(result.media.len(), 1);
    assert_eq!(result.media[0].direction, Direction::Inactive);
}

#[test]
fn test_sdp_offer_answer_exchange() {
    let offer_sdp = "v=0\r\n\
o=- 1 1 IN IP4 198.51.100.7\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 5004 RTP/AVP 111 0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 5006 RTP/AVP 96 97\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:97 H264/90000\r\n\
a=sendonly\r\n";

    let local = CapabilityDescription::new(vec![
        audio(&[("PCMU", 8000, 0), ("opus", 48000, 1)]),
        MediaDescriptor::video(vec![PayloadDescriptor::new("h264", 90000)]),
    ]);

    let offer = parse_sdp(offer_sdp).unwrap();
    let session = NegotiatedSession::new(offer, local);

    let audio_line = &session.result.media[0];
    let names: Vec<_> = audio_line.payloads.iter().map(|p| p.encoding_name.as_str()).collect();
    assert_eq!(names, vec!["opus", "PCMU"]);
    assert_eq!(audio_line.payloads[0].payload_type, Some(111));

    let video_line = &session.result.media[1];
    assert_eq!(video_line.direction, Direction::SendOnly);
    assert_eq!(video_line.payloads[0].encoding_name, "H264");

    let answer_sdp = render_sdp(&session.result.answerer_view());
    assert!(answer_sdp.contains("m=audio 9 RTP/AVP 111 0\r\n"));
    assert!(answer_sdp.contains("m=video 9 RTP/AVP 97\r\n"));
    assert!(answer_sdp.contains("a=recvonly\r\n"));
}

#[test]
fn test_browser_offer_with_data_channel() {
    let offer_sdp = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=sctp-port:5000\r\n";

    let local = CapabilityDescription::new(vec![audio(&[("opus", 48000, 0)])]);
    let session = NegotiatedSession::new(parse_sdp(offer_sdp).unwrap(), local);

    assert_eq!(session.result.media.len(), 2);
    assert!(!session.result.media[0].rejected);
    assert_eq!(session.result.media[1].kind, MediaKind::Application);
    assert!(session.result.media[1].rejected);

    let answer_sdp = render_sdp(&session.result.answerer_view());
    assert!(answer_sdp.contains("m=audio 9 RTP/AVP 111\r\n"), "{}", answer_sdp);
    assert!(answer_sdp.contains("m=application 0 RTP/AVP 0\r\n"), "{}", answer_sdp);
}

fn payload_strategy() -> impl Strategy<Value = PayloadDescriptor> {
    (
        prop::sample::select(vec!["opus", "OPUS", "PCMU", "pcma", "G722", "VP8"]),
        prop::sample::select(vec![8000u32, 48000, 90000]),
        0u32..4,
    )
        .prop_map(|(name, rate, rank)| PayloadDescriptor::new(name, rate).with_rank(rank))
}

fn line_strategy() -> impl Strategy<Value = MediaDescriptor> {
    (
        prop::sample::select(vec![MediaKind::Audio, MediaKind::Video]),
        prop::sample::select(vec![
            Direction::SendRecv,
            Direction::SendOnly,
            Direction::RecvOnly,
            Direction::Inactive,
        ]),
        prop::collection::vec(payload_strategy(), 0..6),
    )
        .prop_map(|(kind, direction, payloads)| MediaDescriptor::new(kind, direction, payloads))
}

fn description_strategy() -> impl Strategy<Value = CapabilityDescription> {
    prop::collection::vec(line_strategy(), 0..4).prop_map(CapabilityDescription::new)
}

proptest! {
    #[test]
    fn prop_negotiation_is_order_stable(offer in description_strategy(), answer in description_strategy()) {
        let first = negotiate(&offer, &answer);
        let second = negotiate(&offer, &answer);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.media.len(), offer.media.len());
    }

    #[test]
    fn prop_result_payloads_come_from_both_sides(offer in description_strategy(), answer in description_strategy()) {
        let result = negotiate(&offer, &answer);
        for (i, line) in result.media.iter().enumerate() {
            prop_assert_eq!(line.rejected, line.payloads.is_empty());
            if line.rejected {
                prop_assert_eq!(line.direction, Direction::Inactive);
                continue;
            }
            prop_assert!(line.direction != Direction::Inactive);
            for payload in &line.payloads {
                prop_assert!(offer.media[i].payloads.contains(payload));
                prop_assert!(answer.media[i].payloads.iter().any(|a| a.matches(payload)));
            }
            let ranks: Vec<u32> = line.payloads.iter().map(|p| p.rank).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            prop_assert_eq!(ranks, sorted);
        }
    }
}
