mod common;

use common::{host_candidate, CaptureMode, Failures, Harness, MockFactory, OFFER_SDP};
use ssc_share::error::SignalError;
use ssc_share::peer::IceCandidate;
use ssc_share::session::SessionId;

#[tokio::test]
async fn poll_returns_discovered_candidates_without_consuming() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Fail);
    let negotiated = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap();
    let id = negotiated.session_id;

    assert!(h.share.poll_server_candidates(&id).unwrap().is_empty());

    let transport = h.factory.last();
    transport.emit_candidate(Some(host_candidate(50000)));
    transport.emit_candidate(Some(host_candidate(50001)));

    let first = h.share.poll_server_candidates(&id).unwrap();
    let second = h.share.poll_server_candidates(&id).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first[0].candidate, host_candidate(50000).candidate);
}

#[tokio::test]
async fn end_of_gathering_is_not_a_candidate() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Fail);
    let id = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap()
        .session_id;

    let transport = h.factory.last();
    transport.emit_candidate(Some(host_candidate(50000)));
    transport.emit_candidate(None);

    assert_eq!(h.share.poll_server_candidates(&id).unwrap().len(), 1);
    let session = h.share.registry().get(&id).unwrap();
    assert!(session.gathering_complete());
}

#[tokio::test]
async fn concurrent_sessions_keep_separate_candidate_lists() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Audio);
    let (a, b) = tokio::join!(
        h.share.offer(OFFER_SDP.to_string(), "offer".to_string()),
        h.share.offer(OFFER_SDP.to_string(), "offer".to_string()),
    );
    let (a, b) = (a.unwrap().session_id, b.unwrap().session_id);

    // транспорт каждой сессии знает только свои кандидаты
    for transport in h.factory.sessions() {
        transport.emit_candidate(Some(host_candidate(40000)));
    }
    let transports = h.factory.sessions();
    transports[0].emit_candidate(Some(host_candidate(40001)));

    let counts = (
        h.share.poll_server_candidates(&a).unwrap().len(),
        h.share.poll_server_candidates(&b).unwrap().len(),
    );
    assert!(counts == (2, 1) || counts == (1, 2), "got {counts:?}");
}

#[tokio::test]
async fn client_candidate_is_forwarded_to_transport() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Fail);
    let id = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap()
        .session_id;

    let candidate = IceCandidate {
        username_fragment: Some("abcd".into()),
        ..host_candidate(60000)
    };
    h.share
        .submit_client_candidate(&id, candidate.clone())
        .await
        .unwrap();

    assert_eq!(h.factory.last().remote_candidates(), vec![candidate]);
}

#[tokio::test]
async fn unknown_session_is_not_found_without_side_effects() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Fail);
    let id = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap()
        .session_id;
    let before = h.factory.last().calls();

    let unknown = SessionId::from("does-not-exist");
    let err = h
        .share
        .submit_client_candidate(&unknown, host_candidate(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::SessionNotFound(_)));

    let err = h.share.poll_server_candidates(&unknown).unwrap_err();
    assert!(matches!(err, SignalError::SessionNotFound(_)));

    assert_eq!(h.factory.last().calls(), before);
    assert_eq!(h.share.registry().len(), 1);
    assert!(h.share.registry().contains(&id));
}

#[tokio::test]
async fn rejected_candidate_keeps_session() {
    let factory = MockFactory::failing(Failures {
        add_candidate: true,
        ..Default::default()
    });
    let h = Harness::with_factory(factory, CaptureMode::Video, CaptureMode::Fail);
    let id = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap()
        .session_id;

    let err = h
        .share
        .submit_client_candidate(&id, IceCandidate::new("garbage"))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::CandidateRejected(_)));
    assert!(h.share.registry().contains(&id));
}

#[tokio::test]
async fn late_candidates_after_hangup_are_dropped() {
    let h = Harness::new(CaptureMode::Video, CaptureMode::Fail);
    let id = h
        .share
        .offer(OFFER_SDP.to_string(), "offer".to_string())
        .await
        .unwrap()
        .session_id;
    let transport = h.factory.last();
    transport.emit_candidate(Some(host_candidate(50000)));

    h.share.hangup(&id).await.unwrap();
    // движок может выдать кандидата уже после разбора
    transport.emit_candidate(Some(host_candidate(50001)));

    assert!(matches!(
        h.share.poll_server_candidates(&id),
        Err(SignalError::SessionNotFound(_))
    ));
    let err = h
        .share
        .submit_client_candidate(&id, host_candidate(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::SessionNotFound(_)));
}
