//! End-to-end flows through GateService with a scripted oracle

use codegate_core::test_utils::{memory_gate, policy_with_groups, MockOracle};
use codegate_core::{
    AccessPolicy, ArtifactRef, EventEffect, FetchOutcome, GroupId, IntakeSession, MemberStatus,
    MembershipEvent, MirrorCleanup, RegisterOutcome, UserId,
};
use std::sync::Arc;

const ADMIN: UserId = UserId(1);
const VIEWER: UserId = UserId(2000);
const STORAGE: GroupId = GroupId(-1009);
const CHANNEL: GroupId = GroupId(-1001);

#[tokio::test]
async fn test_admin_intake_then_viewer_fetch() {
    let oracle = Arc::new(
        MockOracle::new()
            .with_reachable(CHANNEL)
            .with_status(CHANNEL, VIEWER, MemberStatus::Member),
    );
    let policy = AccessPolicy {
        admin_ids: [ADMIN].into_iter().collect(),
        storage_group: Some(STORAGE),
        ..AccessPolicy::default()
    };
    let gate = memory_gate(oracle.clone(), policy);
    assert!(gate.is_admin(ADMIN));

    gate.add_group(CHANNEL, "movies").await.unwrap();

    let mut intake = IntakeSession::new();
    intake.submit_artifact(ArtifactRef::new("BAADxyz")).unwrap();
    intake.submit_title("Night Train").unwrap();
    intake.submit_description("A long ride").unwrap();
    let content = intake.finish("NT01").unwrap();

    let outcome = gate.register_content(content).await.unwrap();
    assert!(matches!(outcome, RegisterOutcome::Registered { mirror: Some(_), .. }));

    match gate.fetch(VIEWER, "NT01").await.unwrap() {
        FetchOutcome::Granted(record) => {
            assert_eq!(record.title.as_deref(), Some("Night Train"));
            assert!(record.backing_locator.is_some());
        }
        other => panic!("expected Granted, got {other:?}"),
    }

    let report = gate.remove_content("NT01").await.unwrap();
    assert_eq!(report.mirror, MirrorCleanup::Deleted);
    assert_eq!(gate.fetch(VIEWER, "NT01").await.unwrap(), FetchOutcome::UnknownCode);
}

#[tokio::test]
async fn test_pending_request_lifecycle_gates_access() {
    let oracle = Arc::new(MockOracle::new().with_status(CHANNEL, VIEWER, MemberStatus::Left));
    let gate = memory_gate(oracle.clone(), policy_with_groups(&[CHANNEL.0]));

    assert!(!gate.is_eligible(VIEWER).await.unwrap());

    let effect = gate
        .apply_event(MembershipEvent::JoinRequested { user: VIEWER, group: CHANNEL })
        .unwrap();
    assert_eq!(effect, EventEffect::Recorded);
    assert!(gate.is_eligible(VIEWER).await.unwrap());

    // Approved: the oracle now answers and the pending row is gone
    oracle.set_status(CHANNEL, VIEWER, MemberStatus::Member);
    gate.apply_event(MembershipEvent::StatusChanged {
        user: VIEWER,
        group: CHANNEL,
        status: MemberStatus::Member,
    })
    .unwrap();
    assert!(gate.is_eligible(VIEWER).await.unwrap());

    // Left again: no grace period remains
    oracle.set_status(CHANNEL, VIEWER, MemberStatus::Left);
    assert!(!gate.is_eligible(VIEWER).await.unwrap());
}

#[tokio::test]
async fn test_membership_events_deserialize_from_json() {
    let gate = memory_gate(Arc::new(MockOracle::new()), policy_with_groups(&[CHANNEL.0]));

    let line = r#"{"JoinRequested":{"user":2000,"group":-1001}}"#;
    let event: MembershipEvent = serde_json::from_str(line).unwrap();
    assert_eq!(event, MembershipEvent::JoinRequested { user: VIEWER, group: CHANNEL });

    gate.apply_event(event).unwrap();
    assert!(gate.is_eligible(VIEWER).await.unwrap());
}

#[tokio::test]
async fn test_removed_directory_group_stops_gating() {
    let oracle = Arc::new(MockOracle::new().with_reachable(CHANNEL));
    let gate = memory_gate(oracle, AccessPolicy::default());

    gate.add_group(CHANNEL, "movies").await.unwrap();
    assert!(!gate.is_eligible(VIEWER).await.unwrap());

    assert!(gate.rename_group("movies", "films").unwrap());
    assert!(gate.remove_group("films").unwrap());
    assert!(gate.is_eligible(VIEWER).await.unwrap());
}
