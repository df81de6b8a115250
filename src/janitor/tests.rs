//! Unit tests for the janitor module.

use super::*;
use crate::model::ServerStatus;
use crate::ownership::Fingerprint;
use crate::test_support::{ApiCall, ScriptedCompute, server_owned_by};
use rstest::{fixture, rstest};

const OURS: &str = "https://ci.example.com/";

const IMMEDIATE: JanitorConfig = JanitorConfig {
    settle_timeout: Duration::ZERO,
    settle_interval: Duration::from_millis(1),
};

#[fixture]
fn fingerprint() -> Fingerprint {
    Fingerprint::new(OURS).unwrap_or_else(|err| panic!("fingerprint: {err}"))
}

fn deleted(api: &ScriptedCompute) -> Vec<String> {
    api.calls()
        .into_iter()
        .filter_map(|call| match call {
            ApiCall::DeleteServer(id) => Some(id),
            _ => None,
        })
        .collect()
}

#[rstest]
#[tokio::test]
async fn sweep_destroys_only_our_occupied_servers(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new()
        .with_servers(vec![
            server_owned_by("srv-a", ServerStatus::Active, Some(OURS)),
            server_owned_by("srv-b", ServerStatus::Shutoff, Some(OURS)),
            server_owned_by("srv-c", ServerStatus::Active, Some("https://other.example.com/")),
            server_owned_by("srv-d", ServerStatus::Error, None),
        ])
        .with_bound_floating_ip("srv-a", "203.0.113.10");
    let session = Openstack::with_api(api.clone(), fingerprint);

    let summary = Janitor::new(&session, IMMEDIATE)
        .sweep()
        .await
        .unwrap_or_else(|err| panic!("sweep: {err}"));

    assert_eq!(summary, SweepSummary { destroyed_servers: 1 });
    assert_eq!(deleted(&api), ["srv-a"]);
    assert!(api.floating_ips().is_empty(), "floating IP should be released");
    let left: Vec<String> = api.servers().into_iter().map(|server| server.id).collect();
    assert_eq!(left, ["srv-b", "srv-c", "srv-d"]);
}

#[rstest]
#[tokio::test]
async fn empty_project_sweeps_nothing(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new();
    let session = Openstack::with_api(api.clone(), fingerprint);

    let summary = Janitor::new(&session, IMMEDIATE)
        .sweep()
        .await
        .unwrap_or_else(|err| panic!("sweep: {err}"));

    assert_eq!(summary.destroyed_servers, 0);
    assert!(deleted(&api).is_empty());
}

#[rstest]
#[tokio::test]
async fn refused_delete_stops_the_sweep(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new()
        .with_servers(vec![
            server_owned_by("srv-a", ServerStatus::Active, Some(OURS)),
            server_owned_by("srv-b", ServerStatus::Active, Some(OURS)),
        ])
        .refuse_delete(409, "Cannot delete locked server");
    let session = Openstack::with_api(api.clone(), fingerprint);

    let err = Janitor::new(&session, IMMEDIATE)
        .sweep()
        .await
        .err()
        .unwrap_or_else(|| panic!("sweep should fail"));

    assert!(
        matches!(&err, JanitorError::Destroy { server_id, source } if server_id == "srv-a" && source.is_action_failure()),
        "unexpected error: {err:?}"
    );
    assert_eq!(deleted(&api), ["srv-a"]);
}

#[rstest]
#[tokio::test]
async fn lingering_servers_are_not_clean(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new()
        .with_servers(vec![server_owned_by("srv-a", ServerStatus::Active, Some(OURS))])
        .ignore_deletes();
    let session = Openstack::with_api(api.clone(), fingerprint);

    let err = Janitor::new(&session, IMMEDIATE)
        .sweep()
        .await
        .err()
        .unwrap_or_else(|| panic!("sweep should fail"));

    assert_eq!(
        err,
        JanitorError::NotClean {
            message: String::from("servers remaining: 1 (srv-a)")
        }
    );
}

#[rstest]
#[tokio::test]
async fn listing_failure_is_reported(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new().fail_list_servers(OpenstackError::provider("timed out"));
    let session = Openstack::with_api(api, fingerprint);

    let result = Janitor::new(&session, IMMEDIATE).sweep().await;

    assert_eq!(
        result,
        Err(JanitorError::Provider(OpenstackError::provider("timed out")))
    );
}

#[rstest]
#[tokio::test]
async fn unbounded_settle_timeout_does_not_overflow(fingerprint: Fingerprint) {
    let api = ScriptedCompute::new()
        .with_servers(vec![server_owned_by("srv-a", ServerStatus::Active, Some(OURS))]);
    let session = Openstack::with_api(api.clone(), fingerprint);
    let config = JanitorConfig {
        settle_timeout: Duration::MAX,
        settle_interval: Duration::from_millis(1),
    };

    let summary = Janitor::new(&session, config)
        .sweep()
        .await
        .unwrap_or_else(|err| panic!("sweep: {err}"));

    assert_eq!(summary.destroyed_servers, 1);
    assert!(api.servers().is_empty());
}
