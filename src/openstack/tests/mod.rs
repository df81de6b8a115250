//! Tests for the OpenStack REST adapter against a loopback stub.


use std::time::Duration;

use serde_json::{Value, json};

use super::OpenstackApi;
use crate::backend::{ComputeApi, ServerRequest, TaggedServerRequest};
use crate::error::OpenstackError;
use crate::model::ServerStatus;
use crate::ownership::Fingerprint;
use crate::session::{Credential, Credentials};

use stub::{Reply, StubServer};

fn catalog_v2(base: &str) -> Value {
    json!({
        "access": {
            "token": {"id": "tok-v2"},
            "serviceCatalog": [
                {"type": "compute", "endpoints": [{"region": "RegionOne", "publicURL": format!("{base}/compute")}]},
                {"type": "network", "endpoints": [{"region": "RegionOne", "publicURL": format!("{base}/network")}]},
                {"type": "image", "endpoints": [{"region": "RegionOne", "publicURL": format!("{base}/image/")}]}
            ]
        }
    })
}

fn catalog_v3(base: &str) -> Value {
    let service = |kind: &str, path: &str| {
        json!({
            "type": kind,
            "endpoints": [
                {"interface": "internal", "region_id": "RegionOne", "url": "http://10.0.0.1:9999"},
                {"interface": "public", "region_id": "RegionTwo", "url": "http://10.0.0.2:9999"},
                {"interface": "public", "region_id": "RegionOne", "url": format!("{base}{path}")}
            ]
        })
    };
    json!({
        "token": {
            "catalog": [
                service("compute", "/compute"),
                service("network", "/network"),
                service("image", "/image")
            ]
        }
    })
}

async fn connect(stub: &StubServer) -> OpenstackApi {
    stub.route(
        "POST",
        "/identity/v2.0/tokens",
        vec![Reply::json(200, &catalog_v2(stub.base()))],
    );
    let credentials = Credentials::new(
        stub.url("/identity/v2.0"),
        "alice:ci",
        Credential::new("hunter2"),
        None,
    );
    OpenstackApi::authenticate(&credentials)
        .await
        .unwrap_or_else(|err| panic!("authenticate: {err}"))
        .with_poll_interval(Duration::from_millis(1))
}

fn tagged_request() -> TaggedServerRequest {
    let request = ServerRequest::builder()
        .name("agent-1")
        .image_id("img-1")
        .flavor_id("flv-1")
        .build()
        .unwrap_or_else(|err| panic!("request: {err}"));
    Fingerprint::new("https://ci.example.com/")
        .unwrap_or_else(|err| panic!("fingerprint: {err}"))
        .tag(request)
}

fn server_body(status: &str) -> Value {
    json!({"server": {"id": "srv-1", "name": "agent-1", "status": status}})
}

#[tokio::test]
async fn v2_login_scopes_tenant_and_sends_token() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "GET",
        "/compute/flavors/detail",
        vec![Reply::json(
            200,
            &json!({"flavors": [{"id": "1", "name": "m1.small", "vcpus": 1, "ram": 2048, "disk": 20}]}),
        )],
    );

    let flavors = api
        .list_flavors()
        .await
        .unwrap_or_else(|err| panic!("flavors: {err}"));
    assert_eq!(flavors.len(), 1);
    assert_eq!(flavors.first().map(|flavor| flavor.ram_mb), Some(2048));

    let login: Value = serde_json::from_str(&stub.find("POST", "/identity/v2.0/tokens").body)
        .unwrap_or_else(|err| panic!("login body: {err}"));
    assert_eq!(login.pointer("/auth/tenantName"), Some(&json!("ci")));
    assert_eq!(
        login.pointer("/auth/passwordCredentials/username"),
        Some(&json!("alice"))
    );
    let listing = stub.find("GET", "/compute/flavors/detail");
    assert_eq!(
        listing.headers.get("x-auth-token").map(String::as_str),
        Some("tok-v2")
    );
}

#[tokio::test]
async fn v3_login_reads_subject_token_and_region() {
    let stub = StubServer::start().await;
    stub.route(
        "POST",
        "/identity/v3/auth/tokens",
        vec![Reply::json(201, &catalog_v3(stub.base())).with_header("X-Subject-Token", "tok-v3")],
    );
    stub.route(
        "GET",
        "/compute/servers/detail",
        vec![Reply::json(200, &json!({"servers": []}))],
    );
    let credentials = Credentials::new(
        stub.url("/identity/v3"),
        "alice:ci",
        Credential::new("hunter2"),
        Some(String::from("RegionOne")),
    );

    let api = OpenstackApi::authenticate(&credentials)
        .await
        .unwrap_or_else(|err| panic!("authenticate: {err}"));
    assert_eq!(api.endpoints().compute, stub.url("/compute"));

    let servers = api
        .list_servers()
        .await
        .unwrap_or_else(|err| panic!("servers: {err}"));
    assert!(servers.is_empty());
    let listing = stub.find("GET", "/compute/servers/detail");
    assert_eq!(
        listing.headers.get("x-auth-token").map(String::as_str),
        Some("tok-v3")
    );
}

#[tokio::test]
async fn rejected_credentials_fail_authentication() {
    let stub = StubServer::start().await;
    stub.route(
        "POST",
        "/identity/v2.0/tokens",
        vec![Reply::text(401, r#"{"error": {"message": "The request you have made requires authentication."}}"#)],
    );
    let credentials = Credentials::new(
        stub.url("/identity/v2.0"),
        "alice:ci",
        Credential::new("wrong"),
        None,
    );

    let result = OpenstackApi::authenticate(&credentials).await;
    assert!(
        matches!(result, Err(OpenstackError::Authentication { .. })),
        "unexpected authenticate outcome: {result:?}"
    );
}

#[tokio::test]
async fn boot_polls_until_active() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "POST",
        "/compute/servers",
        vec![Reply::json(202, &json!({"server": {"id": "srv-1", "adminPass": "x"}}))],
    );
    stub.route(
        "GET",
        "/compute/servers/srv-1",
        vec![
            Reply::json(200, &server_body("BUILD")),
            Reply::json(200, &server_body("ACTIVE")),
        ],
    );

    let server = api
        .boot_and_wait_active(&tagged_request(), Duration::from_secs(5))
        .await
        .unwrap_or_else(|err| panic!("boot: {err}"));
    assert_eq!(server.status, ServerStatus::Active);
    assert_eq!(stub.count("GET", "/compute/servers/srv-1"), 2);

    let submitted: Value = serde_json::from_str(&stub.find("POST", "/compute/servers").body)
        .unwrap_or_else(|err| panic!("create body: {err}"));
    assert_eq!(
        submitted.pointer("/server/metadata/jenkins-instance"),
        Some(&json!("https://ci.example.com/"))
    );
}

#[tokio::test]
async fn unbounded_timeout_still_waits_for_active() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "POST",
        "/compute/servers",
        vec![Reply::json(202, &json!({"server": {"id": "srv-1"}}))],
    );
    stub.route(
        "GET",
        "/compute/servers/srv-1",
        vec![
            Reply::json(200, &server_body("BUILD")),
            Reply::json(200, &server_body("ACTIVE")),
        ],
    );

    let server = api
        .boot_and_wait_active(&tagged_request(), Duration::MAX)
        .await
        .unwrap_or_else(|err| panic!("boot: {err}"));
    assert_eq!(server.status, ServerStatus::Active);
    assert_eq!(stub.count("GET", "/compute/servers/srv-1"), 2);
}

#[tokio::test]
async fn zero_timeout_checks_once() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "POST",
        "/compute/servers",
        vec![Reply::json(202, &json!({"server": {"id": "srv-1"}}))],
    );
    stub.route(
        "GET",
        "/compute/servers/srv-1",
        vec![Reply::json(200, &server_body("BUILD"))],
    );

    let server = api
        .boot_and_wait_active(&tagged_request(), Duration::ZERO)
        .await
        .unwrap_or_else(|err| panic!("boot: {err}"));
    assert_eq!(server.status, ServerStatus::Build);
    assert_eq!(stub.count("GET", "/compute/servers/srv-1"), 1);
}

#[tokio::test]
async fn unknown_server_is_none() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;

    let server = api
        .get_server("missing")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(server, None);
}

#[tokio::test]
async fn refused_delete_is_reported_in_band() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "DELETE",
        "/compute/servers/srv-1",
        vec![Reply::text(409, "Cannot delete locked server")],
    );

    let response = api
        .delete_server("srv-1")
        .await
        .unwrap_or_else(|err| panic!("delete: {err}"));
    assert!(!response.is_success());
    assert_eq!(response.code, 409);
    assert_eq!(response.fault.as_deref(), Some("Cannot delete locked server"));
}

#[tokio::test]
async fn images_follow_next_links() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "GET",
        "/image/v2/images",
        vec![Reply::json(
            200,
            &json!({"images": [{"id": "a", "name": "ubuntu"}], "next": "/v2/images?marker=a"}),
        )],
    );
    stub.route(
        "GET",
        "/image/v2/images?marker=a",
        vec![Reply::json(
            200,
            &json!({"images": [{"id": "b", "name": null, "status": "queued"}]}),
        )],
    );

    let images = api
        .list_images()
        .await
        .unwrap_or_else(|err| panic!("images: {err}"));
    let ids: Vec<&str> = images.iter().map(|image| image.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(images.get(1).map(|image| image.name.as_str()), Some(""));
}

#[tokio::test]
async fn refused_attach_is_an_action_failure() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "POST",
        "/compute/servers/srv-1/action",
        vec![Reply::text(400, "No nw_info cache associated with instance")],
    );

    let result = api.add_floating_ip("srv-1", "203.0.113.9").await;
    let err = result
        .err()
        .unwrap_or_else(|| panic!("attach unexpectedly succeeded"));
    assert!(err.is_action_failure(), "unexpected error: {err:?}");
    assert!(err.to_string().contains("attach floating IP"));

    let action: Value = serde_json::from_str(&stub.find("POST", "/compute/servers/srv-1/action").body)
        .unwrap_or_else(|err| panic!("action body: {err}"));
    assert_eq!(action, json!({"addFloatingIp": {"address": "203.0.113.9"}}));
}

#[tokio::test]
async fn floating_ips_list_and_allocate() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "GET",
        "/compute/os-floating-ips",
        vec![Reply::json(
            200,
            &json!({"floating_ips": [
                {"id": 7, "ip": "203.0.113.7", "fixed_ip": "10.0.0.5", "instance_id": "srv-1", "pool": "public"}
            ]}),
        )],
    );
    stub.route(
        "POST",
        "/compute/os-floating-ips",
        vec![Reply::json(
            200,
            &json!({"floating_ip": {"id": "fip-9", "ip": "203.0.113.9", "fixed_ip": null, "instance_id": null, "pool": "public"}}),
        )],
    );

    let listed = api
        .list_floating_ips()
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));
    assert_eq!(listed.first().map(|ip| ip.id.as_str()), Some("7"));
    assert_eq!(
        listed.first().and_then(|ip| ip.instance_id.as_deref()),
        Some("srv-1")
    );

    let allocated = api
        .allocate_floating_ip(None)
        .await
        .unwrap_or_else(|err| panic!("allocate: {err}"));
    assert_eq!(allocated.floating_ip_address, "203.0.113.9");
    assert_eq!(stub.find("POST", "/compute/os-floating-ips").body, "{}");
}

#[tokio::test]
async fn image_paging_stops_on_self_link() {
    let stub = StubServer::start().await;
    let api = connect(&stub).await;
    stub.route(
        "GET",
        "/image/v2/images",
        vec![Reply::json(
            200,
            &json!({"images": [{"id": "a", "name": "ubuntu"}], "next": "/v2/images"}),
        )],
    );

    let images = api
        .list_images()
        .await
        .unwrap_or_else(|err| panic!("images: {err}"));
    assert_eq!(images.len(), 1);
    assert_eq!(stub.count("GET", "/image/v2/images"), 1);
}
