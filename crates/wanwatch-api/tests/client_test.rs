#![allow(clippy::unwrap_used)]
// Integration tests for `GatewayClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wanwatch_api::{ControllerPlatform, Error, GatewayClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, GatewayClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = GatewayClient::with_client(
        reqwest::Client::new(),
        base_url,
        "default".into(),
        ControllerPlatform::Standalone,
    );
    (server, client)
}

fn site_path(suffix: &str) -> String {
    format!("/api/s/default/{suffix}")
}

// ── Device tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_parses_gateway_sections() {
    let (server, client) = setup().await;

    let envelope = json!({
        "meta": { "rc": "ok" },
        "data": [{
            "mac": "aa:bb:cc:dd:ee:ff",
            "type": "udm",
            "model": "UDM-Pro",
            "version": "4.0.21",
            "adopted": true,
            "uplink": {
                "ip": "203.0.113.10",
                "name": "eth8",
                "up": true,
                "rx_bytes-r": 125000.0,
                "tx_bytes-r": 31000.0,
                "xput_down": 940.2,
                "speedtest_lastrun": 1716800000
            },
            "last_wan_interfaces": { "WAN": {}, "WAN2": {} },
            "wan1": { "ip": "203.0.113.10", "ifname": "eth8", "up": true },
            "wan2": { "ip": "198.51.100.7", "ifname": "eth9", "up": false }
        }]
    });

    Mock::given(method("GET"))
        .and(path(site_path("stat/device")))
        .respond_with(ResponseTemplate::new(200).set_body_json(&envelope))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();

    assert_eq!(devices.len(), 1);
    let gw = &devices[0];
    assert_eq!(gw.mac, "aa:bb:cc:dd:ee:ff");
    assert_eq!(gw.device_type, "udm");
    assert!(gw.adopted);

    let uplink = gw.uplink.as_ref().unwrap();
    assert_eq!(uplink.ip.as_deref(), Some("203.0.113.10"));
    assert_eq!(uplink.rx_rate, Some(125_000.0));
    assert_eq!(uplink.speedtest_lastrun, Some(1_716_800_000));

    // wan sections land in the flattened catch-all.
    let wan1 = gw.wan_section("wan1").unwrap();
    assert_eq!(wan1.ifname.as_deref(), Some("eth8"));
    assert!(wan1.up);
    let wan2 = gw.wan_section("wan2").unwrap();
    assert!(!wan2.up);
    assert!(gw.wan_section("wan3").is_none());
}

#[tokio::test]
async fn test_get_device_posts_mac_filter() {
    let (server, client) = setup().await;

    let envelope = json!({
        "meta": { "rc": "ok" },
        "data": [{ "mac": "aa:bb:cc:dd:ee:ff", "type": "ugw" }]
    });

    Mock::given(method("POST"))
        .and(path(site_path("stat/device")))
        .and(body_partial_json(json!({ "macs": ["aa:bb:cc:dd:ee:ff"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&envelope))
        .expect(1)
        .mount(&server)
        .await;

    let device = client.get_device("AA:BB:CC:DD:EE:FF").await.unwrap();
    assert_eq!(device.unwrap().device_type, "ugw");
}

#[tokio::test]
async fn test_base_url_path_prefix_is_preserved() {
    // A controller behind a reverse proxy, reachable under a subpath
    // without a trailing slash.
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/controller", server.uri())).unwrap();
    let client = GatewayClient::with_client(
        reqwest::Client::new(),
        base_url,
        "default".into(),
        ControllerPlatform::Standalone,
    );

    Mock::given(method("GET"))
        .and(path("/controller/api/s/default/stat/device"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "meta": { "rc": "ok" }, "data": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn test_get_device_no_match() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(site_path("stat/device")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "meta": { "rc": "ok" }, "data": [] })),
        )
        .mount(&server)
        .await;

    let device = client.get_device("aa:bb:cc:dd:ee:00").await.unwrap();
    assert!(device.is_none());
}

// ── Speed test command ──────────────────────────────────────────────

#[tokio::test]
async fn test_run_speedtest_sends_devmgr_command() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(site_path("cmd/devmgr")))
        .and(body_partial_json(
            json!({ "cmd": "speedtest", "mac": "aa:bb:cc:dd:ee:ff" }),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "meta": { "rc": "ok" }, "data": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    client.run_speedtest("aa:bb:cc:dd:ee:ff").await.unwrap();
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_envelope_error_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(site_path("stat/device")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "rc": "error", "msg": "api.err.NoSiteContext" },
            "data": []
        })))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    match result {
        Err(Error::Api { message, status }) => {
            assert_eq!(message, "api.err.NoSiteContext");
            assert_eq!(status, None);
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(site_path("stat/device")))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    match result {
        Err(err @ Error::Api {
            status: Some(502), ..
        }) => assert!(err.is_transient()),
        other => panic!("expected Api error with status 502, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_maps_to_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(site_path("stat/device")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}
