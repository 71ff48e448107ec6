mod common;

use common::{client, closed_port, get_json, start_echo_upstream, start_server, test_config};
use microserve::http::ServerError;
use microserve::proxy::ProxyError;
use microserve::WebServer;

#[tokio::test]
async fn test_forwarded_request_is_rewritten() {
    let upstream = start_echo_upstream().await;

    let mut server = WebServer::new(&test_config()).unwrap();
    server
        .register_remote_route("/svc/", &format!("http://{upstream}/api/?key=1"))
        .unwrap();
    let (addr, _shutdown) = start_server(server).await;

    let (status, echo) = get_json(&format!("http://{addr}/svc/items?page=2")).await;
    assert_eq!(status, 200);
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/api/svc/items");
    assert_eq!(echo["query"], "key=1&page=2");

    let headers = &echo["headers"];
    assert_eq!(headers["x-forwarded-host"][0], format!("{addr}"));
    assert_eq!(headers["x-origin-host"][0], format!("{upstream}"));
    assert_eq!(headers["x-forwarded-for"][0], "127.0.0.1");
    assert!(headers["x-request-id"][0].is_string());
}

#[tokio::test]
async fn test_existing_forwarding_headers_are_appended() {
    let upstream = start_echo_upstream().await;

    let mut server = WebServer::new(&test_config()).unwrap();
    server
        .register_remote_route("/svc/", &format!("http://{upstream}"))
        .unwrap();
    let (addr, _shutdown) = start_server(server).await;

    let echo: serde_json::Value = client()
        .get(format!("http://{addr}/svc/x"))
        .header("x-forwarded-for", "203.0.113.9")
        .header("x-forwarded-host", "edge.example.com")
        .header("proxy-authorization", "Basic abc")
        .header("user-agent", "integration/1.0")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let headers = &echo["headers"];
    assert_eq!(headers["x-forwarded-for"][0], "203.0.113.9, 127.0.0.1");
    assert_eq!(headers["x-forwarded-host"][0], "edge.example.com");
    assert_eq!(headers["x-forwarded-host"][1], format!("{addr}"));
    assert_eq!(headers["user-agent"][0], "integration/1.0");
    assert!(headers.get("proxy-authorization").is_none());
    assert_eq!(echo["path"], "/svc/x");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let mut server = WebServer::new(&test_config()).unwrap();
    server
        .register_remote_route("/svc/", &format!("http://127.0.0.1:{}/", closed_port()))
        .unwrap();
    let (addr, _shutdown) = start_server(server).await;

    let res = client().get(format!("http://{addr}/svc/x")).send().await.unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn test_malformed_targets_fail_registration() {
    let mut server = WebServer::new(&test_config()).unwrap();
    for target in ["", "::not a url::", "https://secure.example.com/", "http://"] {
        let err = server.register_remote_route("/svc/", target).unwrap_err();
        assert!(
            matches!(err, ServerError::Proxy(ProxyError::InvalidTarget { .. })),
            "{target}: {err}"
        );
    }
    assert!(!server.patterns().contains(&"/svc/"));
}
