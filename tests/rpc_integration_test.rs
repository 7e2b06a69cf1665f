//! RPC transfers through a live HTTP server

use edi::adapters::connection::RpcFile;
use edi::adapters::store::MemoryStore;
use edi::config::parse_config;
use edi::core::{Edi, RpcRequest, RpcResponse};
use edi::domain::DocumentState;
use edi::server;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

const CONFIG: &str = r#"
[options.edi]
rpc = true

[server]
default_gateway = "portal"

[entities.partner]
key = "name"

[document_types.partner_export]
model = "export"

[document_types.partner_export.export]
kind = "partner"

[gateways.portal]
connection = "rpc"
safety = "edi.rpc"

[[gateways.portal.paths]]
name = "files"
path = "files"
glob = "*.txt"

[gateways.exports]
connection = "rpc"
safety = "edi.rpc"

[[gateways.exports.paths]]
name = "requests"
path = "requests"
doc_types = ["partner_export"]

[gateways.inbox]
connection = "local"
safety = "edi.rpc"
"#;

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let edi = Edi::new(parse_config(CONFIG).unwrap(), Arc::new(MemoryStore::new())).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(server::serve(edi, listener, rx));
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown,
            handle,
        }
    }

    async fn post(&self, path: &str, request: &RpcRequest) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base, path))
            .json(request)
            .send()
            .await
            .unwrap()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn request(path: &str, files: &[(&str, &[u8])], allow_process: Option<bool>) -> RpcRequest {
    RpcRequest {
        paths: HashMap::from([(
            path.to_string(),
            files
                .iter()
                .map(|(name, data)| RpcFile::new(*name, data))
                .collect(),
        )]),
        allow_process,
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    server.stop().await;
}

#[tokio::test]
async fn test_default_gateway_receives_files() {
    let server = TestServer::start().await;
    let request = request(
        "files",
        &[("hello_world.txt", b"Hello".as_slice()), ("skipped.csv", b"a,b".as_slice())],
        Some(false),
    );

    let response = server.post("/transfer", &request).await;
    assert_eq!(response.status(), 200);
    let body: RpcResponse = response.json().await.unwrap();
    assert!(body.errors.is_empty());
    assert_eq!(body.docs.len(), 1);
    assert_eq!(body.docs[0].name, "UNKNOWN/00001");
    assert_eq!(body.docs[0].state, DocumentState::Draft);
    // Files the path did not match come back untouched
    let returned: Vec<&str> = body.paths["files"].iter().map(|f| f.name.as_str()).collect();
    assert_eq!(returned, vec!["skipped.csv"]);

    // Already received
    let again: RpcResponse = server.post("/transfer", &request).await.json().await.unwrap();
    assert!(again.docs.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_processing_failures_are_reported() {
    let server = TestServer::start().await;
    let request = request("files", &[("mystery.txt", b"???".as_slice())], None);

    let body: RpcResponse = server.post("/transfer", &request).await.json().await.unwrap();
    assert_eq!(body.docs.len(), 1);
    assert_eq!(body.errors.len(), 1);
    assert!(body.errors[0].name.contains("Unknown document type"));
    server.stop().await;
}

#[tokio::test]
async fn test_named_gateway_returns_outputs() {
    let server = TestServer::start().await;
    let request = request("requests", &[("export-request.txt", b"partners please".as_slice())], None);

    let response = server.post("/gateways/exports/transfer", &request).await;
    assert_eq!(response.status(), 200);
    let body: RpcResponse = response.json().await.unwrap();
    assert!(body.errors.is_empty(), "{:?}", body.errors);
    assert_eq!(body.docs[0].state, DocumentState::Done);
    let outputs = &body.paths["requests"];
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].name, "partner.csv");
    assert_eq!(outputs[0].decode().unwrap(), b"name\n");
    server.stop().await;
}

#[tokio::test]
async fn test_gateway_errors() {
    let server = TestServer::start().await;
    let empty = RpcRequest::default();

    let missing = server.post("/gateways/ghost/transfer", &empty).await;
    assert_eq!(missing.status(), 404);

    let local = server.post("/gateways/inbox/transfer", &empty).await;
    assert_eq!(local.status(), 400);
    let body: serde_json::Value = local.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(
        body["error"]["message"],
        "Gateway 'inbox' does not accept RPC transfers"
    );

    let malformed = server
        .client
        .post(format!("{}/transfer", server.base))
        .header("content-type", "application/json")
        .body("{\"paths\": 3}")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
    server.stop().await;
}
