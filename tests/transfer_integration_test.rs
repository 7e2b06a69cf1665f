//! End-to-end transfers through the local, SFTP and mail backends

use edi::adapters::connection::{ConnectionFactory, MemoryConnector, MemoryRemoteFs};
use edi::adapters::mailer::RecordingMailer;
use edi::adapters::store::{MemoryStore, Session};
use edi::config::{parse_config, EdiConfig};
use edi::core::Edi;
use edi::domain::{AttachmentRole, DocumentState};
use serde_json::Map;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BASE: &str = r#"
[options.edi]
enabled = true

[entities."res.users"]
key = "login"

[entities."res.users".fields]
name = { type = "text" }

[entities.partner]
key = "name"

[entities.partner.fields]
email = { type = "text" }

[document_types.users]
model = "raw"

[document_types.partner_export]
model = "export"

[document_types.partner_export.export]
kind = "partner"
"#;

fn config(gateways: &str) -> EdiConfig {
    parse_config(&format!("{BASE}\n{gateways}")).unwrap()
}

fn engine(config: EdiConfig) -> Edi {
    Edi::new(config, Arc::new(MemoryStore::new())).unwrap()
}

fn local_gateway(input: &Path, glob: &str, output: Option<&Path>) -> String {
    let mut toml = format!(
        r#"
[gateways.local]
connection = "local"
safety = "edi.enabled"

[[gateways.local.paths]]
name = "in"
path = "{}"
glob = "{}"
allow_send = false
"#,
        input.display(),
        glob
    );
    if let Some(output) = output {
        toml.push_str(&format!(
            r#"
[[gateways.local.paths]]
name = "out"
path = "{}"
allow_receive = false
doc_types = ["partner_export"]
"#,
            output.display()
        ));
    }
    toml
}

#[tokio::test]
async fn test_local_transfer_receives_each_file_once() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello_world.txt"), b"Hello world!").unwrap();
    std::fs::write(dir.path().join("ignored.csv"), b"a,b").unwrap();
    let edi = engine(config(&local_gateway(dir.path(), "*.txt", None)));

    let report = edi.do_transfer("local", None, Some(false)).await.unwrap();
    assert!(report.is_success(), "{:?}", report.issues);
    assert_eq!(report.transfer.input_ids.len(), 1);

    let mut session = edi.begin().await.unwrap();
    let inputs = session.attachments(&report.transfer.input_ids).await.unwrap();
    assert_eq!(inputs[0].name, "hello_world.txt");
    assert_eq!(inputs[0].data, b"Hello world!");
    drop(session);

    let again = edi.do_transfer("local", None, Some(false)).await.unwrap();
    assert!(again.transfer.input_ids.is_empty());
    assert!(again.documents.is_empty());
}

#[tokio::test]
async fn test_local_transfer_autodetects_documents_in_input_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("dummy.txt"), b"Dummy file").unwrap();
    std::fs::write(
        dir.path().join("res.users.csv"),
        b"login,name\nalice,Alice Smith\nbob,Bob Jones\n",
    )
    .unwrap();
    let edi = engine(config(&local_gateway(dir.path(), "*", None)));

    let report = edi.do_transfer("local", None, Some(false)).await.unwrap();
    assert_eq!(report.documents.len(), 2);
    assert_eq!(report.documents[0].doc_type, "unknown");
    assert_eq!(report.documents[1].doc_type, "users");
    assert_eq!(report.documents[1].name, "USERS/00001");

    let mut session = edi.begin().await.unwrap();
    let inputs = session
        .document_attachments(report.documents[0].id, AttachmentRole::Input)
        .await
        .unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].name, "dummy.txt");
    drop(session);

    assert!(edi.action_execute(report.documents[1].id).await.unwrap());
    assert!(!edi.action_execute(report.documents[0].id).await.unwrap());

    let mut session = edi.begin().await.unwrap();
    let users = session
        .search_entities("res.users", &Map::new())
        .await
        .unwrap();
    let logins: Vec<String> = users.iter().filter_map(|u| u.key("login")).collect();
    assert_eq!(logins, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_automatic_transfer_processes_documents() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("dummy.txt"), b"Dummy file").unwrap();
    std::fs::write(dir.path().join("res.users.csv"), b"login\ncarol\n").unwrap();
    let edi = engine(config(&local_gateway(dir.path(), "*", None)));

    let report = edi.do_transfer("local", None, None).await.unwrap();
    let states: Vec<DocumentState> = report.documents.iter().map(|d| d.state).collect();
    assert_eq!(states, vec![DocumentState::Draft, DocumentState::Done]);
    // The unknown document's failure is reported on the transfer
    assert!(!report.is_success());
    assert!(report.issues[0].title.contains("UNKNOWN/00001"));
}

#[tokio::test]
async fn test_send_replaces_stale_file_atomically() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let dest = output.path().join("partner.csv");
    std::fs::write(&dest, b"stale content from an interrupted run").unwrap();

    let edi = engine(config(&local_gateway(
        input.path(),
        "*",
        Some(output.path()),
    )));
    let emitted = edi.autoemit(&["partner_export".to_string()]).await.unwrap();
    assert_eq!(emitted[0].state, DocumentState::Done);

    let report = edi.do_transfer("local", None, None).await.unwrap();
    assert!(report.is_success(), "{:?}", report.issues);
    assert_eq!(report.transfer.output_ids.len(), 1);
    assert_eq!(std::fs::read(&dest).unwrap(), b"name,email\n");

    let leftovers: Vec<String> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left: {leftovers:?}");

    // Same size at the destination: nothing to write
    let again = edi.do_transfer("local", None, None).await.unwrap();
    assert!(again.transfer.output_ids.is_empty());
}

#[tokio::test]
async fn test_sftp_transfer_receives_and_uploads() {
    let fs = MemoryRemoteFs::new();
    fs.put("inbox/res.users.csv", b"login,name\ndave,Dave Brown\n");
    fs.put("inbox/notes.txt", b"not for us");

    let config = config(
        r#"
[gateways.remote]
connection = "sftp"
server = "sftp.example.com"
username = "edi"
safety = "edi.enabled"

[[gateways.remote.paths]]
name = "in"
path = "inbox"
glob = "*.csv"
allow_send = false

[[gateways.remote.paths]]
name = "out"
path = "outbox"
allow_receive = false
doc_types = ["partner_export"]
"#,
    );
    let connections = ConnectionFactory::from_config(&config)
        .unwrap()
        .with_sftp_connector(Arc::new(MemoryConnector(fs.clone())));
    let edi = engine(config).with_connections(connections);
    edi.autoemit(&["partner_export".to_string()]).await.unwrap();

    let report = edi.do_transfer("remote", None, None).await.unwrap();
    assert!(report.is_success(), "{:?}", report.issues);
    assert_eq!(report.transfer.input_ids.len(), 1);
    assert_eq!(report.documents[0].state, DocumentState::Done);
    assert_eq!(fs.get("outbox/partner.csv").unwrap(), b"name,email\n");
    assert!(fs.paths().iter().all(|p| !p.contains("/.")));

    let again = edi.do_transfer("remote", None, None).await.unwrap();
    assert!(again.transfer.input_ids.is_empty());
}

#[tokio::test]
async fn test_mail_transfer_sends_each_document_once() {
    let config = config(
        r#"
[mail]
host = "smtp.example.com"
from = "EDI <edi@example.com>"

[gateways.mailout]
connection = "mail"
safety = "edi.enabled"

[[gateways.mailout.paths]]
name = "partners"
path = "partner@example.com"
doc_types = ["partner_export"]
"#,
    );
    let mailer = Arc::new(RecordingMailer::new());
    let connections = ConnectionFactory::from_config(&config)
        .unwrap()
        .with_mailer(mailer.clone());
    let edi = engine(config).with_connections(connections);
    let emitted = edi.autoemit(&["partner_export".to_string()]).await.unwrap();

    let report = edi.do_transfer("mailout", None, None).await.unwrap();
    assert!(report.is_success(), "{:?}", report.issues);
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "partner@example.com");
    assert_eq!(sent[0].subject, emitted[0].name);
    assert_eq!(sent[0].attachments[0].0, "partner.csv");

    edi.do_transfer("mailout", None, None).await.unwrap();
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_disabled_gateway_leaves_files_alone() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello_world.txt"), b"Hello").unwrap();
    let mut config = config(&local_gateway(dir.path(), "*.txt", None));
    config.options.set("edi.enabled", false);
    let edi = engine(config);

    let report = edi.do_transfer("local", None, None).await.unwrap();
    assert!(report.transfer.input_ids.is_empty());
    assert_eq!(report.issues.len(), 1);
    assert!(report.issues[0]
        .summary
        .contains("Gateway disabled via configuration option 'edi.enabled'"));
}
