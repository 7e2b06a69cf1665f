//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables should be run with --test-threads=1
//! to avoid interference between tests.

use edi::config::load_config;
use edi::config::schema::{ConnectionKind, FieldType, RecordModelKind, StoreBackend};
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    std::env::remove_var("EDI_APPLICATION_LOG_LEVEL");
    std::env::remove_var("EDI_SYNCHRONIZER_BATCH_SIZE");
    std::env::remove_var("EDI_SERVER_BIND");
    std::env::remove_var("EDI_SERVER_DEFAULT_GATEWAY");
    std::env::remove_var("EDI_JAIL_PATH");
    std::env::remove_var("TEST_EDI_SFTP_PASSWORD");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const COMPLETE: &str = r#"
[application]
log_level = "debug"

[options.edi]
production = "yes"

[synchronizer]
batch_size = 250

[server]
bind = "0.0.0.0:9000"
default_gateway = "portal"

[logging]
local_enabled = false

[entities.partner]
key = "name"
required = ["name"]

[entities.partner.fields]
email = { type = "text" }
credit_limit = { type = "float", digits = 2 }
parent = { type = "relation", target = "partner" }

[record_types.partner]
target = "partner"
active = true
deactivate = true
sequence = 5

[record_types.partner.values]
email = "mail"

[[record_types.partner.lookups]]
key = "parent_name"
target = "parent"
kind = "partner"

[document_types.partners]
model = "csv"
record_types = ["partner"]

[document_types.partners.csv]
pattern = "partners*.csv"
delimiter = ";"

[gateways.inbox]
connection = "local"
safety = "edi.production"

[[gateways.inbox.paths]]
name = "in"
path = "/srv/edi/in"
glob = "*.csv"
doc_types = ["partners"]
sequence = 2

[[gateways.inbox.paths]]
name = "archive"
path = "/srv/edi/archive"
sequence = 1

[gateways.portal]
connection = "rpc"
safety = "edi.production"
"#;

#[test]
fn test_load_complete_config() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(COMPLETE);
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.synchronizer.batch_size, 250);
    assert!(config.synchronizer.empty_equals_absent);
    assert_eq!(config.server.bind, "0.0.0.0:9000");

    let schema = config.entity("partner").unwrap();
    assert_eq!(schema.kind, "partner");
    assert_eq!(
        schema.field_type("credit_limit"),
        Some(&FieldType::Float { digits: 2 })
    );

    let record_type = config.record_type("partner").unwrap();
    assert_eq!(record_type.model, RecordModelKind::Sync);
    assert_eq!(record_type.via, "name");
    assert!(record_type.dedupe);
    assert_eq!(record_type.lookups[0].via, "name");

    let doc_type = config.document_type("partners").unwrap();
    assert_eq!(doc_type.csv.delimiter, ';');
    assert_eq!(doc_type.name_prefix(), "PARTNERS/");

    let gateway = config.gateway("inbox").unwrap();
    assert_eq!(gateway.connection, ConnectionKind::Local);
    let names: Vec<&str> = gateway
        .paths_in_sequence()
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["archive", "in"]);
    assert_eq!(gateway.paths[0].age_window, 24.0);
}

#[test]
fn test_unknown_document_type_is_implicit() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(COMPLETE);
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.unknown_document_type(), "unknown");
    assert_eq!(config.document_type("unknown").unwrap().model, "unknown");
}

#[test]
fn test_env_overrides() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    std::env::set_var("EDI_SYNCHRONIZER_BATCH_SIZE", "10");
    std::env::set_var("EDI_SERVER_BIND", "127.0.0.1:9999");
    std::env::set_var("EDI_JAIL_PATH", "/srv/jail");

    let file = write_config(COMPLETE);
    let result = load_config(file.path());
    cleanup_env_vars();

    let config = result.unwrap();
    assert_eq!(config.synchronizer.batch_size, 10);
    assert_eq!(config.server.bind, "127.0.0.1:9999");
    assert_eq!(
        config.options.get_str("edi.jail_path").as_deref(),
        Some("/srv/jail")
    );
}

#[test]
fn test_env_substitution() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_EDI_SFTP_PASSWORD", "s3cret");

    let file = write_config(
        r#"
[gateways.remote]
connection = "sftp"
server = "sftp.example.com"
username = "edi"
password = "${TEST_EDI_SFTP_PASSWORD}"
"#,
    );
    let result = load_config(file.path());
    cleanup_env_vars();

    let config = result.unwrap();
    let gateway = config.gateway("remote").unwrap();
    assert_eq!(
        gateway.resolve_password(&config.options).as_deref(),
        Some("s3cret")
    );
}

#[test]
fn test_missing_env_var_is_reported() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let file = write_config(
        r#"
[gateways.remote]
connection = "sftp"
server = "sftp.example.com"
username = "edi"
password = "${TEST_EDI_SFTP_PASSWORD}"
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_EDI_SFTP_PASSWORD"));
}

#[test]
fn test_invalid_references_are_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let cases = [
        (
            "[document_types.orders]\nmodel = \"csv\"\nrecord_types = [\"missing\"]",
            "unknown record type 'missing'",
        ),
        (
            "[record_types.lines]\ntarget = \"nowhere\"",
            "unknown target entity kind 'nowhere'",
        ),
        (
            "[gateways.out]\nconnection = \"mail\"",
            "mail gateways require a [mail] section",
        ),
        (
            "[server]\ndefault_gateway = \"ghost\"",
            "unknown gateway 'ghost'",
        ),
        (
            "[gateways.remote]\nconnection = \"sftp\"\nusername = \"edi\"",
            "sftp gateways require a server",
        ),
    ];
    for (contents, expected) in cases {
        let file = write_config(contents);
        let err = load_config(file.path()).unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "expected '{expected}' in '{err}'"
        );
    }
}

#[test]
fn test_missing_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let err = load_config("/nonexistent/edi.toml").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}
