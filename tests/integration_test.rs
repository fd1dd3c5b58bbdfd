use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn lexcrm(server: &Server, session: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("lexcrm-api"));
    cmd.env_remove("LEXCRM_API_TIMEOUT_MS")
        .arg("--base-url")
        .arg(server.url())
        .arg("--token-file")
        .arg(session)
        .arg("--retries")
        .arg("0");
    cmd
}

#[test]
fn test_get_prints_json_with_stored_token() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let mock = server
        .mock("GET", "/clientes")
        .match_header("authorization", "Bearer token-123")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": [{"nome": "Ana Souza"}], "total": 1}"#)
        .create();

    lexcrm(&server, &session)
        .args(["token", "set", "token-123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Token saved."));

    lexcrm(&server, &session)
        .args(["get", "/clientes", "-q", "page=2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ana Souza"))
        .stdout(predicate::str::contains("\"total\": 1"));

    mock.assert();
}

#[test]
fn test_post_sends_data_and_headers() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let mock = server
        .mock("POST", "/processos")
        .match_header("content-type", "application/json")
        .match_header("x-tenant", "escritorio-1")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(serde_json::json!({"numero": "0001234-56.2024.8.26.0100"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "p-1"}"#)
        .create();

    lexcrm(&server, &session)
        .args(["-H", "X-Tenant: escritorio-1"])
        .args([
            "post",
            "/processos",
            "--data",
            r#"{"numero": "0001234-56.2024.8.26.0100"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("p-1"));

    mock.assert();
}

#[test]
fn test_not_found_prints_user_message() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let mock = server
        .mock("GET", "/clientes/999")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Cliente não encontrado", "code": "CLIENT_NOT_FOUND"}"#)
        .expect(1)
        .create();

    lexcrm(&server, &session)
        .args(["get", "/clientes/999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "O recurso solicitado não foi encontrado.",
        ))
        .stderr(predicate::str::contains("Cliente não encontrado"));

    mock.assert();
}

#[test]
fn test_unauthorized_clears_stored_token() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let mock = server
        .mock("GET", "/me")
        .with_status(401)
        .expect(1)
        .create();

    lexcrm(&server, &session)
        .args(["token", "set", "expired"])
        .assert()
        .success();

    lexcrm(&server, &session)
        .args(["get", "/me"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sua sessão expirou."));

    lexcrm(&server, &session)
        .args(["token", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No token stored."));

    mock.assert();
}

#[test]
fn test_upload_and_download() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let source = dir.path().join("procuracao.pdf");
    std::fs::write(&source, "%PDF-1.4 procuracao").unwrap();

    let upload = server
        .mock("POST", "/documentos")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::Regex(r#"filename="procuracao.pdf""#.to_string()))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "doc-7"}"#)
        .create();

    let download = server
        .mock("GET", "/documentos/doc-7/arquivo")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body("%PDF-1.4 procuracao")
        .create();

    lexcrm(&server, &session)
        .arg("upload")
        .arg("/documentos")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("doc-7"));

    let output = dir.path().join("baixados/procuracao.pdf");
    lexcrm(&server, &session)
        .args(["download", "/documentos/doc-7/arquivo", "--output"])
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "%PDF-1.4 procuracao"
    );
    upload.assert();
    download.assert();
}

#[test]
fn test_invalid_data_fails_before_sending() {
    let mut server = Server::new();
    let dir = tempdir().unwrap();
    let session = dir.path().join("session.json");

    let mock = server.mock("POST", "/clientes").expect(0).create();

    lexcrm(&server, &session)
        .args(["post", "/clientes", "--data", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data must be valid JSON"));

    mock.assert();
}
