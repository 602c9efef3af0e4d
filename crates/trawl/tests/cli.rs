// ABOUTME: Integration tests for the trawl CLI binary.
// ABOUTME: Serves a small catalog with httpmock and checks records, teasers and error exits.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn trawl_cmd() -> Command {
    Command::cargo_bin("trawl").unwrap()
}

fn serve_catalog(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(
                r#"<html><body><ul class="results">
                <li><a href="/p/1">Desk</a></li>
                <li><a href="/p/2">Floor</a></li>
                </ul><a class="next" href="/search/2">Next</a></body></html>"#,
            );
    });
    server.mock(|when, then| {
        when.method(GET).path("/search/2");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(r#"<html><body><ul class="results"><li><a href="/p/3">Wall</a></li></ul></body></html>"#);
    });
    for (id, name) in [(1, "Desk Lamp"), (2, "Floor Lamp"), (3, "Wall Lamp")] {
        server.mock(|when, then| {
            when.method(GET).path(format!("/p/{}", id));
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(format!("<html><body><h1>{}</h1></body></html>", name));
        });
    }
}

fn write_config(dir: &TempDir, server: &MockServer) -> PathBuf {
    let config = json!({
        "sites": [{
            "name": "mock-shop",
            "pattern": regex::escape(&server.url("/search")),
            "catalog": {
                "items": {"selectors": ["ul.results > li"], "array": true},
                "next": {"selectors": ["a.next::attr(href)"]}
            },
            "item": {
                "child": {"selectors": ["a::attr(href)"]},
                "datamap": {
                    "title": {"selectors": ["h1::text"], "source": "child"},
                    "label": {"selectors": ["a::text"], "source": "parent"}
                },
                "required": ["title"]
            }
        }]
    });
    let path = dir.path().join("sites.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

#[test]
fn harvests_records_across_pages() {
    let server = MockServer::start();
    serve_catalog(&server);
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);

    trawl_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--depth")
        .arg("0")
        .arg(server.url("/search"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Desk Lamp"))
        .stdout(predicate::str::contains("Floor Lamp"))
        .stdout(predicate::str::contains("Wall Lamp"))
        .stdout(predicate::str::contains("\"label\": \"Wall\""));
}

#[test]
fn prints_teasers_as_base64() {
    let server = MockServer::start();
    serve_catalog(&server);
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);

    let output = trawl_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--teasers")
        .arg("--base64")
        .arg(server.url("/search"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let teasers: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(teasers.len(), 2);
    let decoded = trawl::decode_node(&teasers[0]).unwrap();
    assert_eq!(decoded.text(), "Desk");
}

#[test]
fn writes_output_file() {
    let server = MockServer::start();
    serve_catalog(&server);
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);
    let out = dir.path().join("records.json");

    trawl_cmd()
        .arg("--config")
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .arg("--timing")
        .arg(server.url("/search"))
        .assert()
        .success()
        .stderr(predicate::str::contains("elapsed:"));

    let records: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(records.as_array().map(Vec::len), Some(2));
}

#[test]
fn unrouted_url_fails() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);

    trawl_cmd()
        .arg("--config")
        .arg(&config)
        .arg("https://elsewhere.example.com/search")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no route"));
}

#[test]
fn missing_config_fails() {
    trawl_cmd()
        .arg("--config")
        .arg("/nonexistent/sites.json")
        .arg("https://shop.example.com/")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}
