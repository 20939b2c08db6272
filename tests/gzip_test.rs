mod common;

use asker::{AgentRegistry, Client, ErrorCode, RequestOptions};
use common::{response, serve, Reply};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

fn client() -> Client {
    Client::builder().registry(AgentRegistry::new()).build()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_gzip_response_is_inflated() {
    let body = gzip(b"{\"compressed\":true}");
    let server = serve(move |_, _| {
        Reply::Raw(response(200, &[("Content-Encoding", "gzip")], &body))
    })
    .await;

    let response = client()
        .fetch(RequestOptions::builder().url(server.url("/gz")))
        .await
        .unwrap();

    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["compressed"], true);
    assert_eq!(
        server.captured()[0].header("accept-encoding").as_deref(),
        Some("gzip, *")
    );
}

#[tokio::test]
async fn test_x_gzip_is_inflated() {
    let body = gzip(b"legacy");
    let server = serve(move |_, _| {
        Reply::Raw(response(200, &[("Content-Encoding", "x-gzip")], &body))
    })
    .await;

    let response = client()
        .fetch(RequestOptions::builder().url(server.url("/")))
        .await
        .unwrap();
    assert_eq!(response.text().unwrap(), "legacy");
}

#[tokio::test]
async fn test_gzip_disabled_keeps_body() {
    let body = gzip(b"untouched");
    let expected = body.clone();
    let server = serve(move |_, _| {
        Reply::Raw(response(200, &[("Content-Encoding", "gzip")], &body))
    })
    .await;

    let response = client()
        .fetch(RequestOptions::builder().url(server.url("/")).allow_gzip(false))
        .await
        .unwrap();

    assert_eq!(response.data().unwrap().as_ref(), expected.as_slice());
    assert!(server.captured()[0].header("accept-encoding").is_none());
}

#[tokio::test]
async fn test_corrupt_gzip_is_final() {
    let server = serve(|_, _| {
        Reply::Raw(response(200, &[("Content-Encoding", "gzip")], b"not gzip at all"))
    })
    .await;

    let err = client()
        .fetch(
            RequestOptions::builder()
                .url(server.url("/"))
                .max_retries(3)
                .request_id("gz"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::GunzipError);
    assert!(err.to_string().starts_with("Response body deflating error for request gz"));
    assert_eq!(server.hits(), 1);
}
