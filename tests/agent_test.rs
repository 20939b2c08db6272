//! Named agents, socket limits and registry lifecycle.

mod common;

use asker::socket::Protocol;
use asker::{AgentOptions, AgentRegistry, AgentSelector, Client, ErrorCode, RequestOptions};
use common::{ok, response, serve, status, Reply};
use std::time::{Duration, Instant};

fn client() -> Client {
    Client::builder().registry(AgentRegistry::new()).build()
}

#[tokio::test]
async fn test_non_persistent_agent_evicted_after_request() {
    let server = serve(|_, _| Reply::Delayed(Duration::from_millis(100), response(200, &[], b""))).await;
    let client = client();

    let request = client
        .request(
            RequestOptions::builder()
                .url(server.url("/"))
                .agent(AgentOptions::named("temp").with_persistent(false)),
        )
        .unwrap();
    let running = tokio::spawn(async move { request.send().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(client.registry().contains(Protocol::Http, "temp"));

    running.await.unwrap().unwrap();
    assert!(!client.registry().contains(Protocol::Http, "temp"));
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn test_non_persistent_agent_evicted_after_failure() {
    let server = serve(|_, _| status(500)).await;
    let client = client();

    let err = client
        .fetch(
            RequestOptions::builder()
                .url(server.url("/"))
                .max_retries(1)
                .min_retries_timeout(Duration::from_millis(10))
                .agent(AgentOptions::named("doomed").with_persistent(false)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RetriesLimitExceeded);
    assert_eq!(server.hits(), 2);
    assert!(!client.registry().contains(Protocol::Http, "doomed"));
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn test_persistent_agent_survives() {
    let server = serve(|_, _| ok("")).await;
    let client = client();

    client
        .fetch(
            RequestOptions::builder()
                .url(server.url("/"))
                .agent(AgentOptions::named("kept")),
        )
        .await
        .unwrap();

    let agent = client.registry().get(Protocol::Http, "kept").unwrap();
    assert!(agent.is_idle());
    assert_eq!(agent.active_count(), 0);
}

#[tokio::test]
async fn test_agents_are_per_protocol() {
    let client = client();
    let http = client
        .create_agent(Protocol::Http, AgentOptions::named("api"))
        .unwrap();
    let https = client
        .create_agent(Protocol::Https, AgentOptions::named("api"))
        .unwrap();
    assert!(!std::sync::Arc::ptr_eq(&http, &https));

    let err = client
        .create_agent(Protocol::Http, AgentOptions::named("api"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AgentNameAlreadyInUse);
    assert_eq!(
        err.to_string(),
        "Agent with name \"api\" already in the agents pool"
    );

    let err = client
        .create_agent(Protocol::Http, AgentOptions::named("globalAgent"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AgentNameAlreadyInUse);
}

#[tokio::test]
async fn test_first_options_win() {
    let server = serve(|_, _| ok("")).await;
    let client = client();
    client
        .create_agent(Protocol::Http, AgentOptions::named("shared").with_max_sockets(2))
        .unwrap();

    client
        .fetch(
            RequestOptions::builder()
                .url(server.url("/"))
                .agent(AgentOptions::named("shared").with_max_sockets(50)),
        )
        .await
        .unwrap();

    let agent = client.registry().get(Protocol::Http, "shared").unwrap();
    assert_eq!(agent.max_sockets(), 2);
}

#[tokio::test]
async fn test_max_sockets_serializes_requests() {
    let server = serve(|_, _| Reply::Delayed(Duration::from_millis(100), response(200, &[], b"done"))).await;
    let client = client();
    let agent = AgentOptions::named("narrow").with_max_sockets(1);

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let request = client
            .request(
                RequestOptions::builder()
                    .url(server.url("/"))
                    .timeout(Duration::from_secs(2))
                    .queue_timeout(Duration::from_secs(2))
                    .agent(agent.clone()),
            )
            .unwrap();
        handles.push(tokio::spawn(async move { request.send().await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text().unwrap(), "done");
    }
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_disabled_agent_uses_fresh_connections() {
    let server = serve(|_, _| ok("solo")).await;
    let client = client();

    for _ in 0..2 {
        let response = client
            .fetch(
                RequestOptions::builder()
                    .url(server.url("/"))
                    .agent(AgentSelector::Disabled),
            )
            .await
            .unwrap();
        assert_eq!(response.text().unwrap(), "solo");
    }

    assert_eq!(server.hits(), 2);
    assert!(client.registry().is_empty());
    assert!(client.registry().default_agent(Protocol::Http).is_idle());
}
