//! End-to-end tests on the reqwest transport against a local axum backend.

use std::sync::mpsc;
use std::time::Duration;

use futures_util::future::join_all;

mod common;

#[test]
fn get_returns_backend_body() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let response = service
        .get(&format!("http://{addr}/hello"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.status, Some(200));
    assert_eq!(response.text(), "Hello from backend");
    assert!(response.failure.is_none());
    service.shutdown().unwrap();
}

#[test]
fn post_echoes_json_body() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let echoed = service
        .post(&format!("http://{addr}/echo"), "{\"a\":1}")
        .unwrap();
    let content_type = service
        .post(&format!("http://{addr}/content-type"), "{}")
        .unwrap();

    assert_eq!(echoed.wait().unwrap().text(), "{\"a\":1}");
    assert_eq!(content_type.wait().unwrap().text(), "application/json");
    service.shutdown().unwrap();
}

#[test]
fn callback_receives_response_on_worker_thread() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let (tx, rx) = mpsc::channel();
    service
        .get_with(&format!("http://{addr}/hello"), move |response| {
            let worker = std::thread::current().name().map(str::to_owned);
            tx.send((worker, response)).unwrap();
        })
        .unwrap();

    let (worker, response) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(worker.as_deref(), Some("http-service-worker"));
    assert_eq!(response.text(), "Hello from backend");
    service.shutdown().unwrap();
}

#[test]
fn non_success_status_is_reported() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let response = service
        .get(&format!("http://{addr}/missing"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.status, Some(404));
    assert_eq!(response.text(), "no such thing");
    assert!(response.failure.is_none());
    assert!(!response.is_success());
    service.shutdown().unwrap();
}

#[test]
fn refused_connection_completes_with_failure() {
    let service = common::http_service();

    let response = service
        .get("http://127.0.0.1:9/")
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.status, None);
    assert!(response.failure.is_some());
    assert!(response.body.is_empty());
    service.shutdown().unwrap();
}

#[test]
fn large_body_is_fully_accumulated() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let response = service
        .get(&format!("http://{addr}/big"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.body.len(), common::BIG_BODY_LEN);
    assert!(response.body.iter().all(|b| *b == b'x'));
    service.shutdown().unwrap();
}

#[test]
fn shutdown_waits_for_slow_transfer() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let (tx, rx) = mpsc::channel();
    service
        .get_with(&format!("http://{addr}/slow"), move |response| {
            tx.send(response).unwrap();
        })
        .unwrap();
    service.shutdown().unwrap();

    let response = rx.try_recv().expect("shutdown returned before the transfer finished");
    assert_eq!(response.text(), "finally");
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn deferred_handles_can_be_awaited() {
    let addr = common::start_mock_backend();
    let service = common::http_service();

    let pending: Vec<_> = (0..20)
        .map(|i| {
            if i % 2 == 0 {
                service.get(&format!("http://{addr}/hello")).unwrap()
            } else {
                service
                    .post(&format!("http://{addr}/echo"), format!("{{\"n\":{i}}}"))
                    .unwrap()
            }
        })
        .collect();

    let responses = join_all(pending).await;
    for (i, response) in responses.into_iter().enumerate() {
        let response = response.unwrap();
        if i % 2 == 0 {
            assert_eq!(response.text(), "Hello from backend");
        } else {
            assert_eq!(response.text(), format!("{{\"n\":{i}}}"));
        }
    }

    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .unwrap()
        .unwrap();
}
