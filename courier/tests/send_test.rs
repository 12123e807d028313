//! End-to-end `send` runs
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use courier::{Courier, SendOptions};
use courier_dispatch::SendStatus;
use serde_json::json;
use support::{config, config_with_provider, mock_provider::MockProviderServer, records};

#[tokio::test]
async fn test_dry_run_sends_to_queue() {
    let courier = Courier::new(config());

    let report = courier
        .send(
            records(),
            SendOptions {
                dry_run: true,
                recover: true,
            },
        )
        .await
        .unwrap();

    assert!(!report.session.cancelled);
    assert_eq!(report.session.success, 2);
    assert_eq!(report.session.skipped, 1);
    assert!(report.recovered.is_empty());
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.counts.get(SendStatus::Success), 2);

    let skipped = report
        .records
        .iter()
        .find(|record| record.status == SendStatus::Skipped)
        .unwrap();
    assert_eq!(skipped.id.as_str(), "app-3");
    assert_eq!(skipped.skip_reason.as_deref(), Some("contacted recently"));
}

#[tokio::test]
async fn test_send_without_provider_requires_dry_run() {
    let courier = Courier::new(config());

    let err = courier
        .send(records(), SendOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No provider configured"));
}

#[test]
fn test_queue_filters_records_without_email() {
    let courier = Courier::new(config());
    let queue = courier.queue(records());

    assert_eq!(queue.len(), 3);
    assert_eq!(queue.without_email(), 1);
    assert_eq!(
        queue.recipients()[1].template_model.get("name"),
        Some(&json!("there"))
    );
    assert_eq!(
        queue.recipients()[0].template_model.get("event"),
        Some(&json!("Spring Open House"))
    );
}

#[tokio::test]
async fn test_recover_resends_rate_limited_recipients() {
    let server = MockProviderServer::builder()
        .with_response(429, r#"{"ErrorCode":429,"Message":"Rate limit exceeded"}"#)
        .build()
        .await
        .unwrap();
    let courier = Courier::new(config_with_provider(server.base_url()));

    let report = courier
        .send(
            records(),
            SendOptions {
                dry_run: false,
                recover: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.session.rate_limited, 1);
    assert_eq!(report.session.success, 1);

    assert_eq!(report.recovered.len(), 1);
    let (id, outcome) = &report.recovered[0];
    assert_eq!(id.as_str(), "lead-1");
    assert_eq!(outcome.as_ref().unwrap().status, SendStatus::Success);

    assert_eq!(report.counts.get(SendStatus::Success), 2);
    assert_eq!(report.counts.get(SendStatus::RateLimited), 0);
    assert_eq!(report.counts.get(SendStatus::Reset), 0);

    let requests = server.requests().await;
    let sent_to: Vec<_> = requests
        .iter()
        .map(|request| request.body["To"].clone())
        .collect();
    assert_eq!(
        sent_to,
        vec![
            json!("one@example.com"),
            json!("two@example.com"),
            json!("one@example.com")
        ]
    );
    assert_eq!(requests[2].body["From"], json!("events@example.com"));

    server.shutdown();
}

#[tokio::test]
async fn test_recover_is_skipped_without_failures() {
    let server = MockProviderServer::builder().build().await.unwrap();
    let courier = Courier::new(config_with_provider(server.base_url()));

    let report = courier
        .send(
            records(),
            SendOptions {
                dry_run: false,
                recover: true,
            },
        )
        .await
        .unwrap();

    assert!(report.recovered.is_empty());
    assert_eq!(server.requests().await.len(), 2);

    server.shutdown();
}
