//! Built-in handlers running inside a worker pool over the in-memory store.

use serde_json::json;
use std::time::Duration;
use taskflow::prelude::*;
use taskflow::testing::{memory_queue, wait_for_status};
use taskflow_worker::config::TaskflowConfig;
use taskflow_worker::handlers::{self, CLEANUP, NOTIFICATION, WEBHOOK};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn pool(queue: &Queue) -> WorkerPool {
    let pool = WorkerPool::new(
        queue.clone(),
        WorkerConfig::default()
            .with_concurrency(2)
            .with_poll_interval(Duration::from_millis(5)),
    );
    handlers::register_all(&pool, &TaskflowConfig::default()).unwrap();
    pool
}

#[tokio::test]
async fn webhook_recovers_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, _store) = memory_queue();
    let pool = pool(&queue);
    let job = Job::new(
        WEBHOOK,
        &json!({ "url": format!("{}/deliver", server.uri()), "body": { "id": 1 } }),
    )
    .unwrap();
    queue.enqueue(&job).await.unwrap();

    let token = CancellationToken::new();
    pool.start(token.clone());
    let done = wait_for_status(&queue, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();
    token.cancel();
    pool.wait().await.unwrap();

    assert_eq!(done.attempts, 2);
    assert_eq!(done.error.as_deref(), Some("webhook failed with status 500"));
    assert_eq!(pool.stats().retried, 1);
}

#[tokio::test]
async fn slack_notification_completes_without_token() {
    let (queue, _store) = memory_queue();
    let pool = pool(&queue);
    let job = Job::new(
        NOTIFICATION,
        &json!({ "user_id": "u-7", "type": "slack", "title": "Deploy", "message": "done" }),
    )
    .unwrap();
    queue.enqueue(&job).await.unwrap();

    let token = CancellationToken::new();
    pool.start(token.clone());
    let done = wait_for_status(&queue, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();
    token.cancel();
    pool.wait().await.unwrap();

    assert_eq!(done.attempts, 1);
    assert!(done.error.is_none());
}

#[tokio::test]
async fn unknown_notification_type_exhausts_attempts() {
    let (queue, _store) = memory_queue();
    let pool = pool(&queue);
    let job = Job::new(
        NOTIFICATION,
        &json!({ "user_id": "u-7", "type": "pager", "title": "Deploy", "message": "done" }),
    )
    .unwrap()
    .with_max_attempts(2);
    queue.enqueue(&job).await.unwrap();

    let token = CancellationToken::new();
    pool.start(token.clone());
    let failed = wait_for_status(&queue, job.id, JobStatus::Failed, WAIT)
        .await
        .unwrap();
    token.cancel();
    pool.wait().await.unwrap();

    assert_eq!(failed.attempts, 2);
    assert_eq!(failed.error.as_deref(), Some("unknown notification type: pager"));
}

#[tokio::test]
async fn cleanup_and_email_complete_on_first_attempt() {
    let (queue, _store) = memory_queue();
    let pool = pool(&queue);
    let cleanup = Job::new(
        CLEANUP,
        &json!({ "target": "sessions", "older_than": "24h", "dry_run": true }),
    )
    .unwrap();
    let email = Job::new(
        handlers::EMAIL,
        &json!({ "to": "ops@example.com", "subject": "Nightly", "body": "ok" }),
    )
    .unwrap()
    .with_priority(Priority::HIGH);
    queue.enqueue(&cleanup).await.unwrap();
    queue.enqueue(&email).await.unwrap();

    let token = CancellationToken::new();
    pool.start(token.clone());
    for id in [cleanup.id, email.id] {
        let done = wait_for_status(&queue, id, JobStatus::Completed, WAIT)
            .await
            .unwrap();
        assert_eq!(done.attempts, 1);
        assert!(done.error.is_none());
    }
    token.cancel();
    pool.wait().await.unwrap();
    assert_eq!(pool.stats().succeeded, 2);
}
