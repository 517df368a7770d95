use autoapply::{
    config::AppConfig,
    db::{self, queries, PgTaskStore, TaskStore},
    models::posting::JobPosting,
    models::task::{InterviewPayload, ScrapePayload, TaskKind, TaskOutcome, TaskPayload, TaskStatus},
    services::{
        notifier::NoopNotifier,
        queue::{Delivery, JobQueue, QueuedTask, TaskQueue},
        reporter::StatusReporter,
        submitter::TaskSubmitter,
    },
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Integration test: submission, claim, outcome and status against real
/// PostgreSQL and Redis.
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via DATABASE_URL and REDIS_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize queue"));
    queue.health_check().await.expect("Redis unreachable");

    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(db_pool.clone()));
    let reporter = StatusReporter::new(store.clone(), Arc::new(NoopNotifier));
    let submitter = TaskSubmitter::new(store.clone(), queue.clone(), reporter.clone());

    let user_id = format!("it-{}", Uuid::new_v4());

    // 1. Submit persists a queued row and enqueues it
    let task_id = submitter
        .submit_interview(InterviewPayload {
            user_id: user_id.clone(),
            job_title: "Integration Tester".to_string(),
            company: None,
            skills: vec![],
        })
        .await
        .expect("Submit failed");

    let view = submitter.status(task_id).await.expect("Status failed");
    assert_eq!(view.status, TaskStatus::Queued);

    // 2. Dequeue until our task shows up (other tests may share the queue)
    let delivery = loop {
        let delivery = queue
            .dequeue(TaskKind::Interview)
            .await
            .expect("Dequeue failed")
            .expect("Queue unexpectedly empty");
        if delivery.task.task_id == task_id {
            break delivery;
        }
        queue.ack(&delivery).await.expect("Ack failed");
    };

    // 3. Claim moves the row to processing
    let attempts = store.claim(task_id).await.expect("Claim failed");
    assert_eq!(attempts, Some(1));

    // 4. Record a terminal outcome, then acknowledge
    let outcome = TaskOutcome::success(vec![]).with_result(serde_json::json!({ "questions": [] }));
    assert!(reporter.report(&delivery.task, &outcome).await.expect("Report failed"));
    queue.ack(&delivery).await.expect("Ack failed");

    // 5. Terminal rows are immutable
    let late = TaskOutcome::failed(vec![], "late failure");
    assert!(!store.record(task_id, &late).await.expect("Record failed"));
    assert_eq!(store.claim(task_id).await.expect("Claim failed"), None);

    let first = submitter.status(task_id).await.expect("Status failed");
    let second = submitter.status(task_id).await.expect("Status failed");
    assert_eq!(first, second);
    assert_eq!(first.status, TaskStatus::Success);

    // 6. Stats and listing
    let stats = queries::task_stats(&db_pool, &user_id, TaskKind::Interview)
        .await
        .expect("Stats failed");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);

    let tasks = queries::list_user_tasks(&db_pool, &user_id, 10)
        .await
        .expect("List failed");
    assert_eq!(tasks.len(), 1);

    // 7. Postings upsert by URL
    let posting = JobPosting {
        url: format!("https://careers.example.org/{}", Uuid::new_v4()),
        title: "Integration Tester".to_string(),
        company: "Example Org".to_string(),
        ..JobPosting::default()
    };
    let id_a = store
        .save_posting(&user_id, &posting, None)
        .await
        .expect("Save failed");
    let id_b = store
        .save_posting(&user_id, &posting, Some("<html></html>"))
        .await
        .expect("Save failed");
    assert_eq!(id_a, id_b);

    println!("Integration test passed for task {task_id}");
}

/// Drain `kind` on `queue` until `task_id` shows up, acknowledging anything
/// else left over from earlier runs.
async fn take(queue: &JobQueue, kind: TaskKind, task_id: Uuid) -> Option<Delivery> {
    while let Some(delivery) = queue.dequeue(kind).await.expect("Dequeue failed") {
        if delivery.task.task_id == task_id {
            return Some(delivery);
        }
        queue.ack(&delivery).await.expect("Ack failed");
    }
    None
}

/// Integration test: startup recovery only takes deliveries whose consumer
/// lease has expired.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_recovery_respects_live_leases() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let holder = JobQueue::with_lease(&config.redis_url, Duration::from_secs(1))
        .expect("Failed to initialize queue");
    let restarted = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");
    holder.heartbeat().await.expect("Heartbeat failed");
    restarted.heartbeat().await.expect("Heartbeat failed");

    let task = QueuedTask::new(
        Uuid::new_v4(),
        TaskPayload::Scrape(ScrapePayload {
            user_id: "it-lease".to_string(),
            url: "https://careers.example.org/lease".to_string(),
        }),
    );
    holder.enqueue(&task).await.expect("Enqueue failed");
    take(&holder, TaskKind::Scrape, task.task_id)
        .await
        .expect("Enqueued task not delivered");

    // The holder's lease is live: nothing of ours is recovered.
    restarted
        .recover_in_flight(TaskKind::Scrape)
        .await
        .expect("Recovery failed");
    assert!(take(&restarted, TaskKind::Scrape, task.task_id).await.is_none());

    // Without heartbeats the lease lapses and the delivery comes back.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let moved = restarted
        .recover_in_flight(TaskKind::Scrape)
        .await
        .expect("Recovery failed");
    assert!(moved >= 1);
    let redelivered = take(&restarted, TaskKind::Scrape, task.task_id)
        .await
        .expect("Expired delivery not recovered");
    restarted.ack(&redelivered).await.expect("Ack failed");
    restarted.release().await.expect("Release failed");
}
