use autoapply::{
    app_state::AppState,
    automation::{
        chromium::ChromiumLauncher, Dispatcher, EngineTimeouts, InteractionEngine, ScreenshotStore,
        SessionFactory,
    },
    config::AppConfig,
    db::{self, PgTaskStore, TaskStore},
    models::task::TaskKind,
    routes,
    services::{
        content::{ChatCompletionGenerator, ContentGenerator, TemplateGenerator},
        handlers::{ApplyHandler, InterviewHandler, ScrapeHandler, TaskHandler},
        notifier::{NoopNotifier, Notifier, WebhookNotifier},
        pool::{PoolSettings, WorkerPool},
        queue::{JobQueue, QueueError, TaskQueue},
        reporter::StatusReporter,
    },
};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting autoapply worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Connecting to Redis task queues");
    let queue = Arc::new(
        JobQueue::with_lease(&config.redis_url, config.lease_ttl())
            .expect("Failed to initialize task queue"),
    );
    queue.heartbeat().await.expect("Failed to register queue consumer");
    tracing::info!(consumer = %queue.consumer_id(), "Registered queue consumer");

    // Deliveries left in flight by workers that died are handed out again.
    recover_orphaned(&queue)
        .await
        .expect("Failed to recover in-flight tasks");

    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(db_pool.clone()));

    let notifier: Arc<dyn Notifier> = match &config.notification_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Notifications enabled");
            Arc::new(WebhookNotifier::new(url).expect("Failed to initialize webhook client"))
        }
        None => Arc::new(NoopNotifier),
    };
    let reporter = StatusReporter::new(Arc::clone(&store), notifier);

    let sessions: Arc<dyn SessionFactory> = Arc::new(ChromiumLauncher::new(
        config.chromium_remote_url.clone(),
        config.chromium_executable.clone(),
    ));

    let engine = InteractionEngine::new(
        EngineTimeouts {
            budget: config.task_budget(),
            ..EngineTimeouts::default()
        },
        ScreenshotStore::new(&config.screenshot_dir, &config.screenshot_url_prefix),
    );

    let generator: Arc<dyn ContentGenerator> = match &config.content_api_url {
        Some(url) => Arc::new(
            ChatCompletionGenerator::new(
                url,
                config.content_api_key.as_deref().unwrap_or_default(),
                &config.content_model,
            )
            .expect("Failed to initialize content generator"),
        ),
        None => Arc::new(TemplateGenerator),
    };

    let handlers: Vec<Arc<dyn TaskHandler>> = vec![
        Arc::new(ApplyHandler::new(
            Dispatcher::default(),
            engine,
            Arc::clone(&sessions),
            config.resume_root.clone(),
        )),
        Arc::new(ScrapeHandler::new(Arc::clone(&sessions), Arc::clone(&store))),
        Arc::new(InterviewHandler::new(generator)),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // The lease outlives the pools so draining deliveries stay owned.
    let (lease_stop_tx, lease_stop_rx) = watch::channel(false);
    let lease = tokio::spawn(keep_lease(Arc::clone(&queue), lease_stop_rx));
    let task_queue: Arc<dyn TaskQueue> = queue.clone();
    let mut pools = Vec::new();
    for handler in handlers {
        let settings = PoolSettings {
            concurrency: config.concurrency(handler.kind()),
            max_delivery_attempts: config.max_delivery_attempts,
            poll_interval: config.poll_interval(),
        };
        let pool = Arc::new(WorkerPool::new(
            settings,
            Arc::clone(&task_queue),
            Arc::clone(&store),
            reporter.clone(),
            handler,
        ));
        pools.push(tokio::spawn(pool.run(shutdown_rx.clone())));
    }

    let state = AppState::new(db_pool, Arc::clone(&queue));
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Worker ready, health and metrics on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested, draining worker pools");
        })
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    for pool in pools {
        if let Err(e) = pool.await {
            tracing::error!(error = %e, "Worker pool task ended abnormally");
        }
    }
    let _ = lease_stop_tx.send(true);
    if let Err(e) = lease.await {
        tracing::error!(error = %e, "Lease task ended abnormally");
    }
    if let Err(e) = queue.release().await {
        tracing::warn!(error = %e, "Failed to release queue lease");
    }

    tracing::info!("Worker stopped");
}

async fn recover_orphaned(queue: &JobQueue) -> Result<(), QueueError> {
    for kind in TaskKind::ALL {
        let moved = queue.recover_in_flight(kind).await?;
        if moved > 0 {
            tracing::warn!(kind = %kind, moved, "Requeued tasks from an expired consumer");
        }
    }
    Ok(())
}

/// Refresh this worker's lease and sweep up after dead workers until shutdown.
async fn keep_lease(queue: Arc<JobQueue>, mut shutdown: watch::Receiver<bool>) {
    let period = queue.lease_ttl() / 3;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = queue.heartbeat().await {
            tracing::error!(error = %e, "Queue heartbeat failed");
            continue;
        }
        if let Err(e) = recover_orphaned(&queue).await {
            tracing::warn!(error = %e, "In-flight recovery failed");
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!(
        "automation_tasks_submitted",
        "Total automation tasks enqueued"
    );
    metrics::describe_counter!(
        "automation_tasks_started",
        "Total task deliveries claimed by a worker pool"
    );
    metrics::describe_counter!(
        "automation_tasks_completed",
        "Total tasks that ended in success"
    );
    metrics::describe_counter!(
        "automation_tasks_failed",
        "Total tasks that ended in failure"
    );
    metrics::describe_histogram!(
        "automation_task_seconds",
        "Time spent executing one task"
    );
    metrics::describe_gauge!(
        "automation_queue_depth",
        "Current number of pending tasks per kind"
    );
    metrics::describe_gauge!(
        "browser_sessions_open",
        "Browser sessions currently open"
    );
}
