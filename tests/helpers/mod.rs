//! In-memory stand-ins for the browser, task store, queue and notifier.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use autoapply::automation::{
    BrowserSession, ElementHandle, EngineTimeouts, Locator, SessionError, SessionFactory,
};
use autoapply::db::{StoreError, TaskStore};
use autoapply::models::posting::JobPosting;
use autoapply::models::task::{
    ApplicantProfile, ApplyPayload, AutomationTask, TaskKind, TaskOutcome, TaskPayload, TaskStatus,
};
use autoapply::services::notifier::{NotifyError, Notifier, TaskEvent};
use autoapply::services::queue::{Delivery, QueueError, QueuedTask, TaskQueue};

pub fn test_profile() -> ApplicantProfile {
    ApplicantProfile {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "+44 20 7946 0000".to_string(),
    }
}

pub fn apply_payload(url: &str) -> ApplyPayload {
    ApplyPayload {
        user_id: "user-1".to_string(),
        target_url: url.to_string(),
        profile: test_profile(),
        resume_ref: None,
        cover_letter: None,
    }
}

/// Engine waits scaled down so tests using real time stay fast.
pub fn fast_timeouts() -> EngineTimeouts {
    EngineTimeouts {
        navigation: Duration::from_millis(500),
        settle: Duration::from_millis(1),
        upload_settle: Duration::from_millis(1),
        entry: Duration::from_millis(100),
        field: Duration::from_millis(20),
        upload: Duration::from_millis(20),
        step: Duration::from_millis(20),
        submit: Duration::from_millis(50),
        screenshot: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        budget: Duration::from_secs(5),
    }
}

/// How the fake page responds to navigation.
#[derive(Debug, Clone)]
pub enum Navigation {
    Load,
    /// Never finishes loading.
    Hang,
    Refuse(&'static str),
    Panic,
}

/// Scripted page: which locators are visible, and for how many clicks.
#[derive(Debug, Clone)]
pub struct FakePage {
    visible: HashMap<Locator, usize>,
    navigation: Navigation,
    goto_delay: Duration,
    html: String,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            visible: HashMap::new(),
            navigation: Navigation::Load,
            goto_delay: Duration::ZERO,
            html: String::new(),
        }
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(mut self, locator: Locator) -> Self {
        self.visible.insert(locator, usize::MAX);
        self
    }

    pub fn show_all(mut self, locators: &[Locator]) -> Self {
        for locator in locators {
            self.visible.insert(*locator, usize::MAX);
        }
        self
    }

    /// Visible until clicked `clicks` times.
    pub fn show_for_clicks(mut self, locator: Locator, clicks: usize) -> Self {
        self.visible.insert(locator, clicks);
        self
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn goto_delay(mut self, delay: Duration) -> Self {
        self.goto_delay = delay;
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }
}

/// Everything a fake session was asked to do.
#[derive(Debug, Default)]
pub struct Recorded {
    pub visited: Vec<String>,
    pub clicks: Vec<Locator>,
    pub fills: Vec<(Locator, String)>,
    pub uploads: Vec<PathBuf>,
    pub closes: usize,
}

#[derive(Debug, Default)]
pub struct OpenCounter {
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub opened: AtomicUsize,
}

impl OpenCounter {
    fn acquire(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeSession {
    page: FakePage,
    issued: Vec<Locator>,
    record: Arc<Mutex<Recorded>>,
    counter: Option<Arc<OpenCounter>>,
    closed: bool,
}

impl FakeSession {
    pub fn new(page: FakePage) -> (Self, Arc<Mutex<Recorded>>) {
        let record = Arc::new(Mutex::new(Recorded::default()));
        let session = Self {
            page,
            issued: Vec::new(),
            record: Arc::clone(&record),
            counter: None,
            closed: false,
        };
        (session, record)
    }

    fn resolve(&self, element: &ElementHandle) -> Result<Locator, SessionError> {
        element
            .id()
            .parse::<usize>()
            .ok()
            .and_then(|i| self.issued.get(i).copied())
            .ok_or_else(|| SessionError::StaleHandle(element.id().to_string()))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        self.record.lock().unwrap().visited.push(url.to_string());
        match self.page.navigation.clone() {
            Navigation::Load => {
                tokio::time::sleep(self.page.goto_delay).await;
                Ok(())
            }
            Navigation::Hang => std::future::pending().await,
            Navigation::Refuse(reason) => Err(SessionError::Navigation {
                url: url.to_string(),
                reason: reason.to_string(),
            }),
            Navigation::Panic => panic!("renderer crashed"),
        }
    }

    async fn find_visible(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, SessionError> {
        match self.page.visible.get(locator) {
            Some(remaining) if *remaining > 0 => {
                self.issued.push(*locator);
                Ok(Some(ElementHandle::new((self.issued.len() - 1).to_string())))
            }
            _ => Ok(None),
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let locator = self.resolve(element)?;
        if let Some(remaining) = self.page.visible.get_mut(&locator) {
            if *remaining != usize::MAX {
                *remaining = remaining.saturating_sub(1);
            }
        }
        self.record.lock().unwrap().clicks.push(locator);
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), SessionError> {
        let locator = self.resolve(element)?;
        self.record.lock().unwrap().fills.push((locator, value.to_string()));
        Ok(())
    }

    async fn attach_file(&mut self, element: &ElementHandle, path: &Path) -> Result<(), SessionError> {
        self.resolve(element)?;
        self.record.lock().unwrap().uploads.push(path.to_path_buf());
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        Ok(self.page.html.clone())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if !self.closed {
            self.closed = true;
            self.record.lock().unwrap().closes += 1;
            if let Some(counter) = &self.counter {
                counter.release();
            }
        }
        Ok(())
    }
}

/// Opens fake sessions over one scripted page and tracks how many are live.
pub struct FakeSessionFactory {
    page: FakePage,
    pub counter: Arc<OpenCounter>,
    pub records: Mutex<Vec<Arc<Mutex<Recorded>>>>,
    pub fail_open: AtomicBool,
}

impl FakeSessionFactory {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            counter: Arc::new(OpenCounter::default()),
            records: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn total_closes(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.lock().unwrap().closes)
            .sum()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SessionError::Launch("no browser in test".to_string()));
        }
        let (mut session, record) = FakeSession::new(self.page.clone());
        session.counter = Some(Arc::clone(&self.counter));
        self.counter.acquire();
        self.records.lock().unwrap().push(record);
        Ok(Box::new(session))
    }
}

/// Task store with the same transition rules as the PostgreSQL one.
#[derive(Default)]
pub struct MemoryStore {
    pub tasks: Mutex<HashMap<Uuid, AutomationTask>>,
    pub postings: Mutex<Vec<(String, JobPosting)>>,
    pub fail_record: AtomicBool,
    /// Number of upcoming `record` calls that fail before it recovers.
    pub fail_record_times: AtomicUsize,
}

impl MemoryStore {
    pub fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.tasks.lock().unwrap().get(&task_id).map(|t| t.status)
    }

    pub fn set_attempts(&self, task_id: Uuid, attempts: i32) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&task_id) {
            task.attempts = attempts;
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.lock().unwrap().values().all(|t| t.status.is_terminal())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task_id: Uuid, payload: &TaskPayload) -> Result<AutomationTask, StoreError> {
        let now = Utc::now();
        let task = AutomationTask {
            id: task_id,
            kind: payload.kind(),
            user_id: payload.user_id().to_string(),
            target: payload.target().to_string(),
            status: TaskStatus::Queued,
            attempts: 0,
            logs: Vec::new(),
            screenshot_ref: None,
            error: None,
            requires_manual_review: false,
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().insert(task_id, task.clone());
        Ok(task)
    }

    async fn claim(&self, task_id: Uuid) -> Result<Option<i32>, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&task_id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = TaskStatus::Processing;
                task.attempts += 1;
                task.updated_at = Utc::now();
                Ok(Some(task.attempts))
            }
            _ => Ok(None),
        }
    }

    async fn record(&self, task_id: Uuid, outcome: &TaskOutcome) -> Result<bool, StoreError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("record disabled in test".to_string()));
        }
        let failing = self
            .fail_record_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("record briefly unavailable".to_string()));
        }
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&task_id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = outcome.status;
                task.logs = outcome.logs.clone();
                task.screenshot_ref = outcome.screenshot_ref.clone().or(task.screenshot_ref.take());
                task.error = outcome.error.clone();
                task.requires_manual_review = outcome.requires_manual_review;
                task.result = outcome.result.clone().or(task.result.take());
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<AutomationTask>, StoreError> {
        Ok(self.tasks.lock().unwrap().get(&task_id).cloned())
    }

    async fn save_posting(
        &self,
        user_id: &str,
        posting: &JobPosting,
        _raw_html: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        let mut postings = self.postings.lock().unwrap();
        postings.retain(|(_, p)| p.url != posting.url);
        postings.push((user_id.to_string(), posting.clone()));
        Ok(Uuid::new_v4())
    }
}

#[derive(Default)]
struct Lanes {
    pending: HashMap<TaskKind, VecDeque<String>>,
    processing: HashMap<(String, TaskKind), Vec<String>>,
    dead: HashSet<String>,
}

/// Queue with the same semantics as the Redis one: a shared pending lane per
/// kind and a processing lane per consumer. Handles made with [`Self::peer`]
/// share the lanes under another consumer id.
pub struct MemoryQueue {
    consumer: String,
    lanes: Arc<Mutex<Lanes>>,
    pub fail_enqueue: AtomicBool,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self {
            consumer: "worker-0".to_string(),
            lanes: Arc::default(),
            fail_enqueue: AtomicBool::new(false),
        }
    }
}

impl MemoryQueue {
    pub fn peer(&self, consumer: &str) -> Self {
        Self {
            consumer: consumer.to_string(),
            lanes: Arc::clone(&self.lanes),
            fail_enqueue: AtomicBool::new(false),
        }
    }

    /// Let this consumer's lease lapse, as if its process died.
    pub fn crash(&self) {
        self.lanes.lock().unwrap().dead.insert(self.consumer.clone());
    }

    pub fn in_flight(&self, kind: TaskKind) -> usize {
        let lanes = self.lanes.lock().unwrap();
        lanes
            .processing
            .get(&(self.consumer.clone(), kind))
            .map_or(0, Vec::len)
    }

    pub fn pending(&self, kind: TaskKind) -> usize {
        self.lanes.lock().unwrap().pending.get(&kind).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        let raw = serde_json::to_string(task)?;
        self.lanes
            .lock()
            .unwrap()
            .pending
            .entry(task.kind())
            .or_default()
            .push_front(raw);
        Ok(())
    }

    async fn dequeue(&self, kind: TaskKind) -> Result<Option<Delivery>, QueueError> {
        let mut lanes = self.lanes.lock().unwrap();
        let Some(raw) = lanes.pending.entry(kind).or_default().pop_back() else {
            return Ok(None);
        };
        lanes
            .processing
            .entry((self.consumer.clone(), kind))
            .or_default()
            .push(raw.clone());
        let task = serde_json::from_str(&raw)?;
        Ok(Some(Delivery { task, raw }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut lanes = self.lanes.lock().unwrap();
        let processing = lanes
            .processing
            .entry((self.consumer.clone(), delivery.task.kind()))
            .or_default();
        if let Some(pos) = processing.iter().position(|r| *r == delivery.raw) {
            processing.remove(pos);
        }
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let kind = delivery.task.kind();
        let mut lanes = self.lanes.lock().unwrap();
        let processing = lanes.processing.entry((self.consumer.clone(), kind)).or_default();
        if let Some(pos) = processing.iter().position(|r| *r == delivery.raw) {
            processing.remove(pos);
            lanes.pending.entry(kind).or_default().push_front(delivery.raw.clone());
        }
        Ok(())
    }

    async fn recover_in_flight(&self, kind: TaskKind) -> Result<u64, QueueError> {
        let mut lanes = self.lanes.lock().unwrap();
        let orphaned: Vec<String> = lanes
            .dead
            .iter()
            .filter(|c| **c != self.consumer)
            .cloned()
            .collect();

        let mut moved = 0;
        for consumer in orphaned {
            let entries = lanes
                .processing
                .remove(&(consumer, kind))
                .unwrap_or_default();
            moved += entries.len() as u64;
            let pending = lanes.pending.entry(kind).or_default();
            for raw in entries.into_iter().rev() {
                pending.push_back(raw);
            }
        }
        Ok(moved)
    }

    async fn queue_depth(&self, kind: TaskKind) -> Result<u64, QueueError> {
        Ok(self.pending(kind) as u64)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<TaskEvent>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &TaskEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Notifier whose endpoint always rejects the event.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _event: &TaskEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Rejected {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
