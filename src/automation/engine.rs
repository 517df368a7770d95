use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use crate::automation::adapter::SiteAdapter;
use crate::automation::locator::{ElementHandle, Locator, ProfileField};
use crate::automation::screenshot::ScreenshotStore;
use crate::automation::session::{BrowserSession, SessionError};
use crate::models::automation::SiteAdapterResult;
use crate::models::task::{ApplicantProfile, LogEntry};

/// Upper bound on "continue"/"next" clicks in a multi-step form.
pub const MAX_ADVANCE_STEPS: usize = 5;

/// Fixed waits and polling bounds of one apply run.
#[derive(Debug, Clone, Copy)]
pub struct EngineTimeouts {
    pub navigation: Duration,
    /// Wait after each action for client-side rendering.
    pub settle: Duration,
    pub upload_settle: Duration,
    pub entry: Duration,
    pub field: Duration,
    pub upload: Duration,
    pub step: Duration,
    pub submit: Duration,
    pub screenshot: Duration,
    pub poll_interval: Duration,
    /// Whole-run budget; exhausting it fails the task.
    pub budget: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            settle: Duration::from_secs(2),
            upload_settle: Duration::from_secs(1),
            entry: Duration::from_secs(5),
            field: Duration::from_secs(1),
            upload: Duration::from_secs(3),
            step: Duration::from_secs(2),
            submit: Duration::from_secs(3),
            screenshot: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            budget: Duration::from_secs(90),
        }
    }
}

/// Everything the engine needs to fill one application.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub target_url: String,
    pub profile: ApplicantProfile,
    pub resume_path: Option<PathBuf>,
    pub cover_letter: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Navigation(SessionError),

    #[error("{control} control not found (tried {tried})")]
    ElementNotFound { control: &'static str, tried: String },

    #[error("task budget of {}s exhausted (timed out)", .0.as_secs())]
    BudgetExhausted(Duration),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drives a browser session through the apply state machine:
/// open, locate entry, fill, attach resume, advance, submit.
///
/// `run` never returns an error: every failure is folded into a failed
/// [`SiteAdapterResult`] with the message, the log so far and a best-effort
/// screenshot.
#[derive(Debug, Clone)]
pub struct InteractionEngine {
    timeouts: EngineTimeouts,
    screenshots: ScreenshotStore,
}

/// Mutable state of one run.
#[derive(Default)]
struct RunLog {
    logs: Vec<LogEntry>,
    screenshot_ref: Option<String>,
}

impl RunLog {
    fn info(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry::info(message));
    }

    fn error(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry::error(message));
    }
}

impl InteractionEngine {
    pub fn new(timeouts: EngineTimeouts, screenshots: ScreenshotStore) -> Self {
        Self {
            timeouts,
            screenshots,
        }
    }

    pub fn timeouts(&self) -> &EngineTimeouts {
        &self.timeouts
    }

    pub async fn run(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        request: &ApplyRequest,
    ) -> SiteAdapterResult {
        let started = Instant::now();
        let mut run = RunLog::default();

        tracing::info!(
            adapter = adapter.name,
            url = %request.target_url,
            "Starting application run"
        );

        let driven = timeout(
            self.timeouts.budget,
            self.drive(adapter, &mut *session, request, &mut run),
        )
        .await;

        let error = match driven {
            Ok(Ok(())) => {
                tracing::info!(
                    adapter = adapter.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    manual_review = adapter.requires_manual_review,
                    "Application run succeeded"
                );
                return SiteAdapterResult {
                    success: true,
                    logs: run.logs,
                    screenshot_ref: run.screenshot_ref,
                    error: None,
                    requires_manual_review: adapter.requires_manual_review,
                };
            }
            Ok(Err(e)) => e,
            Err(_) => EngineError::BudgetExhausted(self.timeouts.budget),
        };

        let message = error.to_string();
        tracing::warn!(
            adapter = adapter.name,
            url = %request.target_url,
            error = %message,
            "Application run failed"
        );

        if run.screenshot_ref.is_none() {
            run.screenshot_ref = self.capture(session, &mut run).await;
        }
        run.error(format!("{} application failed: {}", adapter.name, message));

        SiteAdapterResult {
            success: false,
            logs: run.logs,
            screenshot_ref: run.screenshot_ref,
            error: Some(message),
            requires_manual_review: false,
        }
    }

    async fn drive(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        request: &ApplyRequest,
        run: &mut RunLog,
    ) -> Result<(), EngineError> {
        // Open
        run.info(format!("Navigating to {}", request.target_url));
        let navigation = self.timeouts.navigation;
        match timeout(navigation, session.goto(&request.target_url, navigation)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Navigation(e)),
            Err(_) => {
                return Err(EngineError::Navigation(SessionError::NavigationTimeout {
                    url: request.target_url.clone(),
                    timeout: navigation,
                }))
            }
        }
        sleep(self.timeouts.settle).await;

        if adapter.requires_manual_review {
            return self.drive_unconfirmed(adapter, session, request, run).await;
        }

        run.info(format!("Detected {} - starting application", adapter.name));

        // Locate-Entry
        if !adapter.entry.is_empty() {
            match self.wait_visible(session, adapter.entry, self.timeouts.entry).await? {
                Some((locator, handle)) => {
                    session.click(&handle).await?;
                    run.info(format!("Clicked {locator}"));
                    sleep(self.timeouts.settle).await;
                }
                None => {
                    return Err(EngineError::ElementNotFound {
                        control: "entry",
                        tried: describe(adapter.entry),
                    })
                }
            }
        }

        self.fill_fields(adapter, session, request, run).await;
        self.attach_resume(adapter, session, request, run).await;

        if adapter.multi_step {
            self.advance(adapter, session, run).await?;
        }

        // Submit
        match self.wait_visible(session, adapter.submit, self.timeouts.submit).await? {
            Some((_, handle)) => {
                // Capture before clicking; the click may navigate away.
                run.screenshot_ref = self.capture(session, run).await;
                session.click(&handle).await?;
                run.info("Submitted application");
                sleep(self.timeouts.settle).await;
                Ok(())
            }
            None => Err(EngineError::ElementNotFound {
                control: "submit",
                tried: describe(adapter.submit),
            }),
        }
    }

    /// Fallback flow for pages nothing is known about: fill what can be
    /// found, keep evidence, and leave confirmation to a human.
    async fn drive_unconfirmed(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        request: &ApplyRequest,
        run: &mut RunLog,
    ) -> Result<(), EngineError> {
        run.info("Using generic application approach");
        self.fill_fields(adapter, session, request, run).await;
        self.attach_resume(adapter, session, request, run).await;
        run.screenshot_ref = self.capture(session, run).await;
        run.info("Generic application completed (manual verification needed)");
        Ok(())
    }

    /// Best-effort: a field with no visible candidate is skipped.
    async fn fill_fields(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        request: &ApplyRequest,
        run: &mut RunLog,
    ) {
        for spec in adapter.fields {
            let label = spec.field.label();
            let value = profile_value(&request.profile, spec.field);
            if value.trim().is_empty() {
                run.info(format!("Skipped {label}: no value in profile"));
                continue;
            }
            self.fill_one(session, label, spec.candidates, value, run).await;
        }

        if let Some(letter) = request.cover_letter.as_deref().filter(|l| !l.trim().is_empty()) {
            self.fill_one(session, "cover letter", adapter.cover_letter, letter, run)
                .await;
        }
    }

    async fn fill_one(
        &self,
        session: &mut dyn BrowserSession,
        label: &str,
        candidates: &[Locator],
        value: &str,
        run: &mut RunLog,
    ) {
        match self.wait_visible(session, candidates, self.timeouts.field).await {
            Ok(Some((locator, handle))) => match session.fill(&handle, value).await {
                Ok(()) => run.info(format!("Filled {label} ({locator})")),
                Err(e) => run.info(format!("Could not fill {label} ({locator}): {e}")),
            },
            Ok(None) => run.info(format!("No visible {label} field, skipped")),
            Err(e) => run.info(format!("Lookup of {label} field failed, skipped: {e}")),
        }
    }

    async fn attach_resume(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        request: &ApplyRequest,
        run: &mut RunLog,
    ) {
        let Some(path) = request.resume_path.as_deref() else {
            return;
        };

        match self.wait_visible(session, adapter.file_input, self.timeouts.upload).await {
            Ok(Some((_, handle))) => match session.attach_file(&handle, path).await {
                Ok(()) => {
                    run.info("Uploaded resume");
                    sleep(self.timeouts.upload_settle).await;
                }
                Err(e) => run.error(format!("Resume upload failed: {e}")),
            },
            Ok(None) => run.info("No visible resume upload field, skipped"),
            Err(e) => run.error(format!("Resume upload field lookup failed: {e}")),
        }
    }

    async fn advance(
        &self,
        adapter: &SiteAdapter,
        session: &mut dyn BrowserSession,
        run: &mut RunLog,
    ) -> Result<(), EngineError> {
        for step in 1..=MAX_ADVANCE_STEPS {
            let Some((locator, handle)) = self
                .wait_visible(session, adapter.continue_controls, self.timeouts.step)
                .await?
            else {
                break;
            };
            session.click(&handle).await?;
            run.info(format!("Clicked {locator} (step {step})"));
            sleep(self.timeouts.settle).await;
        }
        Ok(())
    }

    /// Poll the candidates in order until one is visible or `bound` elapses.
    /// At least one lookup round always runs.
    async fn wait_visible(
        &self,
        session: &mut dyn BrowserSession,
        candidates: &[Locator],
        bound: Duration,
    ) -> Result<Option<(Locator, ElementHandle)>, EngineError> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let deadline = Instant::now() + bound;
        loop {
            for locator in candidates {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match timeout(remaining, session.find_visible(locator)).await {
                    Ok(Ok(Some(handle))) => return Ok(Some((*locator, handle))),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Ok(None),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.timeouts.poll_interval.min(deadline - now)).await;
        }
    }

    async fn capture(&self, session: &mut dyn BrowserSession, run: &mut RunLog) -> Option<String> {
        let png = match timeout(self.timeouts.screenshot, session.screenshot()).await {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Screenshot capture failed");
                run.info(format!("Screenshot unavailable: {e}"));
                return None;
            }
            Err(_) => {
                run.info("Screenshot unavailable: capture timed out");
                return None;
            }
        };

        match self.screenshots.save(&png).await {
            Ok(reference) => {
                run.info(format!("Saved screenshot {reference}"));
                Some(reference)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Screenshot could not be written");
                run.info(format!("Screenshot unavailable: {e}"));
                None
            }
        }
    }
}

fn profile_value(profile: &ApplicantProfile, field: ProfileField) -> &str {
    match field {
        ProfileField::FirstName => &profile.first_name,
        ProfileField::LastName => &profile.last_name,
        ProfileField::Email => &profile.email,
        ProfileField::Phone => &profile.phone,
    }
}

fn describe(locators: &[Locator]) -> String {
    locators
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
