//! Browser-driven application automation.
//!
//! A [`dispatcher::Dispatcher`] picks the [`adapter::SiteAdapter`] for a job
//! URL, and the [`engine::InteractionEngine`] walks a [`session::BrowserSession`]
//! through that adapter's locators.

pub mod adapter;
pub mod chromium;
pub mod dispatcher;
pub mod engine;
pub mod locator;
pub mod screenshot;
pub mod session;

pub use adapter::{Platform, SiteAdapter};
pub use dispatcher::{dispatch, Dispatcher};
pub use engine::{ApplyRequest, EngineTimeouts, InteractionEngine};
pub use locator::{ElementHandle, Locator};
pub use screenshot::ScreenshotStore;
pub use session::{BrowserSession, SessionError, SessionFactory, SessionGuard};
