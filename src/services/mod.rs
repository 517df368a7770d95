pub mod content;
pub mod extraction;
pub mod handlers;
pub mod notifier;
pub mod pool;
pub mod queue;
pub mod reporter;
pub mod submitter;
