//! Job application automation worker
//!
//! This library provides the task pipeline behind autoapply: durable task
//! submission, per-kind Redis queues drained by bounded worker pools, a
//! browser interaction engine driven by per-site adapters, job posting
//! extraction, interview question generation and status reporting.

pub mod app_state;
pub mod automation;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
