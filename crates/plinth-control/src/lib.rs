//! Control plane for the plinth deployment platform.
//!
//! This crate provides:
//! - The deployment orchestrator: validate a deploy request, persist a
//!   QUEUED deployment and dispatch one ephemeral build runner
//! - The log pipeline consumer: drive the deployment state machine from
//!   sentinel log lines and persist every build-log line
//! - The control-plane HTTP API with bearer-token auth and per-caller
//!   rate limiting
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   POST /deploy   ┌──────────────┐   launch   ┌────────────┐
//! │  HTTP API    │─────────────────▶│ Orchestrator │───────────▶│ Dispatcher │
//! └──────────────┘                  └──────────────┘            └────────────┘
//!        │ reads                           │ QUEUED row
//!        ▼                                 ▼
//! ┌─────────────────────────────────────────────────┐
//! │                 Control store                   │
//! └─────────────────────────────────────────────────┘
//!        ▲ status transitions + log lines
//! ┌──────────────┐    build-log topic
//! │ Log consumer │◀───────────────────  message bus
//! └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod orchestrator;
pub mod service;
pub mod store;

pub use config::ControlConfig;
pub use error::{ControlError, ControlResult};
pub use orchestrator::Orchestrator;
pub use service::ControlService;
