//! # Assist Stream
//!
//! Client-side reconstruction of an assistant's answer from a server-sent
//! event stream.
//!
//! ## Overview
//!
//! An upstream assistant answers one request with a long-lived
//! `text/event-stream` body. Events arrive as token deltas, lifecycle
//! progress reports, and final-response fragments that may be re-delivered,
//! arrive out of order, or be replaced by an atomic final value. This crate
//! turns that stream into a single coherent answer:
//!
//! - Incremental SSE framing that survives arbitrary chunk boundaries
//! - A byte-stream tee feeding the primary consumer and a diagnostics mirror
//! - Event classification with per-session de-duplication
//! - Per-stream-id fragment reassembly
//! - A session controller with single-flight admission and cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use assist_stream::client::HttpTransport;
//! use assist_stream::config::AssistConfig;
//! use assist_stream::session::SessionController;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AssistConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(config.upstream.clone())?);
//! let controller = SessionController::new(transport, config.session.clone());
//!
//! controller.send("What moved the markets today?").await;
//! println!("{}", controller.answer().unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`streaming`] - Frame parser, tee, interpreter and reassembler
//! - [`session`] - Session controller and single-flight coordination
//! - [`transport`] - Upstream transport trait
//! - [`client`] - HTTP transport
//! - [`relay`] - Pass-through HTTP relay with diagnostics
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types and handling

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod models;
pub mod relay;
pub mod session;
pub mod streaming;
pub mod transport;

pub use config::AssistConfig;
pub use error::{AssistError, Result};
