//! # Rabbit Core
//!
//! Request coalescing and batch dispatch for the Rabbit Nostr client.
//!
//! Many parts of the UI ask for small pieces of relay data at the same time:
//! a profile here, a reaction count there, a referenced note somewhere else.
//! This crate collects those requests into short windows, merges each window
//! into a single relay subscription, and routes every inbound event back to
//! the requests it satisfies.
//!
//! ## Architecture
//!
//! ```text
//!  callers                 BatchScheduler            BatchDispatcher           RelayPool
//! ┌───────────────┐ add   ┌──────────────────┐ seal ┌───────────────────┐ sub  ┌──────────┐
//! │ BatchedEvents │─────► │ window (2s / 150)│────► │ RequestBuilder    │────► │ relays   │
//! │ Task          │◄───┐  └──────────────────┘      │  7 task groups    │◄──── │          │
//! └───────────────┘    └───────── update / complete ┤  resolve(event)   │ evts └──────────┘
//!                                                   └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rabbit_core::{BatchedEventsEngine, BatchedEventsTask, RequestDescriptor};
//!
//! let engine = BatchedEventsEngine::builder()
//!     .relay_url("wss://relay.example.com")
//!     .build(pool)?;
//!
//! let task = Arc::new(BatchedEventsTask::new(RequestDescriptor::Profile {
//!     pubkey: pubkey.into(),
//! }));
//! engine.register_task(Arc::clone(&task), None);
//!
//! let profile = task.latest_event().await?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatcher;
pub mod engine;
mod error;
pub mod event;
pub mod filter;
pub mod pool;
pub mod request;
pub mod scheduler;
pub mod stats;
pub mod task;
pub mod testing;

pub use config::{BatchConfig, EngineConfig};
pub use dispatcher::BatchDispatcher;
pub use engine::{BatchedEventsEngine, EngineBuilder};
pub use error::Error;
pub use event::Event;
pub use filter::Filter;
pub use pool::{RelayMessage, RelayPool, RelaySubscription};
pub use request::{RequestBuilder, TaskGroup};
pub use scheduler::{BatchExecutor, BatchScheduler, FlushReason};
pub use stats::{EngineStats, StatsSnapshot};
pub use task::{BatchedEventsTask, ObservableTask, RequestDescriptor, RequestKind, TaskId, TaskState};

/// Result type for rabbit-core operations.
pub type Result<T> = std::result::Result<T, Error>;
