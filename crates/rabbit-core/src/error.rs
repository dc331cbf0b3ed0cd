//! Error types for rabbit-core.

/// Errors surfaced by the batching engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A request kind tag that names none of the known request kinds.
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    /// A task finished without the event the accessor asked for.
    #[error("event not found")]
    NotFound,

    /// The task's signal channel closed before it resolved.
    #[error("task closed before resolving")]
    TaskClosed,

    /// The relay pool refused to open a subscription.
    #[error("relay pool error: {0}")]
    Pool(String),

    /// The engine was constructed outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}
