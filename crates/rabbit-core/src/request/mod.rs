//! Request merging and event routing.
//!
//! - [`TaskGroup`]: tasks of one kind, indexed by dedup key
//! - [`RequestBuilder`]: the seven groups of one batch

mod builder;
mod group;

pub use builder::RequestBuilder;
pub use group::{KeyStrategy, KeyedRequest, TaskGroup};
