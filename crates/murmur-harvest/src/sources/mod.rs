//! Built-in source adapters.

mod reddit;
mod replay;

pub use reddit::{RedditAdapter, RedditConfig};
pub use replay::{ReplayAdapter, ReplayRecord};
