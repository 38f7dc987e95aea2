//! Upstream market data.

pub mod feed;
pub mod history;

pub use feed::FeedClient;
pub use history::HistoryClient;
