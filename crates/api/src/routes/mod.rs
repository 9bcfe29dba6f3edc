pub mod cache_stats;
pub mod chains;
pub mod history;
