//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: The phases a page moves through within a crawl job
//! - `PageProgress`: One page's current phase, rejecting invalid transitions

mod crawl_phase;

// Re-export main types
pub use crawl_phase::{CrawlPhase, InvalidTransition, PageProgress};
