//! Shared TTL store.
//!
//! Three kinds of short-lived rows live here, all keyed and all expiring:
//! - **Content cache**: serialized scraper results, so a title isn't
//!   scraped again for a while.
//! - **Dead links**: links a provider said are gone for good, so nobody
//!   asks it again until the mark expires.
//! - **Scrape locks**: at most one instance scrapes a given title at a
//!   time, across every process pointed at the same database.
//!
//! Nothing deletes rows except lock release and the periodic [`Sweeper`].

mod content;
mod db;
mod dead_links;
pub mod error;
mod key;
mod lock;
mod sweep;

pub use crate::content::{ContentCache, DEFAULT_CONTENT_TTL};
pub use crate::db::Database;
pub use crate::dead_links::{DEFAULT_DEAD_LINK_TTL, DeadLinks};
pub use crate::key::cache_key;
pub use crate::lock::{
    DEFAULT_LOCK_TTL, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, LockGuard, LockState, SearchLock,
};
pub use crate::sweep::{DEFAULT_SWEEP_INTERVAL, SweepReport, Sweeper};
