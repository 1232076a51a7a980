//! Aggregation of scraping sources and debrid providers.
//!
//! An [`Aggregator`] answers "what can I play for this title?": it looks the
//! title up, searches every useful source through the shared cache, filters
//! and ranks the results, asks each of the user's providers which links are
//! instantly available, and formats what's left as [`Stream`]s. A
//! [`Resolver`] later turns a deferred link into a direct one.

mod aggregator;
pub mod error;
pub mod filter;
mod format;
mod metadata;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod resolve;
mod source;

pub use crate::aggregator::{Aggregator, DEFAULT_ADDON_NAME};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::format::{Stream, StreamFormatter};
pub use crate::metadata::{MetadataHandle, MetadataResolver};
pub use crate::resolve::{DEFAULT_RESOLVE_TIMEOUT, Resolver};
pub use crate::source::{CachedSource, Source, SourceHandle};
