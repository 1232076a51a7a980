//! Canned sources and metadata for testing.

use crate::error::{ErrorKind, Result};
use crate::metadata::{MetadataHandle, MetadataResolver};
use crate::source::{Source, SourceHandle};
use async_trait::async_trait;
use debrix_model::{ContentId, ContentQuery, LinkCandidate, Metadata};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source returning the same results for every query.
pub struct StaticSource {
    name: String,
    results: Vec<LinkCandidate>,
    failing: bool,
    calls: AtomicUsize,
}
impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), results: Vec::new(), failing: false, calls: AtomicUsize::new(0) }
    }

    pub fn with_result(mut self, candidate: LinkCandidate) -> Self {
        self.results.push(candidate);
        self
    }

    /// Fail every search.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_handle(self) -> SourceHandle {
        Arc::new(self)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &ContentQuery) -> Result<Vec<LinkCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            exn::bail!(ErrorKind::Source(self.name.clone()));
        }
        Ok(self.results.clone())
    }
}

/// Metadata lookup answering from a map keyed on the bare id (`tt…`).
#[derive(Default)]
pub struct StaticMetadata {
    entries: HashMap<String, Metadata>,
}
impl StaticMetadata {
    pub fn with(mut self, id: impl Into<String>, metadata: Metadata) -> Self {
        self.entries.insert(id.into(), metadata);
        self
    }

    pub fn into_handle(self) -> MetadataHandle {
        Arc::new(self)
    }
}

#[async_trait]
impl MetadataResolver for StaticMetadata {
    async fn resolve(&self, id: &ContentId) -> Result<Option<Metadata>> {
        let bare = match id {
            ContentId::Imdb { id, .. } | ContentId::Kitsu { id, .. } => id,
        };
        Ok(self.entries.get(bare).cloned())
    }
}
