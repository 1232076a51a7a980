use crate::error::Result;
use async_trait::async_trait;
use debrix_model::{ContentId, Metadata};
use std::sync::Arc;

/// Maps a content id to the title, year and numbering to search for.
///
/// `Ok(None)` means the id is unknown to the service, which is not an
/// error.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, id: &ContentId) -> Result<Option<Metadata>>;
}

pub type MetadataHandle = Arc<dyn MetadataResolver + Send + Sync>;
