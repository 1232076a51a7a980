//! Domain model shared by every debrix crate: link candidates as scrapers
//! produce them, how mirrors of the same release are grouped, and how
//! releases are ranked against each other.

mod candidate;
pub mod error;
mod lang;
mod media;
mod quality;
mod size;

pub use crate::candidate::{Group, GroupKey, LinkCandidate, LinkKind, dedupe_and_rank, group_by};
pub use crate::lang::Language;
pub use crate::media::{Category, ContentId, ContentQuery, Metadata};
pub use crate::quality::{QualityRank, ReleaseType, Resolution, normalize_quality};
pub use crate::size::parse_size_gb;
