use crate::chain::Coordinate;
use crate::error::ClonechainResult;
use serde::{Deserialize, Serialize};

/// A live image referenced by a clone listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub pool: String,
    pub image: String,
}

impl ImageRef {
    pub fn new(pool: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            image: image.into(),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::volume(self.pool.clone(), self.image.clone())
    }
}

/// Clones of one snapshot, in backend order. An entry the backend reported
/// but that could not be read as a `(pool, image)` pair is an `Err` carrying
/// `ClonechainError::MalformedResponse`.
pub type CloneListing = Vec<ClonechainResult<ImageRef>>;

/// Read-only metadata queries a clone-chain traversal needs from a
/// copy-on-write storage backend.
///
/// Implementations report a vanished image/snapshot as
/// `ClonechainError::ObjectNotFound` and a pool they cannot reach as
/// `ClonechainError::BackendUnreachable`. Traversals absorb both as "no
/// further information"; any other error fails the query. Each call owns
/// whatever backend session it needs and releases it before returning.
pub trait MetadataProvider {
    /// Snapshot names of `pool/image`, in backend order.
    fn list_snapshots(&self, pool: &str, image: &str) -> ClonechainResult<Vec<String>>;

    /// Images cloned from `pool/image@snapshot`, in backend order.
    fn list_clones(&self, pool: &str, image: &str, snapshot: &str)
        -> ClonechainResult<CloneListing>;

    /// The snapshot `pool/image` was cloned from, or `None` for an image
    /// with no parent.
    fn parent(&self, pool: &str, image: &str) -> ClonechainResult<Option<Coordinate>>;
}
