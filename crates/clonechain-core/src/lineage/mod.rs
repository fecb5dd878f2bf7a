//! Clone-chain reconstruction: expand a coordinate's descendants, then wrap
//! its ancestors around that subtree until a parentless root is reached.

mod ancestors;
mod expand;
mod observer;

use crate::chain::{Coordinate, LineageTree, NodeKind};
use crate::error::{ClonechainError, ClonechainResult};
use crate::provider::MetadataProvider;
use log::debug;

pub use observer::{LogObserver, Lookup, TraversalObserver};

/// Resolves clone chains against one metadata provider.
///
/// Every query builds a fresh tree; nothing is cached between calls.
pub struct LineageResolver<'a, P: ?Sized, O: ?Sized> {
    provider: &'a P,
    observer: &'a O,
}

impl<'a, P, O> LineageResolver<'a, P, O>
where
    P: MetadataProvider + ?Sized,
    O: TraversalObserver + ?Sized,
{
    pub fn new(provider: &'a P, observer: &'a O) -> Self {
        Self { provider, observer }
    }

    /// Full clone chain of a live volume.
    pub fn resolve_volume_chain(&self, volume: &Coordinate) -> ClonechainResult<LineageTree> {
        self.ensure_kind(volume, NodeKind::Volume)?;
        self.resolve(volume)
    }

    /// Full clone chain of a snapshot.
    pub fn resolve_snapshot_chain(&self, snapshot: &Coordinate) -> ClonechainResult<LineageTree> {
        self.ensure_kind(snapshot, NodeKind::Snapshot)?;
        self.resolve(snapshot)
    }

    /// Full clone chain of either kind of coordinate.
    ///
    /// The queried object must answer its first lookup: if it is gone (or its
    /// pool cannot be reached) this returns `ObjectNotFound` rather than a
    /// degenerate tree.
    pub fn resolve(&self, coordinate: &Coordinate) -> ClonechainResult<LineageTree> {
        debug!("resolving clone chain of {coordinate}");
        let children = self
            .child_coordinates(coordinate)
            .map_err(|err| match err {
                err if err.is_absorbable() => ClonechainError::ObjectNotFound {
                    object: coordinate.to_string(),
                    reason: err.to_string(),
                },
                err => err,
            })?;
        let subtree = self.expand_with(coordinate, children)?;
        let tree = self.link_ancestors(subtree, coordinate)?;
        debug!(
            "clone chain of {coordinate} rooted at {} ({} nodes)",
            tree.coordinate,
            tree.node_count()
        );
        Ok(tree)
    }

    fn ensure_kind(&self, coordinate: &Coordinate, kind: NodeKind) -> ClonechainResult<()> {
        if coordinate.kind() != kind {
            return Err(ClonechainError::InvalidCoordinate(coordinate.to_string()));
        }
        Ok(())
    }
}
