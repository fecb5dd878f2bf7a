//! Upward pass: wrap a subtree in every ancestor up to the chain root.

use super::{LineageResolver, Lookup, TraversalObserver};
use crate::chain::{ChainNode, Coordinate, LineageTree};
use crate::error::{ClonechainError, ClonechainResult};
use crate::provider::MetadataProvider;

impl<'a, P, O> LineageResolver<'a, P, O>
where
    P: MetadataProvider + ?Sized,
    O: TraversalObserver + ?Sized,
{
    /// Walk parents upward from `coordinate`, making `subtree` the sole child
    /// of each ancestor in turn, and return the tree rooted at the first
    /// object without a parent.
    ///
    /// A snapshot's parent is the image that owns it; an image's parent comes
    /// from the backend. A parent lookup that hits a not-found or
    /// unreachable-pool error, or whose answer cannot be decoded, ends the
    /// walk at the current node.
    pub fn link_ancestors(
        &self,
        subtree: ChainNode,
        coordinate: &Coordinate,
    ) -> ClonechainResult<LineageTree> {
        let mut tree = subtree;
        let mut at = coordinate.clone();

        loop {
            let parent = if at.is_snapshot() {
                at.owning_volume()
            } else {
                match self.provider.parent(&at.pool, &at.image) {
                    Ok(Some(parent)) => parent,
                    Ok(None) => return Ok(tree),
                    Err(err) if err.is_absorbable() => {
                        self.observer.absorbed(&at, Lookup::Parent, &err);
                        return Ok(tree);
                    }
                    Err(err @ ClonechainError::MalformedResponse(_)) => {
                        self.observer.skipped(&at, &err);
                        return Ok(tree);
                    }
                    Err(err) => return Err(err),
                }
            };

            tree = ChainNode::with_children(parent.clone(), vec![tree]);
            at = parent;
        }
    }
}
