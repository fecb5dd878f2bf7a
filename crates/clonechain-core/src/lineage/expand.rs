//! Downward pass: everything derived from a coordinate.

use super::{LineageResolver, Lookup, TraversalObserver};
use crate::chain::{ChainNode, Coordinate};
use crate::error::{ClonechainError, ClonechainResult};
use crate::provider::MetadataProvider;

impl<'a, P, O> LineageResolver<'a, P, O>
where
    P: MetadataProvider + ?Sized,
    O: TraversalObserver + ?Sized,
{
    /// Build the node for `coordinate` with its full descendant subtree.
    ///
    /// A volume's children are its snapshots; a snapshot's children are the
    /// images cloned from it. Not-found and unreachable-pool errors leave the
    /// affected node childless, as does a listing that cannot be decoded;
    /// other backend errors fail the expansion.
    pub fn expand(&self, coordinate: &Coordinate) -> ClonechainResult<ChainNode> {
        let children = match self.child_coordinates(coordinate) {
            Ok(children) => children,
            Err(err) if err.is_absorbable() => {
                self.observer.absorbed(coordinate, lookup_for(coordinate), &err);
                Vec::new()
            }
            Err(err @ ClonechainError::MalformedResponse(_)) => {
                self.observer.skipped(coordinate, &err);
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        self.expand_with(coordinate, children)
    }

    /// Build the node for `coordinate` from already-listed child coordinates.
    pub(super) fn expand_with(
        &self,
        coordinate: &Coordinate,
        children: Vec<Coordinate>,
    ) -> ClonechainResult<ChainNode> {
        let children = children
            .iter()
            .map(|child| self.expand(child))
            .collect::<ClonechainResult<Vec<_>>>()?;
        Ok(ChainNode::with_children(coordinate.clone(), children))
    }

    /// Run the one metadata query that lists the direct children of `coordinate`.
    pub(super) fn child_coordinates(
        &self,
        coordinate: &Coordinate,
    ) -> ClonechainResult<Vec<Coordinate>> {
        match &coordinate.snapshot {
            None => {
                let names = self
                    .provider
                    .list_snapshots(&coordinate.pool, &coordinate.image)?;
                Ok(names
                    .into_iter()
                    .map(|name| coordinate.snapshot_of(name))
                    .collect())
            }
            Some(snapshot) => {
                let listing =
                    self.provider
                        .list_clones(&coordinate.pool, &coordinate.image, snapshot)?;
                let mut clones = Vec::with_capacity(listing.len());
                for entry in listing {
                    match entry {
                        Ok(image) => clones.push(image.coordinate()),
                        Err(err) => self.observer.skipped(coordinate, &err),
                    }
                }
                Ok(clones)
            }
        }
    }
}

fn lookup_for(coordinate: &Coordinate) -> Lookup {
    if coordinate.is_snapshot() {
        Lookup::Clones
    } else {
        Lookup::Snapshots
    }
}
