//! Hooks a traversal calls when it swallows a backend failure.

use crate::chain::Coordinate;
use crate::error::ClonechainError;
use log::{info, warn};
use std::fmt;

/// Which metadata query a traversal step was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Snapshots,
    Clones,
    Parent,
}

impl Lookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Snapshots => "list snapshots",
            Lookup::Clones => "list clones",
            Lookup::Parent => "parent lookup",
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives the failures a traversal absorbs instead of propagating.
pub trait TraversalObserver {
    /// `lookup` on `coordinate` hit a not-found or unreachable-pool error; the
    /// node is treated as having no further lineage.
    fn absorbed(&self, coordinate: &Coordinate, lookup: Lookup, error: &ClonechainError);

    /// Backend output about `coordinate` (a whole listing, a parent record
    /// or a single clone entry) was malformed and skipped.
    fn skipped(&self, coordinate: &Coordinate, error: &ClonechainError);
}

impl<T: TraversalObserver + ?Sized> TraversalObserver for &T {
    fn absorbed(&self, coordinate: &Coordinate, lookup: Lookup, error: &ClonechainError) {
        (**self).absorbed(coordinate, lookup, error)
    }

    fn skipped(&self, coordinate: &Coordinate, error: &ClonechainError) {
        (**self).skipped(coordinate, error)
    }
}

/// Forwards traversal events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl TraversalObserver for LogObserver {
    fn absorbed(&self, coordinate: &Coordinate, lookup: Lookup, error: &ClonechainError) {
        info!("{lookup} for {coordinate} returned nothing: {error}");
    }

    fn skipped(&self, coordinate: &Coordinate, error: &ClonechainError) {
        warn!("skipping malformed backend output for {coordinate}: {error}");
    }
}
