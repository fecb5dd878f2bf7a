//! Value types for clone-chain queries: where an object lives and how the
//! reconstructed lineage is shaped on the wire.

use crate::classify::{classify, Role};
use crate::error::ClonechainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one backend object: a live image, or one of its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "pool_name")]
    pub pool: String,

    #[serde(rename = "volume_name")]
    pub image: String,

    #[serde(
        rename = "snap_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot: Option<String>,
}

impl Coordinate {
    /// Coordinate of a live image.
    pub fn volume(pool: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            image: image.into(),
            snapshot: None,
        }
    }

    /// Coordinate of a snapshot of `image`.
    pub fn snapshot(
        pool: impl Into<String>,
        image: impl Into<String>,
        snapshot: impl Into<String>,
    ) -> Self {
        Self {
            pool: pool.into(),
            image: image.into(),
            snapshot: Some(snapshot.into()),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_snapshot() {
            NodeKind::Snapshot
        } else {
            NodeKind::Volume
        }
    }

    /// The name the classifier looks at: the snapshot name, or the image name.
    pub fn object_name(&self) -> &str {
        self.snapshot.as_deref().unwrap_or(&self.image)
    }

    /// The live image this coordinate belongs to.
    pub fn owning_volume(&self) -> Coordinate {
        Coordinate::volume(self.pool.clone(), self.image.clone())
    }

    /// A snapshot named `name` on this coordinate's image.
    pub fn snapshot_of(&self, name: impl Into<String>) -> Coordinate {
        Coordinate::snapshot(self.pool.clone(), self.image.clone(), name)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.snapshot {
            Some(snap) => write!(f, "{}/{}@{}", self.pool, self.image, snap),
            None => write!(f, "{}/{}", self.pool, self.image),
        }
    }
}

impl FromStr for Coordinate {
    type Err = ClonechainError;

    /// Parse the `pool/image[@snap]` notation used by the `rbd` CLI.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ClonechainError::InvalidCoordinate(value.to_string());
        let trimmed = value.trim();
        let (pool, rest) = trimmed.split_once('/').ok_or_else(invalid)?;
        let (image, snapshot) = match rest.split_once('@') {
            Some((image, snap)) => (image, Some(snap)),
            None => (rest, None),
        };

        if pool.is_empty() || image.is_empty() || image.contains('/') {
            return Err(invalid());
        }
        match snapshot {
            Some(snap) if snap.is_empty() || snap.contains('@') => Err(invalid()),
            Some(snap) => Ok(Coordinate::snapshot(pool, image, snap)),
            None => Ok(Coordinate::volume(pool, image)),
        }
    }
}

/// Whether a chain node is a live image or a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Volume,
    Snapshot,
}

/// One object in a reconstructed clone chain.
///
/// Serializes as `{type, location, usage, children}`, the nested shape
/// presentation layers render directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,

    #[serde(rename = "location")]
    pub coordinate: Coordinate,

    #[serde(rename = "usage")]
    pub role: Role,

    #[serde(default)]
    pub children: Vec<ChainNode>,
}

/// Root of a fully reconstructed chain; the root has no parent in the backend.
pub type LineageTree = ChainNode;

impl ChainNode {
    /// Build a childless node, classifying it from its name.
    pub fn new(coordinate: Coordinate) -> Self {
        Self::with_children(coordinate, Vec::new())
    }

    /// Build a node with the given children, classifying it from its name.
    pub fn with_children(coordinate: Coordinate, children: Vec<ChainNode>) -> Self {
        let role = classify(coordinate.object_name(), coordinate.is_snapshot()).role;
        Self {
            kind: coordinate.kind(),
            coordinate,
            role,
            children,
        }
    }

    /// First node (pre-order) whose coordinate equals `coordinate`.
    pub fn find(&self, coordinate: &Coordinate) -> Option<&ChainNode> {
        if &self.coordinate == coordinate {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(coordinate))
    }

    /// How many nodes in this subtree carry `coordinate`.
    pub fn occurrences(&self, coordinate: &Coordinate) -> usize {
        let own = usize::from(&self.coordinate == coordinate);
        own + self
            .children
            .iter()
            .map(|child| child.occurrences(coordinate))
            .sum::<usize>()
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ChainNode::node_count).sum::<usize>()
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(ChainNode::depth).max().unwrap_or(0)
    }
}
