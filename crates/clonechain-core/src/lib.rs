pub mod chain;
pub mod classify;
pub mod config;
pub mod error;
pub mod lineage;
pub mod logging;
pub mod provider;
pub mod service;

pub use chain::{ChainNode, Coordinate, LineageTree, NodeKind};
pub use classify::{classify, Classification, Role};
pub use config::{ClonechainConfig, ConfigFormat};
pub use error::{ClonechainError, ClonechainResult};
pub use lineage::{LineageResolver, LogObserver, Lookup, TraversalObserver};
pub use provider::{CloneListing, ImageRef, MetadataProvider};
pub use service::{ClonechainService, SnapshotChild};
