//! Id-based clone-chain queries for the volumes served from the configured pool.

use crate::chain::{Coordinate, LineageTree};
use crate::classify::{classify_snapshot, classify_volume, Classification, Role};
use crate::config::ClonechainConfig;
use crate::error::ClonechainResult;
use crate::lineage::{LineageResolver, LogObserver, Lookup, TraversalObserver};
use crate::provider::MetadataProvider;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A clone listed under a snapshot, with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChild {
    pub pool_name: String,
    pub volume_name: String,
    #[serde(flatten)]
    pub classification: Classification,
}

/// Answers clone-chain and listing queries against one provider.
pub struct ClonechainService<P: MetadataProvider> {
    config: Arc<ClonechainConfig>,
    provider: P,
}

impl<P: MetadataProvider> ClonechainService<P> {
    pub fn new(config: Arc<ClonechainConfig>, provider: P) -> Self {
        Self { config, provider }
    }

    /// Backend location of the volume with id `volume_id`.
    pub fn volume_location(&self, volume_id: &str) -> Coordinate {
        Coordinate::volume(self.config.pool(), self.config.naming.volume_name(volume_id))
    }

    /// Backend location of snapshot `snapshot_id` of volume `volume_id`.
    pub fn snapshot_location(&self, volume_id: &str, snapshot_id: &str) -> Coordinate {
        self.volume_location(volume_id)
            .snapshot_of(self.config.naming.snapshot_name(snapshot_id))
    }

    /// Clone chain of the volume with id `volume_id`.
    pub fn volume_clone_chain(&self, volume_id: &str) -> ClonechainResult<LineageTree> {
        let location = self.volume_location(volume_id);
        self.resolver_with(&LogObserver).resolve_volume_chain(&location)
    }

    /// Clone chain of snapshot `snapshot_id` taken from volume `volume_id`.
    pub fn snapshot_clone_chain(
        &self,
        volume_id: &str,
        snapshot_id: &str,
    ) -> ClonechainResult<LineageTree> {
        let location = self.snapshot_location(volume_id, snapshot_id);
        self.resolver_with(&LogObserver)
            .resolve_snapshot_chain(&location)
    }

    /// Clone chain of an arbitrary backend location.
    pub fn clone_chain(&self, location: &Coordinate) -> ClonechainResult<LineageTree> {
        self.clone_chain_observed(location, &LogObserver)
    }

    /// Clone chain of `location`, reporting absorbed failures to `observer`.
    pub fn clone_chain_observed<O: TraversalObserver + ?Sized>(
        &self,
        location: &Coordinate,
        observer: &O,
    ) -> ClonechainResult<LineageTree> {
        self.resolver_with(observer).resolve(location)
    }

    /// Classify every snapshot of volume `volume_id`.
    ///
    /// A vanished volume or unreachable pool yields an empty list.
    pub fn volume_snapshots(&self, volume_id: &str) -> ClonechainResult<Vec<Classification>> {
        let location = self.volume_location(volume_id);
        let names = match self.provider.list_snapshots(&location.pool, &location.image) {
            Ok(names) => names,
            Err(err) if err.is_absorbable() => {
                LogObserver.absorbed(&location, Lookup::Snapshots, &err);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let snapshots: Vec<Classification> =
            names.iter().map(|name| listed_snapshot(name)).collect();
        debug!("snapshots of {location}: {snapshots:?}");
        Ok(snapshots)
    }

    /// List the clones of snapshot `snapshot_id` of volume `volume_id`.
    ///
    /// A vanished snapshot or unreachable pool yields an empty list; malformed
    /// entries are skipped.
    pub fn snapshot_children(
        &self,
        volume_id: &str,
        snapshot_id: &str,
    ) -> ClonechainResult<Vec<SnapshotChild>> {
        let location = self.snapshot_location(volume_id, snapshot_id);
        let snapshot = location.object_name();
        let listing = match self
            .provider
            .list_clones(&location.pool, &location.image, snapshot)
        {
            Ok(listing) => listing,
            Err(err) if err.is_absorbable() => {
                LogObserver.absorbed(&location, Lookup::Clones, &err);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let mut children = Vec::with_capacity(listing.len());
        for entry in listing {
            match entry {
                Ok(image) => children.push(SnapshotChild {
                    classification: listed_clone(&image.image),
                    pool_name: image.pool,
                    volume_name: image.image,
                }),
                Err(err) => LogObserver.skipped(&location, &err),
            }
        }
        debug!("children of {location}: {children:?}");
        Ok(children)
    }

    fn resolver_with<'s, O: TraversalObserver + ?Sized>(
        &'s self,
        observer: &'s O,
    ) -> LineageResolver<'s, P, O> {
        LineageResolver::new(&self.provider, observer)
    }
}

/// Listings only report the roles the volume API exposes: image-import
/// snapshots and instance disks show up unclassified.
fn listed_snapshot(name: &str) -> Classification {
    match classify_snapshot(name) {
        c if c.role == Role::ImageSnap => Classification::default(),
        c => c,
    }
}

fn listed_clone(name: &str) -> Classification {
    match classify_volume(name) {
        c if c.role == Role::Vm => Classification::default(),
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use crate::error::ClonechainError;
    use crate::provider::{CloneListing, ImageRef};
    use serde_json::json;

    /// volume-1 has snapshot-2 and backup.1.snap.9; snapshot-2 has two clones
    /// and one malformed entry. Anything else is missing.
    struct FixedProvider;

    impl MetadataProvider for FixedProvider {
        fn list_snapshots(&self, pool: &str, image: &str) -> ClonechainResult<Vec<String>> {
            match (pool, image) {
                ("volumes", "volume-1") => {
                    Ok(vec!["snapshot-2".into(), "backup.1.snap.9".into()])
                }
                ("volumes", "volume-3") | ("volumes", "abc_disk") => Ok(Vec::new()),
                ("volumes", "volume-7") => Ok(vec!["snap".into(), "snapshot-8".into()]),
                _ => Err(not_found(pool, image)),
            }
        }

        fn list_clones(
            &self,
            pool: &str,
            image: &str,
            snapshot: &str,
        ) -> ClonechainResult<CloneListing> {
            match (pool, image, snapshot) {
                ("volumes", "volume-1", "snapshot-2") => Ok(vec![
                    Ok(ImageRef::new("volumes", "volume-3")),
                    Err(ClonechainError::MalformedResponse("[\"volumes\"]".into())),
                    Ok(ImageRef::new("volumes", "abc_disk")),
                ]),
                _ => Err(not_found(pool, image)),
            }
        }

        fn parent(&self, pool: &str, image: &str) -> ClonechainResult<Option<Coordinate>> {
            match image {
                "volume-3" | "abc_disk" => {
                    Ok(Some(Coordinate::snapshot(pool, "volume-1", "snapshot-2")))
                }
                _ => Ok(None),
            }
        }
    }

    fn not_found(pool: &str, image: &str) -> ClonechainError {
        ClonechainError::ObjectNotFound {
            object: format!("{pool}/{image}"),
            reason: "No such file or directory".into(),
        }
    }

    fn service() -> ClonechainService<FixedProvider> {
        let cfg = ClonechainConfig::parse("[backend]\npool = \"volumes\"\n", ConfigFormat::Toml)
            .unwrap();
        ClonechainService::new(Arc::new(cfg), FixedProvider)
    }

    #[test]
    fn locations_follow_name_templates() {
        let svc = service();
        assert_eq!(svc.volume_location("1").to_string(), "volumes/volume-1");
        assert_eq!(
            svc.snapshot_location("1", "2").to_string(),
            "volumes/volume-1@snapshot-2"
        );
    }

    #[test]
    fn volume_and_snapshot_chains_share_a_root() {
        let svc = service();
        let from_volume = svc.volume_clone_chain("1").unwrap();
        let from_snapshot = svc.snapshot_clone_chain("1", "2").unwrap();
        let from_clone = svc
            .clone_chain(&Coordinate::volume("volumes", "volume-3"))
            .unwrap();

        assert_eq!(from_volume.coordinate, svc.volume_location("1"));
        assert_eq!(from_volume.node_count(), 5);
        // ancestor linking only carries the queried branch
        assert_eq!(from_snapshot.coordinate, svc.volume_location("1"));
        assert_eq!(from_snapshot.node_count(), 4);
        assert_eq!(from_snapshot.children[0], from_volume.children[0]);
        assert_eq!(from_clone.node_count(), 3);
        assert_eq!(from_clone.coordinate, svc.volume_location("1"));
    }

    #[test]
    fn missing_volume_chain_is_not_found() {
        let err = service().volume_clone_chain("404").unwrap_err();
        assert!(matches!(err, ClonechainError::ObjectNotFound { .. }));
    }

    #[test]
    fn volume_snapshots_are_classified() {
        let snapshots = service().volume_snapshots("1").unwrap();
        assert_eq!(
            serde_json::to_value(&snapshots).unwrap(),
            json!([
                {"type": "volume_snap", "uuid": "2"},
                {"type": "backup_snap", "uuid": "1"}
            ])
        );
    }

    #[test]
    fn image_import_snapshots_are_listed_unclassified() {
        let snapshots = service().volume_snapshots("7").unwrap();
        assert_eq!(
            serde_json::to_value(&snapshots).unwrap(),
            json!([
                {"type": "", "uuid": ""},
                {"type": "volume_snap", "uuid": "8"}
            ])
        );
    }

    #[test]
    fn chain_nodes_keep_the_full_classification() {
        let chain = service().volume_clone_chain("1").unwrap();
        let disk = chain
            .find(&Coordinate::volume("volumes", "abc_disk"))
            .unwrap();
        assert_eq!(disk.role, Role::Vm);
    }

    #[test]
    fn volume_snapshots_of_missing_volume_is_empty() {
        assert!(service().volume_snapshots("404").unwrap().is_empty());
    }

    #[test]
    fn snapshot_children_skip_malformed_entries() {
        let children = service().snapshot_children("1", "2").unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].classification.role, Role::Volume);
        assert_eq!(children[0].classification.uuid, "3");
        assert_eq!(children[1].volume_name, "abc_disk");
        assert_eq!(children[1].classification, Classification::default());
        assert_eq!(
            serde_json::to_value(&children[0]).unwrap(),
            json!({
                "pool_name": "volumes",
                "volume_name": "volume-3",
                "type": "volume",
                "uuid": "3"
            })
        );
    }

    #[test]
    fn snapshot_children_of_missing_snapshot_is_empty() {
        assert!(service().snapshot_children("1", "404").unwrap().is_empty());
    }
}
