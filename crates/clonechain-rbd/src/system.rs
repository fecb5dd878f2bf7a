//! `MetadataProvider` backed by the Ceph `rbd` CLI. Each query is one `rbd`
//! invocation with JSON output; failures are sorted into "object gone",
//! "pool unreachable" and everything else.

use crate::command::{CommandRunner, Outcome, Output};
use crate::parse::{classify_failure, parse_children, parse_parent, parse_snapshot_names, Failure};
use clonechain_core::chain::Coordinate;
use clonechain_core::config::ClonechainConfig;
use clonechain_core::error::{ClonechainError, ClonechainResult};
use clonechain_core::provider::{CloneListing, MetadataProvider};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default locations probed for an `rbd` binary.
pub const DEFAULT_RBD_PATHS: &[&str] = &[
    "/usr/bin/rbd",
    "/bin/rbd",
    "/usr/local/bin/rbd",
    "/usr/sbin/rbd",
];

/// Cluster connection flags passed to every `rbd` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub user: Option<String>,
    pub conf: Option<String>,
    pub cluster: Option<String>,
}

impl ConnectionOptions {
    pub fn from_config(config: &ClonechainConfig) -> Self {
        Self {
            user: config.backend.rbd_user.clone(),
            conf: config.backend.ceph_conf.clone(),
            cluster: config.backend.cluster_name.clone(),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in [
            ("--id", &self.user),
            ("--conf", &self.conf),
            ("--cluster", &self.cluster),
        ] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }
}

/// Metadata provider that shells out to `rbd`.
#[derive(Debug, Clone)]
pub struct SystemRbdProvider {
    runner: CommandRunner,
    connection: ConnectionOptions,
}

impl SystemRbdProvider {
    /// Build a provider from configuration, discovering `rbd` when no path is set.
    pub fn from_config(config: &ClonechainConfig) -> ClonechainResult<Self> {
        let timeout = config.command_timeout();
        let runner = match config.rbd_binary_path() {
            Some(path) => Self::runner_with_path(path, timeout)?,
            None => Self::discover_rbd(timeout)?,
        };
        Ok(Self {
            runner,
            connection: ConnectionOptions::from_config(config),
        })
    }

    /// Provider for an explicit `rbd` binary with default connection flags.
    pub fn with_path(path: PathBuf, timeout: Duration) -> ClonechainResult<Self> {
        Ok(Self {
            runner: Self::runner_with_path(path, timeout)?,
            connection: ConnectionOptions::default(),
        })
    }

    pub fn binary(&self) -> &Path {
        self.runner.binary()
    }

    fn runner_with_path(path: PathBuf, timeout: Duration) -> ClonechainResult<CommandRunner> {
        if !path.exists() {
            return Err(ClonechainError::InvalidConfig(format!(
                "rbd binary not found at {}",
                path.display()
            )));
        }
        Ok(CommandRunner::new(path, timeout))
    }

    fn discover_rbd(timeout: Duration) -> ClonechainResult<CommandRunner> {
        DEFAULT_RBD_PATHS
            .iter()
            .map(Path::new)
            .find(|candidate| candidate.exists())
            .map(|found| CommandRunner::new(found.to_path_buf(), timeout))
            .ok_or_else(|| {
                ClonechainError::InvalidConfig(format!(
                    "unable to locate rbd binary; tried {:?}",
                    DEFAULT_RBD_PATHS
                ))
            })
    }

    /// Run an `rbd` query about `target` and map non-zero exits onto errors.
    ///
    /// A call that hangs past the deadline means the pool is not answering.
    fn query(&self, command: &[&str], target: &Coordinate) -> ClonechainResult<Output> {
        let mut args = self.connection.args();
        args.extend(command.iter().map(|arg| arg.to_string()));
        args.push("--format".to_string());
        args.push("json".to_string());
        args.push(target.to_string());

        debug!("running {} {}", self.runner.binary().display(), args.join(" "));
        let out = match self.runner.run(&args)? {
            Outcome::Exited(out) => out,
            Outcome::TimedOut(after) => {
                return Err(ClonechainError::BackendUnreachable {
                    pool: target.pool.clone(),
                    reason: format!(
                        "{} {} timed out after {after:?}",
                        self.runner.binary().display(),
                        args.join(" ")
                    ),
                })
            }
        };
        if !out.success() {
            return Err(self.classify_cli_error(&args, target, &out));
        }
        Ok(out)
    }

    fn classify_cli_error(&self, args: &[String], target: &Coordinate, out: &Output) -> ClonechainError {
        let diagnostic = out.diagnostic();
        match classify_failure(diagnostic) {
            Failure::NotFound => ClonechainError::ObjectNotFound {
                object: target.to_string(),
                reason: diagnostic.to_string(),
            },
            Failure::Unreachable => ClonechainError::BackendUnreachable {
                pool: target.pool.clone(),
                reason: diagnostic.to_string(),
            },
            Failure::Other => ClonechainError::Provider(format!(
                "{} {} exited with code {}: {}",
                self.runner.binary().display(),
                args.join(" "),
                out.status,
                if diagnostic.is_empty() {
                    "no additional output"
                } else {
                    diagnostic
                }
            )),
        }
    }
}

impl MetadataProvider for SystemRbdProvider {
    fn list_snapshots(&self, pool: &str, image: &str) -> ClonechainResult<Vec<String>> {
        let out = self.query(&["snap", "ls"], &Coordinate::volume(pool, image))?;
        parse_snapshot_names(&out.stdout)
    }

    fn list_clones(
        &self,
        pool: &str,
        image: &str,
        snapshot: &str,
    ) -> ClonechainResult<CloneListing> {
        let out = self.query(&["children"], &Coordinate::snapshot(pool, image, snapshot))?;
        parse_children(&out.stdout)
    }

    fn parent(&self, pool: &str, image: &str) -> ClonechainResult<Option<Coordinate>> {
        let out = self.query(&["info"], &Coordinate::volume(pool, image))?;
        parse_parent(&out.stdout)
    }
}
