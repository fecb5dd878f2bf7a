//! Clonechain command-line interface: clone-chain and listing queries against RBD.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clonechain_core::{
    config::DEFAULT_CONFIG_PATH, logging, ChainNode, ClonechainConfig, ClonechainService,
    Coordinate, Role,
};
use clonechain_rbd::SystemRbdProvider;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "clonechain",
    version,
    about = "Clone lineage queries for Ceph RBD volumes and snapshots."
)]
struct Cli {
    /// Path to the Clonechain configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full clone chain containing a volume.
    VolumeChain {
        volume_id: String,

        /// Print an indented tree instead of JSON.
        #[arg(long)]
        tree: bool,
    },

    /// Full clone chain containing a volume snapshot.
    SnapshotChain {
        volume_id: String,
        snapshot_id: String,

        #[arg(long)]
        tree: bool,
    },

    /// Clone chain of a raw backend location (`pool/image` or `pool/image@snap`).
    Chain {
        location: Coordinate,

        #[arg(long)]
        tree: bool,
    },

    /// Classify the snapshots of a volume.
    Snapshots { volume_id: String },

    /// List the clones of a volume snapshot.
    Children {
        volume_id: String,
        snapshot_id: String,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::VolumeChain { volume_id, tree } => {
            let service = load_service(&cli.config)?;
            let chain = service
                .volume_clone_chain(&volume_id)
                .with_context(|| format!("clone chain of volume {volume_id}"))?;
            print_chain(&chain, tree)?;
        }
        Commands::SnapshotChain {
            volume_id,
            snapshot_id,
            tree,
        } => {
            let service = load_service(&cli.config)?;
            let chain = service
                .snapshot_clone_chain(&volume_id, &snapshot_id)
                .with_context(|| {
                    format!("clone chain of snapshot {snapshot_id} of volume {volume_id}")
                })?;
            print_chain(&chain, tree)?;
        }
        Commands::Chain { location, tree } => {
            let service = load_service(&cli.config)?;
            let chain = service
                .clone_chain(&location)
                .with_context(|| format!("clone chain of {location}"))?;
            print_chain(&chain, tree)?;
        }
        Commands::Snapshots { volume_id } => {
            let service = load_service(&cli.config)?;
            let snapshots = service.volume_snapshots(&volume_id)?;
            println!("{}", to_string_pretty(&snapshots)?);
        }
        Commands::Children {
            volume_id,
            snapshot_id,
        } => {
            let service = load_service(&cli.config)?;
            let children = service.snapshot_children(&volume_id, &snapshot_id)?;
            println!("{}", to_string_pretty(&children)?);
        }
        Commands::Validate { file, schema } => {
            if schema {
                let schema = schema_for!(ClonechainConfig);
                println!("{}", to_string_pretty(&schema)?);
                return Ok(());
            }

            let cfg = load_config(&file)?;
            let issues = cfg.validate();
            if issues.is_empty() {
                println!("Configuration valid (pool {}).", cfg.pool());
            } else {
                eprintln!("Configuration validation failed:");
                for issue in issues {
                    eprintln!("  - {issue}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ClonechainConfig> {
    ClonechainConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn load_service(path: &Path) -> Result<ClonechainService<SystemRbdProvider>> {
    let config = Arc::new(load_config(path)?);
    let provider = SystemRbdProvider::from_config(&config)?;
    Ok(ClonechainService::new(config, provider))
}

fn print_chain(chain: &ChainNode, tree: bool) -> Result<()> {
    if tree {
        print!("{}", render_tree(chain));
    } else {
        println!("{}", to_string_pretty(chain)?);
    }
    Ok(())
}

/// One line per node, children indented two spaces under their parent.
fn render_tree(root: &ChainNode) -> String {
    let mut out = String::new();
    render_node(root, 0, &mut out);
    out
}

fn render_node(node: &ChainNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    // Writing into a String cannot fail.
    let _ = match node.role {
        Role::Unclassified => writeln!(out, "{indent}{}", node.coordinate),
        role => writeln!(out, "{indent}{} [{role}]", node.coordinate),
    };
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}
