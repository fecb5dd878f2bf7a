//! Ceph RBD adapter for the clone-chain engine. `system` implements the
//! metadata provider; `command` and `parse` cover the CLI plumbing.

mod command;
mod parse;
mod system;

pub use system::{ConnectionOptions, SystemRbdProvider, DEFAULT_RBD_PATHS};
