// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! # spynnaker-observability
//!
//! Logging setup shared by the sPyNNaker crates, with per-crate debug flag support.
//!
//! Library crates log with an explicit target equal to their crate name
//! (`target: "spynnaker-buffers"`), which is what the debug flags filter on.
//!
//! ## Features
//! - `file-logging`: one log file per run under a timestamped folder

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "spynnaker",
    "spynnaker-eieio",
    "spynnaker-buffers",
    "spynnaker-config",
    "spynnaker-observability",
];
