//! otaupdater - OS update client core
//!
//! Discovers update packages from a catalog, downloads them resumably,
//! verifies them and hands them to a block-based or recovery installer.
//!
//! ```text
//!   catalog ──► UpdateRegistry ──► transfer ──► verify ──► install
//!                    │                                       │
//!                    └──────── UpdateEvent ◄─────────────────┘
//! ```
//!
//! [`registry::UpdateRegistry`] is the entry point; everything else is a
//! collaborator it drives.

pub mod catalog;
pub mod config;
pub mod export;
pub mod import;
pub mod install;
pub mod logging;
pub mod model;
pub mod registry;
pub mod store;
pub mod transfer;
pub mod verify;

#[cfg(test)]
mod test_support;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
