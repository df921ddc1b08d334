//! Universe Registry Library
//!
//! Exposes the registry tooling for the tool binaries and integration tests.

pub mod universe;

pub use universe::{UniverseConfig, UniverseError};
