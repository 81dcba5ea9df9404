//! Filespace Common - Shared types and utilities
//!
//! This crate provides the types shared by the persisted record store and
//! the in-memory filespace directory: identifiers, record locators, the
//! fixed-width location encoding, the error taxonomy and configuration.

pub mod config;
pub mod error;
pub mod location;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use location::{BlankPaddedLocation, LOCATION_WIDTH, MAX_LOCATION_LEN};
pub use types::*;
