//! metacache library
//!
//! Exposes the cache stores, the metadata producer and the CLI definitions for
//! use in integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
