//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory (or an explicit path), falls back to shipped defaults on first
//! run, and turns the result into the settings the application layer needs.

pub mod config;
