// crates/acstore-config/src/lib.rs
// ============================================================================
// Module: acstore Config Library
// Description: Configuration model and validation for acstore.toml.
// Purpose: Single source of truth for acstore.toml semantics.
// Dependencies: acstore-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `acstore-config` loads `acstore.toml` with strict size, encoding, and path
//! limits. Every section has defaults so an absent default config file yields
//! a usable configuration.
//!
//! Security posture: config inputs are untrusted and validated fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
