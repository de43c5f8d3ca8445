//! Utility Module
//!
//! - [`hash`]: FNV-1a 32 bit folding used for property ids, combination ids
//!   and signature ids. Deterministic across runs and platforms, so the ids
//!   can be persisted.

pub mod hash;
