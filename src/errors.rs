//! Error Types
//!
//! This module defines the error types used throughout the pipeline-state cache.
//!
//! # Overview
//!
//! The main error type [`PsoError`] covers all failure modes including:
//! - Shader source generation (template substitution) failures
//! - Native shader compilation failures
//! - Backend pipeline object creation failures
//! - Persisted cache decoding errors
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, PsoError>`.
//!
//! Failures inside the asynchronous compiler pipeline never surface as
//! errors to the render thread: they are logged and the affected cache entry
//! keeps a null pipeline, which the render queue treats as "skip this draw".

use thiserror::Error;

use crate::resources::blueprint::ShaderStage;

/// The main error type for the pipeline-state cache.
#[derive(Error, Debug)]
pub enum PsoError {
    // ========================================================================
    // Build / Compile / Create
    // ========================================================================
    /// The shader blueprint could not produce source text for a property set.
    #[error("Shader build failed (shader blueprint {shader_blueprint:#010x}): {reason}")]
    ShaderBuildFailed {
        /// Resource id of the shader blueprint
        shader_blueprint: u32,
        /// Description of what went wrong
        reason: String,
    },

    /// The native shader compiler rejected the generated source.
    #[error("Shader compile failed ({stage:?}): {reason}")]
    ShaderCompileFailed {
        /// Stage the shader was compiled for
        stage: ShaderStage,
        /// Compiler diagnostics
        reason: String,
    },

    /// The backend failed to create a pipeline object.
    #[error("Pipeline state creation failed: {0}")]
    PipelineCreateFailed(String),

    /// The backend has no support for the requested shader stage.
    #[error("Unsupported shader stage for this backend: {0:?}")]
    UnsupportedStage(ShaderStage),

    /// A graphics pipeline was requested for a material blueprint without
    /// a fixed-function pipeline description.
    #[error("Material blueprint {0:#010x} has no graphics pipeline description")]
    MissingPipelineDescription(u32),

    /// Template rendering error.
    #[error("Shader template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    // ========================================================================
    // Persistence
    // ========================================================================
    /// The persisted cache belongs to a different material blueprint.
    #[error("Pipeline cache material mismatch: expected {expected:#010x}, found {found:#010x}")]
    MaterialMismatch {
        /// Material blueprint id of the manager being loaded into
        expected: u32,
        /// Material blueprint id stored in the file
        found: u32,
    },

    /// The persisted cache is truncated or malformed.
    #[error("Corrupt pipeline cache: {0}")]
    CorruptCache(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Alias for `Result<T, PsoError>`.
pub type Result<T> = std::result::Result<T, PsoError>;
