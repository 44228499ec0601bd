// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture and rendering pipeline
//!
//! Errors come in two tiers:
//! - Construction-time failures (no GPU, broken shader, texture cache) are fatal
//!   and surface as `Err` from constructors.
//! - Steady-state failures (camera missing, input rejected, a frame that cannot be
//!   converted) are logged by the component that hit them and skipped.

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for capture backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for GPU rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Top-level error returned to the host application
#[derive(Debug, Error)]
pub enum AppError {
    /// Capture backend failure
    #[error("Camera error: {0}")]
    Camera(#[from] BackendError),
    /// Renderer construction or GPU failure
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// Filesystem errors (configuration loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture backend errors
///
/// All of these are soft failures once a session is running: the session logs
/// them and keeps its last committed configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    #[error("Backend not available: {0}")]
    NotAvailable(String),
    /// No device for the requested position
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// The session refused the device input
    #[error("Cannot add input: {0}")]
    InputRejected(String),
    /// The session refused the frame output
    #[error("Cannot add output: {0}")]
    OutputRejected(String),
    /// Failed to initialize backend resources
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// The running pipeline reported an error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// GPU renderer errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// No suitable GPU adapter
    #[error("No suitable GPU adapter: {0}")]
    NoAdapter(String),
    /// Adapter found but device creation failed
    #[error("Failed to create GPU device: {0}")]
    DeviceRequest(String),
    /// Shader module or render pipeline failed validation
    #[error("Pipeline compilation failed: {0}")]
    PipelineCompilation(String),
    /// Texture cache could not be created
    #[error("Texture cache initialization failed: {0}")]
    TextureCacheInit(String),
    /// Pixel format has no texture mapping
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),
    /// Every cache slot is still referenced by a pending draw
    #[error("Texture cache exhausted ({0} slots in use)")]
    CacheExhausted(usize),
    /// Pixel data does not match the texture it is copied into
    #[error("Texture upload failed: {0}")]
    Upload(String),
    /// Command submission failed
    #[error("Submission failed: {0}")]
    Submission(String),
}

impl RenderError {
    /// Whether the error is a per-frame soft failure (frame dropped, pipeline keeps going)
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            RenderError::UnsupportedFormat(_)
                | RenderError::CacheExhausted(_)
                | RenderError::Upload(_)
                | RenderError::Submission(_)
        )
    }
}
