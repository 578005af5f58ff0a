//! Error handling for the gradient mesh pipeline
//!
//! Every failure the pipeline can hit maps onto one variant here. Callers
//! decide what to do through [`GradientError::severity`]: fatal errors stop
//! pipeline construction, frame-skip errors drop one frame and leave the pool
//! intact, invalid-input errors are rejected before any GPU work is encoded.

/// How a failure affects the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Required device, kernel or queue is missing; construction cannot proceed
    Fatal,
    /// Transient resource pressure; skip this frame and retry on the next
    SkipFrame,
    /// The request itself is malformed; nothing was dispatched
    InvalidInput,
}

/// Main error type for the gradient mesh pipeline
#[derive(Debug, thiserror::Error)]
pub enum GradientError {
    // Resource errors
    #[error("GPU device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Shader compilation failed for {kernel}: {error}")]
    ShaderCompilation { kernel: String, error: String },

    #[error("Allocation failed for {size} bytes ({class}): {reason}")]
    AllocationFailed {
        size: u64,
        class: String,
        reason: String,
    },

    // Input errors
    #[error("Degenerate grid {width}x{height}: {reason}")]
    DegenerateGrid {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported pixel format {format}: {reason}")]
    UnsupportedFormat { format: String, reason: String },

    #[error("Grid shape mismatch: {width}x{height} needs {expected} points, got {actual}")]
    GridShapeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    // Diagnostics
    #[error("Readback failed for {label}: {error}")]
    ReadbackFailed { label: String, error: String },

    #[error("Buffer view out of bounds: {requested} bytes requested, {available} available")]
    BufferView { requested: usize, available: usize },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GradientError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GradientError::DeviceUnavailable { .. }
            | GradientError::ShaderCompilation { .. }
            | GradientError::Internal { .. } => ErrorSeverity::Fatal,
            GradientError::AllocationFailed { .. } | GradientError::ReadbackFailed { .. } => {
                ErrorSeverity::SkipFrame
            }
            GradientError::DegenerateGrid { .. }
            | GradientError::InvalidViewport { .. }
            | GradientError::InvalidConfig { .. }
            | GradientError::UnsupportedFormat { .. }
            | GradientError::GridShapeMismatch { .. }
            | GradientError::BufferView { .. } => ErrorSeverity::InvalidInput,
        }
    }

    /// True when the frame can simply be dropped and the pipeline reused
    pub fn is_recoverable(&self) -> bool {
        self.severity() != ErrorSeverity::Fatal
    }
}

/// Type alias for Results in the gradient mesh pipeline
pub type GradientResult<T> = Result<T, GradientError>;

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_gradient<F>(self, f: F) -> GradientResult<T>
    where
        F: FnOnce() -> GradientError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_gradient<F>(self, f: F) -> GradientResult<T>
    where
        F: FnOnce() -> GradientError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to foreign errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> GradientResult<T>;
    fn with_context<F>(self, f: F) -> GradientResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> GradientResult<T> {
        self.map_err(|e| GradientError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> GradientResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| GradientError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
