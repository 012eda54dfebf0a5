use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "memory.evict_fraction")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "codec", "redis", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the cache subsystem.
///
/// Only [`Error::Serialization`] and [`Error::Configuration`] ever reach callers of
/// [`CacheManager`](crate::cache::CacheManager); codec and distributed-tier failures are
/// absorbed internally and surface only in logs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Codec error: {message}{}", format_context(.context))]
    Codec {
        message: String,
        context: ErrorContext,
    },

    #[error("Distributed cache unavailable: {message}{}", format_context(.context))]
    DistributedUnavailable {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Invalid config file: {0}")]
    ConfigFormat(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a codec error with structured context
    pub fn codec_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Codec {
            message: msg.into(),
            context,
        }
    }

    /// Create a distributed-tier error tagged with the failing backend
    pub fn unavailable(backend: &str, msg: impl Into<String>) -> Self {
        Error::DistributedUnavailable {
            message: msg.into(),
            context: ErrorContext::new().with_source(backend),
        }
    }

    /// Create a configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Get error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Codec { context, .. }
            | Error::DistributedUnavailable { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Whether this error is one the cache absorbs (degrades to a miss / no-op)
    /// rather than returning to the caller.
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            Error::Codec { .. } | Error::DistributedUnavailable { .. }
        )
    }
}
