//! Errors raised by the data sources the calculation engine reads from.
//!
//! Every variant carries an [`ErrorContext`] describing which lookup failed so
//! that a failed preload unit or request can be traced back to its source.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a repository error happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The lookup being performed (e.g., "get_unweighted_counts", "get_measure")
    pub operation: Option<String>,
    /// The kind of record involved (e.g., "measure", "subset", "report")
    pub resource: Option<String>,
    /// Key of the record if applicable
    pub key: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether the same call may succeed if repeated
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_key(mut self, key: impl ToString) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            self.operation.as_ref().map(|v| format!("operation={}", v)),
            self.resource.as_ref().map(|v| format!("resource={}", v)),
            self.key.as_ref().map(|v| format!("key={}", v)),
            self.details.as_ref().map(|v| format!("details={}", v)),
            self.retryable.then(|| "retryable=true".to_string()),
        ]
        .into_iter()
        .flatten()
        .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum RepositoryError {
    /// The data source could not be reached. Usually transient.
    #[error("Data source unavailable: {message} {context}")]
    Unavailable {
        message: String,
        context: ErrorContext,
    },

    /// A lookup ran but failed.
    #[error("Query error: {message} {context}")]
    Query {
        message: String,
        context: ErrorContext,
    },

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Stored data is inconsistent with what the engine expects.
    #[error("Invalid data: {message} {context}")]
    InvalidData {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message} {context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Timeout: {message} {context}")]
    Timeout {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { context, .. }
            | Self::Timeout { context, .. }
            | Self::Query { context, .. } => context.retryable,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Unavailable { context, .. }
            | Self::Query { context, .. }
            | Self::NotFound { context, .. }
            | Self::InvalidData { context, .. }
            | Self::Configuration { context, .. }
            | Self::Timeout { context, .. } => context,
        }
    }

    /// Record which lookup failed.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        match &mut self {
            Self::Unavailable { context, .. }
            | Self::Query { context, .. }
            | Self::NotFound { context, .. }
            | Self::InvalidData { context, .. }
            | Self::Configuration { context, .. }
            | Self::Timeout { context, .. } => {
                context.operation = Some(operation.into());
            }
        }
        self
    }
}
