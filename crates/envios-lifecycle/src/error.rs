use envios_types::{DeliveryState, FieldError, Role};
use thiserror::Error;

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures surfaced by lifecycle operations.
///
/// Notifier failures are not represented here: they are logged and never
/// reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("shipment not found: {0}")]
    NotFound(String),

    #[error("role {role} may not {action}")]
    Forbidden { role: Role, action: String },

    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: DeliveryState, to: DeliveryState },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("delivery attempts exhausted ({attempts} of {max})")]
    RetryLimitReached { attempts: u32, max: u32 },

    #[error("failed to persist evidence image: {0}")]
    ImagePersistFailure(String),

    #[error("failed to read shipment store: {0}")]
    StoreReadFailure(String),

    #[error("failed to write shipment: {0}")]
    StoreWriteFailure(String),
}

impl LifecycleError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LifecycleError::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable machine-readable name, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::Forbidden { .. } => "forbidden",
            LifecycleError::Validation(_) => "validation_error",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::Conflict(_) => "conflict",
            LifecycleError::RetryLimitReached { .. } => "retry_limit_reached",
            LifecycleError::ImagePersistFailure(_) => "image_persist_failure",
            LifecycleError::StoreReadFailure(_) => "store_read_failure",
            LifecycleError::StoreWriteFailure(_) => "store_write_failure",
        }
    }

    /// Field-level detail for validation failures; empty otherwise.
    pub fn fields(&self) -> &[FieldError] {
        match self {
            LifecycleError::Validation(fields) => fields,
            _ => &[],
        }
    }

    /// Whether repeating the whole operation may succeed. Nothing was
    /// committed for any of these.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::Conflict(_)
                | LifecycleError::ImagePersistFailure(_)
                | LifecycleError::StoreReadFailure(_)
                | LifecycleError::StoreWriteFailure(_)
        )
    }
}
