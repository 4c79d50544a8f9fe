//! Error types for the apps

use ha_config::ConfigError;
use ha_core::EntityIdError;
use ha_service_registry::ServiceError;
use ha_state_store::StateStoreError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    EntityId(#[from] EntityIdError),

    /// A service call could not be dispatched
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// A stored or configured value is not a known option
    #[error("unknown {kind} '{value}'")]
    UnknownOption { kind: &'static str, value: String },

    #[error("invalid event data: {0}")]
    EventData(#[from] serde_json::Error),
}
