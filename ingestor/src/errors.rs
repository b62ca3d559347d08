use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// One or more numeric fields of a submission were not finite.
    #[error("Validation error: invalid value for {}", .0.join(", "))]
    InvalidFields(Vec<String>),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The store was unreachable for long enough that retries gave up.
    /// Callers may retry the whole operation.
    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),

    /// A reading was committed but an alert derived from it was not.
    #[error("Alert persistence failed: {0}")]
    AlertPersistence(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl Error {
    pub fn device_not_found(id: i64) -> Self {
        Error::NotFound {
            entity: "Device",
            id,
        }
    }

    /// Whether repeating the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientStore(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
