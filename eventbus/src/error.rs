use eventbus_core::error::EventError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("event: {0}")]
    Event(#[from] EventError),

    #[error("connection: {0}")]
    Connection(String),

    #[error("publish: {0}")]
    Publish(String),

    #[error("subscribe: {0}")]
    Subscribe(String),

    #[error("dead letter not found: event_id={event_id}")]
    ReplayNotFound { event_id: String },

    #[error("no handlers registered for replay: event_id={event_id}, event={event_name}")]
    ReplayNoHandlers { event_id: String, event_name: String },

    #[error("bus closed")]
    Closed,

    #[error("config: {0}")]
    Config(String),
}

pub type BusResult<T> = Result<T, BusError>;

impl From<config::ConfigError> for BusError {
    fn from(err: config::ConfigError) -> Self {
        BusError::Config(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Connection(err.to_string())
    }
}
