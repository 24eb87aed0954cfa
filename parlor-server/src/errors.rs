use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use parlor_collab::{DatabaseError, GameError, RoomError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    /// The targeted resource is already in a terminal state
    #[error("{0}")]
    AlreadyProcessed(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::AlreadyProcessed(_) => StatusCode::CONFLICT,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::Validation(message) => Self::BadRequest(message),
            RoomError::NotHost | RoomError::RoomLocked => Self::Forbidden(value.to_string()),
            RoomError::RequestAlreadyResolved => Self::AlreadyProcessed(value.to_string()),
            RoomError::Db(e) => e.into(),
        }
    }
}

impl From<GameError> for ServerError {
    fn from(value: GameError) -> Self {
        match value {
            GameError::SessionNotActive | GameError::GameFull => {
                Self::BadRequest(value.to_string())
            }
            GameError::NotInRoom | GameError::NotInSession | GameError::NotAllowed => {
                Self::Forbidden(value.to_string())
            }
            GameError::AlreadyEnded | GameError::AlreadyInSession => {
                Self::AlreadyProcessed(value.to_string())
            }
            GameError::Db(e) => e.into(),
        }
    }
}
