use axum::http::StatusCode;
use thiserror::Error;

use crate::access::AccessMode;
use crate::error::{AppError, CODE_UNEXPECTED};

/// Failures of the access pipeline. The client-facing code depends on the
/// mode the caller asked for, so conversion to [`AppError`] takes the mode.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("document not found")]
    NotFound,
    #[error("user account does not exist")]
    UnknownUser,
    #[error("the document source is missing from storage")]
    SourceMissing,
    #[error("access denied for this account")]
    Banned,
    #[error("no premium downloads left")]
    InsufficientBalance,
    #[error("captcha verification required")]
    CaptchaRequired,
    #[error("captcha verification failed")]
    CaptchaFailed,
    #[error("upstream service failed")]
    Upstream(#[source] anyhow::Error),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

impl AccessError {
    pub fn code(&self, mode: AccessMode) -> &'static str {
        match (self, mode) {
            (Self::NotFound, AccessMode::Preview) => "FI013",
            (Self::NotFound, AccessMode::Print) => "FI019",
            (Self::NotFound, _) => "FI005",
            (Self::UnknownUser, _) => "FI004",
            (Self::Banned, AccessMode::Print) => "FI020",
            (Self::Banned, _) => "FI006",
            (Self::InsufficientBalance, _) => "FI007",
            (Self::CaptchaRequired, _) => "FI008",
            (Self::CaptchaFailed, _) => "FI009",
            (Self::SourceMissing, AccessMode::Preview) => "FI014",
            (Self::SourceMissing, AccessMode::Print) => "FI021",
            (Self::SourceMissing, _) => "FI010",
            (Self::Upstream(_), _) | (Self::Database(_), _) => CODE_UNEXPECTED,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::SourceMissing => StatusCode::NOT_FOUND,
            Self::UnknownUser | Self::Banned | Self::InsufficientBalance => StatusCode::FORBIDDEN,
            Self::CaptchaRequired | Self::CaptchaFailed => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_app_error(self, mode: AccessMode) -> AppError {
        match self {
            Self::Database(err) => AppError::internal(err),
            Self::Upstream(err) => {
                tracing::error!(error = ?err, ?mode, "upstream failure while serving document");
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    CODE_UNEXPECTED,
                    "upstream service unavailable",
                )
            }
            other => AppError::new(other.status(), other.code(mode), other.to_string()),
        }
    }
}
