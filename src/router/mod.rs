//! HTTP API outside of the OData service.
pub mod create;
pub mod login;
pub mod status;

use std::sync::LazyLock;

use axum::Json;
use axum::extract::{FromRequest, Request};
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::{Result as ServerResult, ServerError};

pub const TOKEN_TYPE: &str = "Bearer";

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid username pattern")
});

/// Usernames are ASCII letters, digits, `.`, `_` and `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Run CPU-heavy work, such as password hashing, off the async workers.
pub async fn blocking<T, F>(job: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ServerError::Internal {
            details: "blocking task failed".into(),
            source: Some(Box::new(err)),
        })?
}

/// Token returned on registration and login.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn bearer(token: String) -> Self {
        Self {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            expires_in: crate::token::EXPIRATION_TIME,
        }
    }
}
