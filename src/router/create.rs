use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::{TokenResponse, Valid, blocking};
use crate::user::{RoleName, User};

/// Role granted to self-registered users.
const DEFAULT_ROLE: RoleName = RoleName::Operator;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(
        length(min = 3, max = 100, message = "Username must contain 3 to 100 characters."),
        custom(
            function = "crate::router::validate_username",
            message = "Username must be alphanumeric."
        )
    )]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

/// Handler to register a user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let crypto = Arc::clone(&state.crypto);
    let password = body.password;
    let hash = blocking(move || Ok(crypto.hash_password(password)?)).await?;
    let user = state
        .users
        .insert(&User::new(body.username, hash), &[DEFAULT_ROLE])
        .await?;

    let token = state.token.create(&user.username)?;

    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}
