use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{TokenResponse, Valid, blocking};
use crate::user::Principal;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(length(min = 1, max = 255))]
    pub password: String,
}

/// Handler to exchange credentials for a token.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenResponse>> {
    let user = state.users.find_by_username(&body.username).await?;

    // Unknown users pay the same verification cost as known ones.
    let crypto = Arc::clone(&state.crypto);
    let hash = user.as_ref().map(|user| user.password().to_owned());
    let password = body.password;
    let verified = blocking(move || {
        let hash = hash.as_deref().unwrap_or(crypto.dummy_hash());
        Ok(crypto.verify_password(password, hash))
    })
    .await?;

    let Some(user) = user else {
        tracing::debug!(username = %body.username, "login for unknown user");
        return Err(ServerError::Unauthorized);
    };
    verified?;
    if !user.is_usable() {
        return Err(ServerError::Unauthorized);
    }

    let token = state.token.create(user.username())?;
    Ok(Json(TokenResponse::bearer(token)))
}
