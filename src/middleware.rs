//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::user::{GrantedAuthority, Principal, RoleName, User};

const BEARER: &str = "Bearer ";

/// Authorities allowed to read the OData service.
fn odata_authorities() -> [GrantedAuthority; 2] {
    [
        GrantedAuthority::from_role(RoleName::Editor),
        GrantedAuthority::from_role(RoleName::Operator),
    ]
}

/// Resolve the bearer token into a [`User`] stored on request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    let claims = state.token.decode(token.trim())?;
    let user = state
        .users
        .find_by_username(&claims.sub)
        .await?
        .ok_or(ServerError::Unauthorized)?;

    if !user.is_usable() {
        tracing::warn!(username = %user.username, "unusable account rejected");
        return Err(ServerError::Unauthorized);
    }

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// Reject principals holding none of the OData authorities.
pub async fn require_authority(req: Request, next: Next) -> Result<Response> {
    let user = req
        .extensions()
        .get::<User>()
        .ok_or(ServerError::Unauthorized)?;

    if !user.has_any_authority(&odata_authorities()) {
        tracing::debug!(username = %user.username, "missing odata authority");
        return Err(ServerError::Forbidden);
    }

    Ok(next.run(req).await)
}
