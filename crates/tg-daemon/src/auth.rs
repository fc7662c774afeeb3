//! Caller identity.
//!
//! `require_auth` runs in front of every `/api` route, resolves the caller
//! once and stores an [`AuthUser`] in the request extensions. Handlers take
//! it with `Extension<AuthUser>`.

use std::sync::Arc;

use anyhow::{bail, Result};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tg_config::{AuthConfig, AuthMode, ResolvedSecrets};
use tracing::debug;

use crate::{api_types::ErrorResponse, state::AppState};

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

#[derive(Clone)]
pub enum Authenticator {
    /// HS256 bearer tokens; `exp` is always checked.
    Jwt {
        key: DecodingKey,
        validation: Validation,
    },
    /// Every request is this user.
    Static { user_id: String },
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authenticator::Jwt { .. } => f.write_str("Authenticator::Jwt(REDACTED)"),
            Authenticator::Static { user_id } => {
                write!(f, "Authenticator::Static({user_id})")
            }
        }
    }
}

impl Authenticator {
    pub fn jwt(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self::Jwt {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn static_user(user_id: impl Into<String>) -> Self {
        Self::Static {
            user_id: user_id.into(),
        }
    }

    pub fn from_config(cfg: &AuthConfig, secrets: &ResolvedSecrets) -> Result<Self> {
        match cfg.mode {
            AuthMode::Jwt => {
                let Some(secret) = secrets.jwt_secret.as_deref() else {
                    bail!("SECRETS_MISSING auth=jwt: no signing secret resolved");
                };
                Ok(Self::jwt(secret, cfg.audience.as_deref()))
            }
            AuthMode::Static => match cfg.static_user_id.as_deref() {
                Some(id) if !id.trim().is_empty() => Ok(Self::static_user(id.trim())),
                _ => bail!("CONFIG_INVALID: auth.mode=static requires auth.static_user_id"),
            },
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Authenticator::Jwt { .. } => "jwt",
            Authenticator::Static { .. } => "static",
        }
    }

    /// `None` means unauthenticated.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<AuthUser> {
        match self {
            Authenticator::Static { user_id } => Some(AuthUser {
                user_id: user_id.clone(),
            }),
            Authenticator::Jwt { key, validation } => {
                let token = bearer_token(headers)?;
                match decode::<Claims>(token, key, validation) {
                    Ok(data) if !data.claims.sub.trim().is_empty() => Some(AuthUser {
                        user_id: data.claims.sub,
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        debug!(error = %e, "bearer token rejected");
                        None
                    }
                }
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
        }),
    )
        .into_response()
}

/// Middleware: 401 before any handler work unless the caller resolves.
pub async fn require_auth(
    State(st): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match st.auth.authenticate(req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => unauthorized(),
    }
}
