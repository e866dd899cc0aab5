use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::jwt::{decode_access, TokenError};
use super::roles::Role;
use crate::api::dto::{LoginRequest, MeResponse, RegisterRequest};
use crate::api::ApiError;
use crate::routes::{route_access, Access, LOGIN_PATH, REGISTER_PATH};
use crate::state::SessionContext;
use crate::storage::{clear_pair, store_pair, ACCESS_TOKEN};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token store: {0}")]
    Store(#[from] anyhow::Error),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> Result<String, SessionError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(SessionError::MissingField("email"));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(SessionError::InvalidEmail);
    }
    Ok(email)
}

/// Result of a successful login: who signed in and where to go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing {
    pub role: Role,
    pub path: String,
}

/// Signs in and stores the new token pair, replacing whatever was stored.
///
/// `return_to` is the screen the visitor was bounced from; they go back there
/// if their role may see it, otherwise to their role's home.
#[instrument(skip(ctx, password))]
pub async fn login(
    ctx: &SessionContext,
    email: &str,
    password: &str,
    return_to: Option<&str>,
) -> Result<Landing, SessionError> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(SessionError::MissingField("password"));
    }

    let pair = ctx
        .api
        .login(&LoginRequest {
            email: email.clone(),
            password: password.to_string(),
        })
        .await?;
    let claims = decode_access(&pair.access)?;
    store_pair(ctx.store.as_ref(), &pair).await?;

    let role = ctx.gate.policy().role_for(&claims);
    let path = landing_path(role, return_to);
    info!(%email, %role, %path, "user logged in");
    Ok(Landing { role, path })
}

fn landing_path(role: Role, return_to: Option<&str>) -> String {
    let allowed = |path: &str| match route_access(path) {
        Access::Protected(requirement) => requirement.is_satisfied_by(role),
        Access::Public => false,
    };
    match return_to {
        Some(path) if allowed(path) => path.to_string(),
        _ => role.home_path().to_string(),
    }
}

/// Creates an account. Does not sign in.
#[instrument(skip(ctx, password))]
pub async fn register(
    ctx: &SessionContext,
    email: &str,
    username: &str,
    password: &str,
) -> Result<(), SessionError> {
    let email = normalize_email(email)?;
    let username = username.trim();
    if username.is_empty() {
        return Err(SessionError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(SessionError::MissingField("password"));
    }

    ctx.api
        .register(&RegisterRequest {
            email: email.clone(),
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
    info!(%email, %username, "user registered");
    Ok(())
}

#[instrument(skip(ctx))]
pub async fn logout(ctx: &SessionContext) -> Result<(), SessionError> {
    clear_pair(ctx.store.as_ref()).await?;
    info!("session cleared");
    Ok(())
}

/// For the login and register screens: a visitor who already holds a
/// decodable token is sent to their role's home instead of the form.
pub async fn landing_for_visitor(ctx: &SessionContext, path: &str) -> Option<&'static str> {
    let path = crate::routes::normalize(path);
    if path != LOGIN_PATH && path != REGISTER_PATH {
        return None;
    }
    let token = match ctx.store.get(ACCESS_TOKEN).await {
        Ok(Some(token)) => token,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "token store unreadable");
            return None;
        }
    };
    match decode_access(&token) {
        Ok(claims) => {
            let role = ctx.gate.policy().role_for(&claims);
            debug!(%role, "already signed in");
            Some(role.home_path())
        }
        Err(_) => None,
    }
}

#[instrument(skip(ctx))]
pub async fn current_user(ctx: &SessionContext) -> Result<MeResponse, SessionError> {
    Ok(ctx.api.me().await?)
}
