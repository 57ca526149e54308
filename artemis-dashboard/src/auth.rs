//! Login de démonstration : une paire d'identifiants fixe, pas de session ni de token.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LoginConf;

pub const DASHBOARD_REDIRECT: &str = "/dashboard";
/// Délai cosmétique ("Authenticating...") avant redirection côté UI
pub const REDIRECT_DELAY_MS: u64 = 800;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LoginSuccess {
    pub user: String,
    pub redirect: String,
    pub redirect_delay_ms: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum LoginError {
    #[error("Please enter both username and password")]
    MissingFields,
    #[error("Invalid credentials. Try {username} / {password}")]
    InvalidCredentials { username: String, password: String },
}

pub fn check_login(req: &LoginRequest, creds: &LoginConf) -> Result<LoginSuccess, LoginError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(LoginError::MissingFields);
    }

    if req.username != creds.username || req.password != creds.password {
        return Err(LoginError::InvalidCredentials {
            username: creds.username.clone(),
            password: creds.password.clone(),
        });
    }

    Ok(LoginSuccess {
        user: req.username.clone(),
        redirect: DASHBOARD_REDIRECT.to_string(),
        redirect_delay_ms: REDIRECT_DELAY_MS,
    })
}
