//! One-shot messages and preserved form input carried in the cookie session.

use axum::response::Redirect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tower_sessions::Session;

use super::ApiError;
use crate::constants::session_keys::{FLASH, OLD_INPUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

pub async fn push(
    session: &Session,
    level: FlashLevel,
    message: impl Into<String>,
) -> Result<(), ApiError> {
    let mut messages: Vec<FlashMessage> = session.get(FLASH).await?.unwrap_or_default();
    messages.push(FlashMessage {
        level,
        message: message.into(),
    });
    session.insert(FLASH, messages).await?;
    Ok(())
}

/// Returns and clears pending messages.
pub async fn take(session: &Session) -> Result<Vec<FlashMessage>, ApiError> {
    Ok(session.remove(FLASH).await?.unwrap_or_default())
}

/// Stores non-secret fields so a form can be re-filled after a failure.
pub async fn keep_input(session: &Session, fields: &[(&str, &str)]) -> Result<(), ApiError> {
    let input: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    session.insert(OLD_INPUT, input).await?;
    Ok(())
}

pub async fn take_input(session: &Session) -> Result<BTreeMap<String, String>, ApiError> {
    Ok(session.remove(OLD_INPUT).await?.unwrap_or_default())
}

pub async fn redirect_with(
    session: &Session,
    to: &str,
    level: FlashLevel,
    message: impl Into<String>,
) -> Result<Redirect, ApiError> {
    push(session, level, message).await?;
    Ok(Redirect::to(to))
}

/// Turns an expected failure into an error flash plus redirect. Faults are
/// passed through so they end up as a generic 500.
pub async fn fail_to(
    session: &Session,
    to: &str,
    err: impl Into<ApiError>,
) -> Result<Redirect, ApiError> {
    let err = err.into();
    match err.user_message() {
        Some(message) => redirect_with(session, to, FlashLevel::Error, message).await,
        None => Err(err),
    }
}
