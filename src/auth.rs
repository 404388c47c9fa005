use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::HeaderValue, web, FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::schemas::UserNick;

type HmacSha256 = Hmac<Sha256>;

/// Header a bot-authorized caller uses to name the user it acts for.
pub const ACTING_USER_HEADER: &str = "X-Acting-User";

#[derive(Debug, PartialEq)]
pub enum AuthorizationLevel {
    Bot,
    Frontend(UserNick),
}

/// The user a request runs on behalf of.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor(pub UserNick);

#[derive(Deserialize, Debug, Clone)]
struct TelegramAuthData {
    auth_date: String,
    first_name: Option<String>,
    last_name: Option<String>,
    id: String,
    photo_url: Option<String>,
    username: String,
    hash: String,
}

pub fn check_authorization_level(
    request: &HttpRequest,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if is_bot_token(authorization, &config.bot_token) {
        return Some(AuthorizationLevel::Bot);
    }
    let auth_data: TelegramAuthData = serde_json::from_str(authorization).ok()?;

    let issued = auth_data
        .auth_date
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))?;
    if now - issued > config.login_max_age {
        debug!(user = %auth_data.username, "stale login payload");
        return None;
    }

    let expected = hex::decode(&auth_data.hash).ok()?;
    let mac = login_mac(&auth_data, &config.bot_token)?;
    match mac.verify_slice(&expected) {
        Ok(()) => Some(AuthorizationLevel::Frontend(auth_data.username)),
        Err(_) => {
            debug!(user = %auth_data.username, "login hash mismatch");
            None
        }
    }
}

/// Compares MACs of both tokens with `verify_slice`, so the check takes the
/// same time however much of the token a caller got right.
fn is_bot_token(candidate: &str, bot_token: &str) -> bool {
    let tag = |value: &str| {
        HmacSha256::new_from_slice(bot_token.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (tag(candidate), tag(bot_token)) {
        (Ok(candidate), Ok(expected)) => candidate
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

/// HMAC-SHA256 over the sorted `key=value` lines of the login payload,
/// keyed on SHA256 of the bot token.
fn login_mac(auth_data: &TelegramAuthData, bot_token: &str) -> Option<HmacSha256> {
    let hash_content = [
        ("auth_date", Some(&auth_data.auth_date)),
        ("first_name", auth_data.first_name.as_ref()),
        ("id", Some(&auth_data.id)),
        ("last_name", auth_data.last_name.as_ref()),
        ("photo_url", auth_data.photo_url.as_ref()),
        ("username", Some(&auth_data.username)),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|value| format!("{key}={value}")))
    .collect::<Vec<_>>()
    .join("\n");

    let bot_hash = Sha256::digest(bot_token.as_bytes());
    let mut mac = HmacSha256::new_from_slice(&bot_hash).ok()?;
    mac.update(hash_content.as_bytes());
    Some(mac)
}

fn resolve_actor(request: &HttpRequest) -> Result<Actor, ApiError> {
    let config = request
        .app_data::<web::Data<AuthConfig>>()
        .ok_or(ApiError::Unauthorized("authorization is not configured"))?;
    match check_authorization_level(request, config, Utc::now()) {
        Some(AuthorizationLevel::Frontend(nick)) => Ok(Actor(nick)),
        Some(AuthorizationLevel::Bot) => request
            .headers()
            .get(ACTING_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|nick| !nick.is_empty())
            .map(|nick| Actor(nick.to_string()))
            .ok_or(ApiError::Unauthorized("bot requests must name the acting user")),
        None => Err(ApiError::Unauthorized("invalid or missing credentials")),
    }
}

impl FromRequest for Actor {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve_actor(request))
    }
}
