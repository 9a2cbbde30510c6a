// Last.fm scrobbler implementation
// API documentation: https://www.last.fm/api/scrobbling

use super::traits::{AuthSnafu, DeliveryError, ScrobbleService, TransientSnafu};
use crate::config::LastFmConfig;
use crate::player::TrackIdentity;
use crate::queue::ScrobbleRecord;
use anyhow::Context;
use serde_json::Value;
use std::time::Duration;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error codes that mean the credentials need fixing:
/// 4 auth failed, 9 invalid session, 10 invalid api key, 14 token expired, 26 key suspended
const AUTH_ERROR_CODES: &[i64] = &[4, 9, 10, 14, 26];

pub struct LastFmScrobbler {
    api_key: String,
    api_secret: String,
    session_key: String,
}

impl LastFmScrobbler {
    pub fn new(api_key: String, api_secret: String, session_key: String) -> Self {
        Self {
            api_key,
            api_secret,
            session_key,
        }
    }

    /// Build a scrobbler from config, exchanging username + password hash
    /// for a session key when no session key is configured
    pub fn from_config(config: &LastFmConfig) -> anyhow::Result<Self> {
        if !config.session_key.is_empty() {
            log::info!("Using Last.fm session key auth");
            return Ok(Self::new(
                config.api_key.clone(),
                config.api_secret.clone(),
                config.session_key.clone(),
            ));
        }

        log::info!("Using Last.fm username + MD5 password auth for {}", config.username);
        let session_key = mobile_session(
            &config.api_key,
            &config.api_secret,
            &config.username,
            &config.password_md5,
        )
        .context("Failed to obtain a Last.fm session key")?;

        Ok(Self::new(
            config.api_key.clone(),
            config.api_secret.clone(),
            session_key,
        ))
    }

    fn call(&self, method: &str, mut params: Vec<(&str, String)>) -> Result<Value, DeliveryError> {
        params.push(("method", method.to_string()));
        params.push(("api_key", self.api_key.clone()));
        params.push(("sk", self.session_key.clone()));
        post_signed(params, &self.api_secret)
    }
}

impl ScrobbleService for LastFmScrobbler {
    fn send_now_playing(&self, track: &TrackIdentity) -> Result<(), DeliveryError> {
        log::debug!("Sending now playing to Last.fm: {}", track);

        let mut params = vec![
            ("artist", track.artist.clone()),
            ("track", track.title.clone()),
        ];
        if !track.album.is_empty() {
            params.push(("album", track.album.clone()));
        }

        self.call("track.updateNowPlaying", params)?;
        log::info!("Last.fm: Now playing updated");
        Ok(())
    }

    fn send_scrobble(&self, record: &ScrobbleRecord) -> Result<(), DeliveryError> {
        log::debug!("Scrobbling to Last.fm: {}", record);

        let response = self.call("track.scrobble", scrobble_params(record))?;
        let ignored = ignored_count(&response);
        if ignored > 0 {
            log::warn!("Last.fm ignored scrobble for {}: {}", record, response["scrobbles"]);
        } else {
            log::info!("Last.fm: Scrobbled successfully");
        }
        Ok(())
    }
}

fn scrobble_params(record: &ScrobbleRecord) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("artist", record.artist.clone()),
        ("track", record.title.clone()),
        ("timestamp", record.started_at.to_string()),
    ];
    if !record.album.is_empty() {
        params.push(("album", record.album.clone()));
    }
    if record.duration_seconds > 0 {
        params.push(("duration", record.duration_seconds.to_string()));
    }
    params
}

/// `auth.getMobileSession` using the legacy auth token scheme
fn mobile_session(
    api_key: &str,
    api_secret: &str,
    username: &str,
    password_md5: &str,
) -> Result<String, DeliveryError> {
    let params = vec![
        ("method", "auth.getMobileSession".to_string()),
        ("username", username.to_string()),
        ("authToken", auth_token(username, password_md5)),
        ("api_key", api_key.to_string()),
    ];

    let response = post_signed(params, api_secret)?;
    match response["session"]["key"].as_str() {
        Some(key) => Ok(key.to_string()),
        None => AuthSnafu {
            message: "Last.fm returned no session key",
        }
        .fail(),
    }
}

fn auth_token(username: &str, password_md5: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", username, password_md5)))
}

fn post_signed(mut params: Vec<(&str, String)>, secret: &str) -> Result<Value, DeliveryError> {
    let signature = sign(&params, secret);
    params.push(("api_sig", signature));
    params.push(("format", "json".to_string()));

    let response = attohttpc::post(API_URL)
        .timeout(REQUEST_TIMEOUT)
        .form(&params)
        .and_then(|request| request.send())
        .map_err(|e| DeliveryError::Transient {
            message: format!("request to Last.fm failed: {}", e),
        })?;

    let status = response.status().as_u16();
    let body = response.text().map_err(|e| DeliveryError::Transient {
        message: format!("failed to read Last.fm response: {}", e),
    })?;

    parse_response(status, &body)
}

/// Request signature: md5 of the sorted `key + value` pairs followed by the secret
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params
        .iter()
        .filter(|(key, _)| *key != "format" && *key != "callback")
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut payload = String::new();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);

    format!("{:x}", md5::compute(payload))
}

/// Classify a Last.fm response body into success or a delivery error
fn parse_response(status: u16, body: &str) -> Result<Value, DeliveryError> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return TransientSnafu {
            message: format!("unreadable Last.fm response (HTTP {})", status),
        }
        .fail();
    };

    if let Some(code) = value.get("error").and_then(Value::as_i64) {
        let message = format!(
            "Last.fm API error {}: {}",
            code,
            value["message"].as_str().unwrap_or("no message")
        );
        if AUTH_ERROR_CODES.contains(&code) {
            return AuthSnafu { message }.fail();
        }
        return TransientSnafu { message }.fail();
    }

    if !(200..300).contains(&status) {
        return TransientSnafu {
            message: format!("Last.fm returned HTTP {}", status),
        }
        .fail();
    }

    Ok(value)
}

fn ignored_count(response: &Value) -> u64 {
    let ignored = &response["scrobbles"]["@attr"]["ignored"];
    ignored
        .as_u64()
        .or_else(|| ignored.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}
