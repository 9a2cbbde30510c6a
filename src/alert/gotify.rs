// Gotify backend: POST /message with an application token

use super::{Alert, AlertPort, Severity};
use serde_json::{json, Value};
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GotifyAlerts {
    url: String,
    token: String,
    priority: u8,
    min_level: Severity,
    app_tag: String,
}

impl GotifyAlerts {
    pub fn new(url: &str, token: &str, priority: u8, min_level: Severity, app_tag: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            priority,
            min_level,
            app_tag: app_tag.to_string(),
        }
    }

    fn body(&self, alert: &Alert) -> Value {
        let message = match &alert.extra {
            Some(extra) => format!("{}\n\n{}", alert.message, extra),
            None => alert.message.clone(),
        };
        json!({
            "title": format!("{}: {}", self.app_tag, alert.title),
            "message": message,
            "priority": self.priority,
        })
    }
}

impl AlertPort for GotifyAlerts {
    fn notify(&self, alert: &Alert) {
        if alert.severity < self.min_level {
            return;
        }

        let result = attohttpc::post(format!("{}/message", self.url))
            .header("X-Gotify-Key", self.token.as_str())
            .timeout(SEND_TIMEOUT)
            .json(&self.body(alert))
            .and_then(|request| request.send());

        match result {
            Ok(response) if response.is_success() => {
                log::debug!("Gotify alert sent: {}", alert.title);
            }
            Ok(response) => log::debug!("Gotify rejected alert: HTTP {}", response.status()),
            Err(e) => log::debug!("Gotify send failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_appends_extra_to_message() {
        let gotify = GotifyAlerts::new("http://nas:8080/", "tok", 7, Severity::Warning, "bridge");
        let alert = Alert::new(Severity::Warning, "Queue filling up", "400/500")
            .with_extra(json!({"pending": 400}));
        let body = gotify.body(&alert);

        assert_eq!(gotify.url, "http://nas:8080");
        assert_eq!(body["title"], "bridge: Queue filling up");
        assert_eq!(body["message"], "400/500\n\n{\"pending\":400}");
        assert_eq!(body["priority"], 7);
    }
}
