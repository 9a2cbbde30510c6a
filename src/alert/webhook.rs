// Generic JSON webhook backend (Slack/Discord-style receivers accept it too)

use super::{Alert, AlertPort, Severity};
use serde_json::{json, Value};
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WebhookAlerts {
    url: String,
    min_level: Severity,
    app_tag: String,
}

impl WebhookAlerts {
    pub fn new(url: &str, min_level: Severity, app_tag: &str) -> Self {
        Self {
            url: url.trim().to_string(),
            min_level,
            app_tag: app_tag.to_string(),
        }
    }

    fn payload(&self, alert: &Alert) -> Value {
        json!({
            "level": alert.severity.as_str(),
            "title": format!("{}: {}", self.app_tag, alert.title),
            "message": alert.message,
            "extra": alert.extra.clone().unwrap_or_else(|| json!({})),
        })
    }
}

impl AlertPort for WebhookAlerts {
    fn notify(&self, alert: &Alert) {
        if alert.severity < self.min_level {
            return;
        }

        let result = attohttpc::post(&self.url)
            .timeout(SEND_TIMEOUT)
            .json(&self.payload(alert))
            .and_then(|request| request.send());

        match result {
            Ok(response) if response.is_success() => {
                log::debug!("Webhook alert sent: {}", alert.title);
            }
            Ok(response) => log::debug!("Webhook alert rejected: HTTP {}", response.status()),
            Err(e) => log::debug!("Webhook alert send failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_and_has_extra_object() {
        let webhook = WebhookAlerts::new(" https://hooks.example/x ", Severity::Warning, "BluOS→Last.fm");
        let payload = webhook.payload(&Alert::new(Severity::Error, "Auth failed", "invalid session"));

        assert_eq!(webhook.url, "https://hooks.example/x");
        assert_eq!(payload["level"], "ERROR");
        assert_eq!(payload["title"], "BluOS→Last.fm: Auth failed");
        assert_eq!(payload["message"], "invalid session");
        assert_eq!(payload["extra"], json!({}));
    }
}
