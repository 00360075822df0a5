//! # notifier — ส่งข้อความเข้า Telegram
//!
//! Best-effort ล้วนๆ: ส่งพลาด = log แล้วทิ้ง — alert หายได้ แต่ watcher
//! ต้องไม่ล้มเพราะ Telegram. ไม่ตั้ง `BOT_TOKEN`/`CHAT_ID` = dry-run mode
//! (พ่นข้อความลง log แทนการยิงจริง)

use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::WatchError;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

pub struct Notifier {
    client: reqwest::Client,
    /// `(bot_token, chat_id)` — ต้องครบทั้งคู่ถึงยิงจริง
    credentials: Option<(String, String)>,
}

impl Notifier {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let credentials = match (&config.bot_token, &config.chat_id) {
            (Some(token), Some(chat_id)) => Some((token.clone(), chat_id.clone())),
            _ => None,
        };

        Self {
            client,
            credentials,
        }
    }

    pub fn enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// ส่งข้อความ (หรือ log ถ้า disabled) — ไม่มีวัน fail
    pub async fn send(&self, text: &str) {
        let Some((token, chat_id)) = &self.credentials else {
            info!("(TELEGRAM DISABLED) {text}");
            return;
        };

        if let Err(e) = self.post_message(token, chat_id, text).await {
            warn!(error = %e, "Telegram send error");
        }
    }

    async fn post_message(
        &self,
        token: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), WatchError> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");

        let resp = self
            .client
            .post(&url)
            .form(&[("chat_id", chat_id), ("text", text)])
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| WatchError::Notification(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatchError::Notification(format!(
                "Telegram API {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(token: Option<&str>, chat_id: Option<&str>) -> Config {
        Config {
            bot_token: token.map(str::to_string),
            chat_id: chat_id.map(str::to_string),
            startup_dm: true,
            run_budget: Duration::from_secs(240),
            sweep_sleep: Duration::from_secs(30),
            cooldown: chrono::Duration::seconds(300),
            low_thresh: 20.0,
            high_thresh: 80.0,
        }
    }

    #[tokio::test]
    async fn disabled_without_credentials_and_send_is_a_noop() {
        let notifier = Notifier::new(reqwest::Client::new(), &make_config(None, None));
        assert!(!notifier.enabled());

        // dry-run: จบทันทีโดยไม่แตะ network (ไม่มี credentials ให้ประกอบ URL ด้วยซ้ำ)
        notifier.send("hello").await;
    }

    #[tokio::test]
    async fn partial_credentials_stay_disabled() {
        let notifier = Notifier::new(reqwest::Client::new(), &make_config(Some("tok"), None));
        assert!(!notifier.enabled());

        let notifier = Notifier::new(reqwest::Client::new(), &make_config(None, Some("42")));
        assert!(!notifier.enabled());
    }

    #[test]
    fn both_credentials_enable_sending() {
        let notifier = Notifier::new(
            reqwest::Client::new(),
            &make_config(Some("tok"), Some("42")),
        );
        assert!(notifier.enabled());
    }
}
