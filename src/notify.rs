//! Outbound notifications through the Telegram Bot API.

use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::error::{RelayError, Result};

/// Something that can deliver a text message to a chat.
pub trait Messenger {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// `sendMessage` over the Telegram Bot HTTP API.
pub struct TelegramBot {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl TelegramBot {
    pub fn new(agent: ureq::Agent, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            agent,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }
}

impl Messenger for TelegramBot {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let reply = self
            .agent
            .post(&self.method_url("sendMessage"))
            .send_json(json!({ "chat_id": chat_id, "text": text }));

        match reply {
            Ok(response) => {
                let body: Value = response
                    .into_json()
                    .map_err(|e| RelayError::Delivery(format!("unreadable Telegram reply: {e}")))?;
                if body.get("ok").and_then(Value::as_bool) == Some(true) {
                    Ok(())
                } else {
                    Err(RelayError::Delivery(describe_rejection(&body)))
                }
            }
            Err(ureq::Error::Status(code, response)) => {
                let description = response
                    .into_json::<Value>()
                    .map(|body| describe_rejection(&body))
                    .unwrap_or_else(|_| "no description".to_string());
                Err(RelayError::Delivery(format!(
                    "Telegram API returned {code}: {description}"
                )))
            }
            // The request URL embeds the bot token, so only the kind and
            // message are surfaced.
            Err(ureq::Error::Transport(transport)) => Err(RelayError::Delivery(format!(
                "{}: {}",
                transport.kind(),
                transport.message().unwrap_or("transport failure")
            ))),
        }
    }
}

fn describe_rejection(body: &Value) -> String {
    body.get("description")
        .and_then(Value::as_str)
        .unwrap_or("request rejected")
        .to_string()
}

/// Best-effort delivery to the configured chat.
pub struct Notifier {
    messenger: Box<dyn Messenger>,
    chat_id: String,
}

impl Notifier {
    pub fn new(messenger: Box<dyn Messenger>, chat_id: impl Into<String>) -> Self {
        Self {
            messenger,
            chat_id: chat_id.into(),
        }
    }

    /// Send `message`, logging instead of propagating any failure.
    ///
    /// Returns whether the message was delivered.
    pub fn send(&self, message: &str) -> bool {
        info!(chat_id = %self.chat_id, "sending message");
        match self.messenger.send_message(&self.chat_id, message) {
            Ok(()) => {
                debug!(text = message, "message sent");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to send message to Telegram");
                false
            }
        }
    }
}
