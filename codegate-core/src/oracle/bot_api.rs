//! HTTP Bot API oracle
//!
//! Talks to a Telegram-style Bot API: every method is a JSON `POST` to
//! `{api_base}/bot{token}/{method}` answered by an `{ok, result, description}`
//! envelope.

use super::{MembershipOracle, OracleError, OracleResult};
use crate::types::{ArtifactRef, GroupId, MemberStatus, MirrorLocator, UserId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Connection settings for the Bot API
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    /// Base URL, e.g. `https://api.telegram.org`
    pub api_base: String,

    /// Bot token; never logged
    pub token: String,

    /// Transport-level timeout per HTTP request
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Map a Bot API `ChatMember.status` string
pub fn parse_member_status(status: &str) -> Option<MemberStatus> {
    match status {
        "creator" => Some(MemberStatus::Owner),
        "administrator" => Some(MemberStatus::Administrator),
        "member" => Some(MemberStatus::Member),
        "restricted" => Some(MemberStatus::Restricted),
        "left" => Some(MemberStatus::Left),
        "kicked" => Some(MemberStatus::Banned),
        _ => None,
    }
}

fn is_transient(error_code: Option<i64>) -> bool {
    matches!(error_code, Some(429) | Some(500..=599))
}

/// Oracle backed by the HTTP Bot API
pub struct BotApiOracle {
    http: reqwest::Client,
    endpoint: String,
}

impl BotApiOracle {
    pub fn new(config: BotApiConfig) -> OracleResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("HTTP client build failed: {e}")))?;

        let endpoint = format!("{}/bot{}", config.api_base.trim_end_matches('/'), config.token);

        Ok(Self { http, endpoint })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> OracleResult<T> {
        let url = format!("{}/{}", self.endpoint, method);

        // without_url keeps the token out of error strings
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.without_url().to_string()))?;

        let http_status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.without_url().to_string()))?;

        decode_envelope(method, http_status.as_u16(), envelope)
    }
}

fn decode_envelope<T>(method: &str, http_status: u16, envelope: Envelope<T>) -> OracleResult<T> {
    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| OracleError::Decode(format!("{method}: ok response without result")));
    }

    let description = envelope
        .description
        .unwrap_or_else(|| format!("{method} failed with HTTP {http_status}"));
    debug!(method, http_status, error_code = ?envelope.error_code, "Bot API call refused");

    if is_transient(envelope.error_code) || http_status >= 500 {
        Err(OracleError::Unavailable(description))
    } else {
        Err(OracleError::Rejected(description))
    }
}

#[async_trait]
impl MembershipOracle for BotApiOracle {
    async fn member_status(&self, group_id: GroupId, user_id: UserId) -> OracleResult<MemberStatus> {
        let member: ChatMember = self
            .call("getChatMember", json!({ "chat_id": group_id.0, "user_id": user_id.0 }))
            .await?;

        parse_member_status(&member.status)
            .ok_or_else(|| OracleError::Decode(format!("unknown member status '{}'", member.status)))
    }

    async fn validate_group(&self, group_id: GroupId) -> OracleResult<bool> {
        match self
            .call::<serde_json::Value>("getChat", json!({ "chat_id": group_id.0 }))
            .await
        {
            Ok(_) => Ok(true),
            Err(OracleError::Rejected(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_mirror(
        &self,
        storage_group: GroupId,
        locator: MirrorLocator,
    ) -> OracleResult<bool> {
        self.call(
            "deleteMessage",
            json!({ "chat_id": storage_group.0, "message_id": locator.0 }),
        )
        .await
    }

    async fn send_artifact(
        &self,
        destination: i64,
        artifact: &ArtifactRef,
        caption: Option<&str>,
    ) -> OracleResult<MirrorLocator> {
        let mut body = json!({ "chat_id": destination, "video": artifact.as_str() });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }

        let sent: SentMessage = self.call("sendVideo", body).await?;
        Ok(MirrorLocator(sent.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member_status() {
        assert_eq!(parse_member_status("creator"), Some(MemberStatus::Owner));
        assert_eq!(parse_member_status("administrator"), Some(MemberStatus::Administrator));
        assert_eq!(parse_member_status("member"), Some(MemberStatus::Member));
        assert_eq!(parse_member_status("restricted"), Some(MemberStatus::Restricted));
        assert_eq!(parse_member_status("left"), Some(MemberStatus::Left));
        assert_eq!(parse_member_status("kicked"), Some(MemberStatus::Banned));
        assert_eq!(parse_member_status("owner"), None);
    }

    #[test]
    fn test_decode_ok_envelope() {
        let envelope: Envelope<ChatMember> =
            serde_json::from_str(r#"{"ok":true,"result":{"status":"member","user":{"id":5}}}"#)
                .unwrap();

        let member = decode_envelope("getChatMember", 200, envelope).unwrap();
        assert_eq!(member.status, "member");
    }

    #[test]
    fn test_decode_rejected_envelope() {
        let envelope: Envelope<ChatMember> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();

        let err = decode_envelope("getChatMember", 400, envelope).unwrap_err();
        assert_eq!(err, OracleError::Rejected("Bad Request: chat not found".to_string()));
    }

    #[test]
    fn test_decode_rate_limited_envelope_is_transient() {
        let envelope: Envelope<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3"}"#,
        )
        .unwrap();

        let err = decode_envelope("sendVideo", 429, envelope).unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let oracle = BotApiOracle::new(BotApiConfig {
            api_base: "https://api.example.org/".to_string(),
            token: "123:abc".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(oracle.endpoint, "https://api.example.org/bot123:abc");
    }
}
