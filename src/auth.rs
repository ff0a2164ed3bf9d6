use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use serde::Deserialize;

use crate::error::AuthError;

pub const CHANNEL_AUTH_PATH: &str = "/pusher/auth";

#[derive(Deserialize)]
struct TokenClaims {
    user_id: i64,
}

// Identity derived from the platform bearer token. The token is opaque to
// everything else in the crate; only the user_id claim is read, and only to
// name the private channel and to tell own messages from incoming ones.
#[derive(Clone, Debug)]
pub struct AuthContext {
    user_id: i64,
    bearer_token: String,
}

impl AuthContext {
    pub fn from_bearer_token(token: &str) -> Result<Self, AuthError> {
        let payload = token.split('.').nth(1).ok_or(AuthError::MalformedToken)?;
        let raw = decode_segment(payload)?;
        let claims: TokenClaims = serde_json::from_slice(&raw)?;
        Ok(Self {
            user_id: claims.user_id,
            bearer_token: token.to_string(),
        })
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn is_self(&self, sender_id: i64) -> bool {
        sender_id == self.user_id
    }

    pub fn channel_name(&self) -> String {
        format!("private-user-{}", self.user_id)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
    match URL_SAFE_NO_PAD.decode(segment) {
        Ok(raw) => Ok(raw),
        // some token issuers emit standard-alphabet payloads
        Err(_) => Ok(STANDARD_NO_PAD.decode(segment.trim_end_matches('='))?),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelAuthorization {
    pub auth: String,
    #[serde(default)]
    pub channel_data: Option<String>,
}

pub async fn authorize_channel(
    http: &reqwest::Client,
    api_base_url: &str,
    auth: &AuthContext,
    socket_id: &str,
    channel_name: &str,
) -> Result<ChannelAuthorization, AuthError> {
    let url = format!("{}{}", api_base_url.trim_end_matches('/'), CHANNEL_AUTH_PATH);
    let response = http
        .post(url)
        .bearer_auth(auth.bearer_token())
        .form(&[("socket_id", socket_id), ("channel_name", channel_name)])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AuthError::Denied(response.status()));
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_for(claims: &str) -> String {
        format!("header.{}.signature", URL_SAFE_NO_PAD.encode(claims))
    }

    #[test]
    fn derives_user_id_from_token() {
        let auth = AuthContext::from_bearer_token(&token_for(r#"{"user_id":42}"#)).unwrap();
        assert_eq!(auth.user_id(), 42);
        assert_eq!(auth.channel_name(), "private-user-42");
        assert!(auth.is_self(42));
        assert!(!auth.is_self(7));
    }

    #[test]
    fn accepts_extra_claims() {
        let auth = AuthContext::from_bearer_token(&token_for(
            r#"{"sub":"u-42","user_id":9,"exp":1999999999}"#,
        ))
        .unwrap();
        assert_eq!(auth.user_id(), 9);
    }

    #[test]
    fn rejects_token_without_segments() {
        let err = AuthContext::from_bearer_token("not-a-token").unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[test]
    fn rejects_unparseable_payload() {
        assert!(AuthContext::from_bearer_token("a.!!!.c").is_err());
    }

    #[test]
    fn rejects_payload_without_user_id() {
        let err = AuthContext::from_bearer_token(&token_for(r#"{"sub":"x"}"#)).unwrap_err();
        assert!(matches!(err, AuthError::Claims(_)));
    }

    #[test]
    fn keeps_token_verbatim() {
        let token = token_for(r#"{"user_id":1}"#);
        let auth = AuthContext::from_bearer_token(&token).unwrap();
        assert_eq!(auth.bearer_token(), token);
    }
}
