//! Room credential issuing.

use livekit_api::access_token::{AccessToken, VideoGrants};
use thiserror::Error;
use zeroize::Zeroize;

use super::base::RoomCredential;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("LiveKit API key and secret are not configured")]
    MissingCredentials,

    #[error("Invalid token request: {0}")]
    InvalidRequest(String),

    #[error("Failed to sign access token: {0}")]
    Signing(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

/// Issues room-access credentials for a participant identity.
pub trait TokenIssuer: Send + Sync {
    fn issue_token(&self, identity: &str, room_name: &str) -> TokenResult<RoomCredential>;
}

/// Signs LiveKit access tokens with an API key pair.
pub struct LiveKitTokenIssuer {
    api_key: String,
    api_secret: String,
}

impl LiveKitTokenIssuer {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> TokenResult<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(TokenError::MissingCredentials);
        }
        Ok(Self {
            api_key,
            api_secret,
        })
    }
}

impl TokenIssuer for LiveKitTokenIssuer {
    fn issue_token(&self, identity: &str, room_name: &str) -> TokenResult<RoomCredential> {
        if identity.is_empty() {
            return Err(TokenError::InvalidRequest("identity is empty".to_string()));
        }
        if room_name.is_empty() {
            return Err(TokenError::InvalidRequest("room name is empty".to_string()));
        }

        let jwt = AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(identity)
            .with_name(identity)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(RoomCredential::new(jwt))
    }
}

impl std::fmt::Debug for LiveKitTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveKitTokenIssuer")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl Drop for LiveKitTokenIssuer {
    fn drop(&mut self) {
        self.api_secret.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(matches!(
            LiveKitTokenIssuer::new("", "secret"),
            Err(TokenError::MissingCredentials)
        ));
        assert!(matches!(
            LiveKitTokenIssuer::new("key", ""),
            Err(TokenError::MissingCredentials)
        ));
    }

    #[test]
    fn test_issue_token_produces_jwt() {
        let issuer = LiveKitTokenIssuer::new("devkey", "a-long-enough-development-secret").unwrap();
        let credential = issuer.issue_token("voice-agent", "voice-room").unwrap();
        assert_eq!(credential.as_str().split('.').count(), 3);
    }

    #[test]
    fn test_empty_room_rejected() {
        let issuer = LiveKitTokenIssuer::new("devkey", "secret").unwrap();
        assert!(matches!(
            issuer.issue_token("user", ""),
            Err(TokenError::InvalidRequest(_))
        ));
    }
}
