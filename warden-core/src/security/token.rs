//! Time-boxed, revocable capability tokens
//!
//! Validity is computed on read; there is no background sweep. A token is
//! live while it is not revoked and the current time is before `expires_at`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::ToolCapabilities;
use super::classifier::PermissionLevel;
use crate::error::TokenError;

/// Grant to invoke one tool on behalf of one caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub id: Uuid,
    pub tool_id: String,
    pub context_id: String,
    pub capabilities: ToolCapabilities,
    /// Level the grant was issued at
    pub permission: PermissionLevel,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    uses: u64,
    revoked: bool,
    revocation_reason: Option<String>,
    /// Ledger sequence number of the bypass that paid for this token
    pub bypass_event: Option<u64>,
}

impl CapabilityToken {
    /// Issue a token valid for `duration_seconds` from now
    ///
    /// A non-positive duration yields a token that is already expired. An
    /// expiry past the representable range is clamped to it.
    pub fn issue(
        tool_id: impl Into<String>,
        context_id: impl Into<String>,
        capabilities: ToolCapabilities,
        permission: PermissionLevel,
        duration_seconds: i64,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tool_id: tool_id.into(),
            context_id: context_id.into(),
            capabilities,
            permission,
            issued_at,
            expires_at: expiry(issued_at, duration_seconds),
            uses: 0,
            revoked: false,
            revocation_reason: None,
            bypass_event: None,
        }
    }

    /// Link the token to the ledger event that funded it
    pub fn with_bypass_event(mut self, seq: u64) -> Self {
        self.bypass_event = Some(seq);
        self
    }

    /// Not revoked and not yet expired
    pub fn is_valid(&self) -> bool {
        !self.revoked && Utc::now() < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Number of successful uses so far
    pub fn uses(&self) -> u64 {
        self.uses
    }

    pub fn revocation_reason(&self) -> Option<&str> {
        self.revocation_reason.as_deref()
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> std::time::Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or_default()
    }

    /// Record one use of the token
    ///
    /// Revocation is checked first: a revoked token always reports
    /// [`TokenError::Revoked`] even if it has also expired.
    pub fn use_token(&mut self) -> Result<(), TokenError> {
        if self.revoked {
            return Err(TokenError::Revoked {
                reason: self.revocation_reason.clone().unwrap_or_default(),
            });
        }
        if Utc::now() >= self.expires_at {
            return Err(TokenError::Expired);
        }
        self.uses += 1;
        Ok(())
    }

    /// Permanently revoke the token; the first reason is kept
    pub fn revoke(&mut self, reason: impl Into<String>) {
        if self.revoked {
            return;
        }
        self.revoked = true;
        self.revocation_reason = Some(reason.into());
    }
}

fn expiry(issued_at: DateTime<Utc>, duration_seconds: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(duration_seconds)
        .and_then(|delta| issued_at.checked_add_signed(delta))
        .unwrap_or(if duration_seconds > 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(duration_seconds: i64) -> CapabilityToken {
        CapabilityToken::issue(
            "tool",
            "agent",
            ToolCapabilities::none(),
            PermissionLevel::AllowedAudited,
            duration_seconds,
        )
    }

    #[test]
    fn test_fresh_token_is_valid() {
        let mut token = token(60);
        assert!(token.is_valid());
        assert!(token.remaining() > std::time::Duration::from_secs(50));

        token.use_token().unwrap();
        token.use_token().unwrap();
        assert_eq!(token.uses(), 2);
    }

    #[test]
    fn test_zero_duration_is_expired() {
        let mut token = token(0);
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(!token.is_valid());
        assert!(token.is_expired());
        assert_eq!(token.use_token(), Err(TokenError::Expired));
        assert_eq!(token.uses(), 0);
        assert_eq!(token.remaining(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_extreme_durations_are_clamped() {
        let mut far = token(i64::MAX / 2);
        assert_eq!(far.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(far.is_valid());
        assert!(far.remaining() > std::time::Duration::from_secs(86_400 * 365));
        far.use_token().unwrap();

        let max = token(i64::MAX);
        assert_eq!(max.expires_at, DateTime::<Utc>::MAX_UTC);

        let past = token(i64::MIN);
        assert_eq!(past.expires_at, DateTime::<Utc>::MIN_UTC);
        assert!(!past.is_valid());
    }

    #[test]
    fn test_negative_duration_is_expired() {
        let token = token(-30);
        assert!(!token.is_valid());
    }

    #[test]
    fn test_use_after_revoke_fails() {
        let mut token = token(3600);
        token.use_token().unwrap();
        token.revoke("session ended");

        assert!(!token.is_valid());
        assert_eq!(
            token.use_token(),
            Err(TokenError::Revoked {
                reason: "session ended".to_string()
            })
        );
        assert_eq!(token.uses(), 1);
    }

    #[test]
    fn test_revoked_and_expired_reports_revoked() {
        let mut token = token(0);
        token.revoke("done");
        assert!(matches!(token.use_token(), Err(TokenError::Revoked { .. })));
    }

    #[test]
    fn test_second_revoke_keeps_first_reason() {
        let mut token = token(60);
        token.revoke("first");
        token.revoke("second");

        assert!(token.is_revoked());
        assert_eq!(token.revocation_reason(), Some("first"));
    }
}
