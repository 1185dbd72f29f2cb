//! Presence and post claims

use super::codec::{Claim, ClaimError};
use crate::crypto::nkey::{self, KeyRole, NkeyError};
use std::time::Duration;
use uuid::Uuid;

pub const PRESENCE_CLAIM_TYPE: &str = "chat-presence";
pub const POST_CLAIM_TYPE: &str = "chat-post";

/// Tag marking the first presence announcement after startup.
pub const NEW_TAG: &str = "new";

/// Liveness announcement. Subject and issuer are the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceClaim {
    pub issuer: String,
    pub name: String,
    pub expires: i64,
    pub is_new: bool,
}

impl PresenceClaim {
    pub fn new(issuer: &str, name: &str, now: i64, interval: Duration, is_new: bool) -> Self {
        Self {
            issuer: issuer.to_string(),
            name: name.to_string(),
            expires: now + interval.as_secs() as i64,
            is_new,
        }
    }

    pub fn to_claim(&self, now: i64, audience: Option<&str>) -> Claim {
        Claim {
            jti: Uuid::new_v4().simple().to_string(),
            iat: now,
            iss: self.issuer.clone(),
            sub: self.issuer.clone(),
            name: self.name.clone(),
            aud: audience.map(str::to_string),
            exp: Some(self.expires),
            claim_type: PRESENCE_CLAIM_TYPE.to_string(),
            tags: if self.is_new {
                vec![NEW_TAG.to_string()]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }
}

impl TryFrom<Claim> for PresenceClaim {
    type Error = ClaimError;

    fn try_from(claim: Claim) -> Result<Self, Self::Error> {
        expect_type(&claim, PRESENCE_CLAIM_TYPE)?;
        expect_user_issuer(&claim)?;
        if claim.sub != claim.iss {
            return Err(ClaimError::SubjectMismatch {
                iss: claim.iss,
                sub: claim.sub,
            });
        }

        let is_new = claim.has_tag(NEW_TAG);
        Ok(Self {
            issuer: claim.iss,
            name: claim.name,
            expires: claim.exp.unwrap_or_default(),
            is_new,
        })
    }
}

/// A channel post or direct message.
///
/// `conversation` is the channel name for channel posts and the recipient's
/// subject for direct messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostClaim {
    pub id: String,
    pub issuer: String,
    pub conversation: String,
    pub body: String,
    pub timestamp: i64,
}

impl PostClaim {
    /// New outbound post with a fresh unique id.
    pub fn new(issuer: &str, conversation: &str, body: &str, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            issuer: issuer.to_string(),
            conversation: conversation.to_string(),
            body: body.to_string(),
            timestamp: now,
        }
    }

    pub fn to_claim(&self, audience: Option<&str>) -> Claim {
        Claim {
            jti: self.id.clone(),
            iat: self.timestamp,
            iss: self.issuer.clone(),
            sub: self.conversation.clone(),
            aud: audience.map(str::to_string),
            claim_type: POST_CLAIM_TYPE.to_string(),
            body: Some(self.body.clone()),
            ..Default::default()
        }
    }
}

impl TryFrom<Claim> for PostClaim {
    type Error = ClaimError;

    fn try_from(claim: Claim) -> Result<Self, Self::Error> {
        expect_type(&claim, POST_CLAIM_TYPE)?;
        expect_user_issuer(&claim)?;
        let body = claim.body.ok_or(ClaimError::MissingField("body"))?;

        Ok(Self {
            id: claim.jti,
            issuer: claim.iss,
            conversation: claim.sub,
            body,
            timestamp: claim.iat,
        })
    }
}

fn expect_type(claim: &Claim, expected: &'static str) -> Result<(), ClaimError> {
    if claim.kind() != expected {
        return Err(ClaimError::WrongType {
            expected,
            got: claim.kind().to_string(),
        });
    }
    Ok(())
}

fn expect_user_issuer(claim: &Claim) -> Result<(), ClaimError> {
    let (role, _) = nkey::decode_public(&claim.iss).map_err(ClaimError::InvalidIssuer)?;
    if role != KeyRole::User {
        return Err(ClaimError::InvalidIssuer(NkeyError::UnexpectedRole {
            expected: KeyRole::User,
            got: role,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::codec::{decode, encode};
    use crate::crypto::KeyPair;

    #[test]
    fn test_presence_round_trip_through_signed_claim() {
        let key = KeyPair::generate(KeyRole::User).unwrap();
        let presence =
            PresenceClaim::new(key.public_key(), "alice", 1_000, Duration::from_secs(60), true);

        let token = encode(&presence.to_claim(1_000, None), &key).unwrap();
        let decoded = PresenceClaim::try_from(decode(&token).unwrap()).unwrap();

        assert_eq!(decoded, presence);
        assert_eq!(decoded.expires, 1_060);
    }

    #[test]
    fn test_heartbeat_presence_has_no_new_tag() {
        let claim =
            PresenceClaim::new("UKEY", "alice", 0, Duration::from_secs(60), false).to_claim(0, None);
        assert!(claim.tags.is_empty());
    }

    #[test]
    fn test_presence_about_someone_else_is_rejected() {
        let key = KeyPair::generate(KeyRole::User).unwrap();
        let other = KeyPair::generate(KeyRole::User).unwrap();
        let mut claim = PresenceClaim::new(key.public_key(), "alice", 0, Duration::from_secs(60), false)
            .to_claim(0, None);
        claim.sub = other.public_key().to_string();

        let decoded = decode(&encode(&claim, &key).unwrap()).unwrap();
        assert!(matches!(
            PresenceClaim::try_from(decoded),
            Err(ClaimError::SubjectMismatch { .. })
        ));
    }

    #[test]
    fn test_post_rejects_presence_type() {
        let key = KeyPair::generate(KeyRole::User).unwrap();
        let claim = PresenceClaim::new(key.public_key(), "alice", 0, Duration::from_secs(60), false)
            .to_claim(0, None);
        let decoded = decode(&encode(&claim, &key).unwrap()).unwrap();

        assert!(matches!(
            PostClaim::try_from(decoded),
            Err(ClaimError::WrongType { expected: POST_CLAIM_TYPE, .. })
        ));
    }

    #[test]
    fn test_post_requires_body() {
        let key = KeyPair::generate(KeyRole::User).unwrap();
        let mut claim = PostClaim::new(key.public_key(), "general", "hi", 5).to_claim(None);
        claim.body = None;
        let decoded = decode(&encode(&claim, &key).unwrap()).unwrap();

        assert!(matches!(
            PostClaim::try_from(decoded),
            Err(ClaimError::MissingField("body"))
        ));
    }

    #[test]
    fn test_post_from_account_key_is_rejected() {
        let key = KeyPair::generate(KeyRole::Account).unwrap();
        let claim = PostClaim::new(key.public_key(), "general", "hi", 5).to_claim(None);
        let decoded = decode(&encode(&claim, &key).unwrap()).unwrap();

        assert!(matches!(
            PostClaim::try_from(decoded),
            Err(ClaimError::InvalidIssuer(NkeyError::UnexpectedRole { .. }))
        ));
    }

    #[test]
    fn test_new_posts_get_distinct_ids() {
        let a = PostClaim::new("UKEY", "general", "hi", 0);
        let b = PostClaim::new("UKEY", "general", "hi", 0);
        assert_ne!(a.id, b.id);
    }
}
