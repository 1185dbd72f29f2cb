//! Local identity from a credentials bundle
//!
//! A bundle holds two dash-delimited sections: the user JWT (issued and
//! signed by an account) and the user's nkey seed.
//!
//! ```text
//! -----BEGIN NATS USER JWT-----
//! eyJ0eXAiOiJKV1QiLCJhbGciOiJlZDI1NTE5LW5rZXkifQ...
//! ------END NATS USER JWT------
//!
//! -----BEGIN USER NKEY SEED-----
//! SUAxxxxxxxx...
//! ------END USER NKEY SEED------
//! ```
//!
//! # Security
//!
//! The file contents and every intermediate copy of the seed live in
//! `Zeroizing` buffers and are wiped as soon as the key pair is derived.
//! Only `ring`'s key pair outlives `Identity::load`.

use crate::claims::{self, Claim, ClaimError};
use crate::crypto::nkey::{self, KeyPair, KeyRole, NkeyError};
use regex::bytes::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use zeroize::Zeroizing;

/// Longest display name shown to peers.
const MAX_NAME_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Could not read credentials '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Expected a user JWT and a seed, found {0} section(s)")]
    SectionCount(usize),

    #[error("Could not decode seed: {0}")]
    InvalidSeed(NkeyError),

    #[error("Seed is for a {0} key, expected a user key")]
    NotUserSeed(KeyRole),

    #[error("Could not decode user: {0}")]
    InvalidUserClaim(ClaimError),

    #[error("User claim subject {claim_subject} does not match seed {seed_public}")]
    KeyMismatch {
        claim_subject: String,
        seed_public: String,
    },
}

/// The local participant.
#[derive(Debug)]
pub struct Identity {
    user_claim: Claim,
    key: KeyPair,
}

impl Identity {
    /// Load and verify a credentials file.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let contents = Zeroizing::new(fs::read(path).map_err(|source| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        })?);
        Self::from_bundle(&contents)
    }

    /// Parse an in-memory bundle. See the module docs for the layout.
    pub fn from_bundle(contents: &[u8]) -> Result<Self, IdentityError> {
        let sections: Vec<&[u8]> = section_pattern()
            .captures_iter(contents)
            .filter_map(|caps| caps.get(1).map(|m| m.as_bytes()))
            .collect();
        if sections.len() != 2 {
            return Err(IdentityError::SectionCount(sections.len()));
        }

        let key = KeyPair::from_seed(sections[1]).map_err(IdentityError::InvalidSeed)?;
        if key.role() != KeyRole::User {
            return Err(IdentityError::NotUserSeed(key.role()));
        }

        let user_jwt = String::from_utf8_lossy(sections[0]);
        let user_claim = decode_user_claim(&user_jwt)?;
        if user_claim.sub != key.public_key() {
            return Err(IdentityError::KeyMismatch {
                claim_subject: user_claim.sub,
                seed_public: key.public_key().to_string(),
            });
        }

        Ok(Self { user_claim, key })
    }

    /// Public user nkey, the identity's address on the bus.
    pub fn subject(&self) -> &str {
        self.key.public_key()
    }

    /// Name from the user claim, as issued.
    pub fn claim_name(&self) -> &str {
        &self.user_claim.name
    }

    pub fn user_claim(&self) -> &Claim {
        &self.user_claim
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }
}

fn decode_user_claim(token: &str) -> Result<Claim, IdentityError> {
    let claim = claims::decode_validated(token, claims::unix_now(), None)
        .map_err(IdentityError::InvalidUserClaim)?;

    if claim.kind() != "user" {
        return Err(IdentityError::InvalidUserClaim(ClaimError::WrongType {
            expected: "user",
            got: claim.kind().to_string(),
        }));
    }
    let (role, _) = nkey::decode_public(&claim.sub)
        .map_err(|e| IdentityError::InvalidUserClaim(ClaimError::InvalidIssuer(e)))?;
    if role != KeyRole::User {
        return Err(IdentityError::InvalidUserClaim(ClaimError::InvalidIssuer(
            NkeyError::UnexpectedRole {
                expected: KeyRole::User,
                got: role,
            },
        )));
    }
    Ok(claim)
}

fn section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\s*(?:(?:-{3,}[^\n]*-{3,}\n)(.+)(?:\n\s*-{3,}[^\n]*-{3,}\n))")
            .expect("section pattern is a valid regex")
    })
}

/// Format a JWT and seed as a credentials bundle.
pub fn format_bundle(user_jwt: &str, seed: &str) -> Zeroizing<String> {
    Zeroizing::new(format!(
        "-----BEGIN NATS USER JWT-----\n{user_jwt}\n------END NATS USER JWT------\n\n\
         ************************* IMPORTANT *************************\n\
         NKEY Seed printed below can be used to sign and prove identity.\n\
         NKEYs are sensitive and should be treated as secrets.\n\n\
         -----BEGIN USER NKEY SEED-----\n{seed}\n------END USER NKEY SEED------\n\n\
         *************************************************************\n"
    ))
}

/// Short display name: first word, lowercased, at most 8 characters.
pub fn display_name(name: &str) -> String {
    name.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

/// Identity with fresh random keys, issued by a throwaway account.
#[cfg(test)]
pub(crate) fn test_identity() -> Identity {
    use ring::rand::{SecureRandom, SystemRandom};

    let mut seed = [0u8; 32];
    SystemRandom::new().fill(&mut seed).unwrap();
    let user = KeyPair::from_raw_seed(KeyRole::User, &seed).unwrap();
    let account = KeyPair::generate(KeyRole::Account).unwrap();
    let claim = Claim {
        jti: "test-user".to_string(),
        sub: user.public_key().to_string(),
        name: "Test User".to_string(),
        claim_type: "user".to_string(),
        ..Default::default()
    };
    let jwt = claims::encode(&claim, &account).unwrap();
    let bundle = format_bundle(&jwt, &nkey::encode_seed(KeyRole::User, &seed));
    Identity::from_bundle(bundle.as_bytes()).unwrap()
}
