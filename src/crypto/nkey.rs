//! Ed25519 nkeys: role-prefixed, CRC-checked base32 keys
//!
//! Public keys and seeds travel as base32 text (RFC 4648 alphabet, no
//! padding):
//!
//! ```text
//! public: base32( role_prefix | pubkey[32] | crc16_le )          "U..."
//! seed:   base32( seed_prefix | role_bits | seed[32] | crc16_le ) "SU..."
//! ```
//!
//! The CRC is CRC-16/XMODEM over everything before it. Signing and
//! verification use `ring`'s Ed25519 implementation.

use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair as _, UnparsedPublicKey, ED25519};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// First byte of every encoded seed (renders as 'S').
const PREFIX_BYTE_SEED: u8 = 18 << 3;

/// Length of a raw Ed25519 seed or public key.
const KEY_LEN: usize = 32;

/// Errors decoding or using nkey material
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NkeyError {
    #[error("Invalid base32 encoding")]
    InvalidEncoding,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Checksum mismatch")]
    InvalidChecksum,

    #[error("Invalid key prefix")]
    InvalidPrefix,

    #[error("Expected a {expected} key, got a {got} key")]
    UnexpectedRole { expected: KeyRole, got: KeyRole },

    #[error("Key material rejected by signer")]
    RejectedKey,

    #[error("Random number generator failure")]
    Rng,

    #[error("Signature verification failed")]
    InvalidSignature,
}

/// What a public key identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Operator,
    Account,
    User,
    Server,
    Cluster,
}

impl KeyRole {
    fn prefix_byte(self) -> u8 {
        match self {
            KeyRole::Operator => 14 << 3,
            KeyRole::Account => 0,
            KeyRole::User => 20 << 3,
            KeyRole::Server => 13 << 3,
            KeyRole::Cluster => 2 << 3,
        }
    }

    fn from_prefix_byte(byte: u8) -> Option<Self> {
        [
            KeyRole::Operator,
            KeyRole::Account,
            KeyRole::User,
            KeyRole::Server,
            KeyRole::Cluster,
        ]
        .into_iter()
        .find(|role| role.prefix_byte() == byte)
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyRole::Operator => "operator",
            KeyRole::Account => "account",
            KeyRole::User => "user",
            KeyRole::Server => "server",
            KeyRole::Cluster => "cluster",
        };
        f.write_str(name)
    }
}

/// Ed25519 signing key pair bound to a role.
///
/// The seed is never stored; only `ring`'s key pair is kept.
pub struct KeyPair {
    role: KeyRole,
    inner: Ed25519KeyPair,
    public: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("role", &self.role)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Decode an encoded seed (`S...`) into a key pair.
    pub fn from_seed(encoded: &[u8]) -> Result<Self, NkeyError> {
        let raw = Zeroizing::new(base32_decode(trim_ascii(encoded))?);
        let body = verify_checksum(&raw)?;

        if body.len() != 2 + KEY_LEN {
            return Err(NkeyError::InvalidLength {
                expected: 2 + KEY_LEN,
                got: body.len(),
            });
        }
        if body[0] & 0xF8 != PREFIX_BYTE_SEED {
            return Err(NkeyError::InvalidPrefix);
        }
        let role_byte = ((body[0] & 0x07) << 5) | ((body[1] & 0xF8) >> 3);
        let role = KeyRole::from_prefix_byte(role_byte).ok_or(NkeyError::InvalidPrefix)?;

        Self::from_raw_seed(role, &body[2..])
    }

    /// Build a key pair from 32 raw seed bytes.
    pub fn from_raw_seed(role: KeyRole, seed: &[u8]) -> Result<Self, NkeyError> {
        if seed.len() != KEY_LEN {
            return Err(NkeyError::InvalidLength {
                expected: KEY_LEN,
                got: seed.len(),
            });
        }
        let inner = Ed25519KeyPair::from_seed_unchecked(seed).map_err(|_| NkeyError::RejectedKey)?;
        let public = encode_public(role, inner.public_key().as_ref());
        Ok(Self {
            role,
            inner,
            public,
        })
    }

    /// Generate a fresh key pair from the system RNG.
    pub fn generate(role: KeyRole) -> Result<Self, NkeyError> {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        SystemRandom::new()
            .fill(&mut seed[..])
            .map_err(|_| NkeyError::Rng)?;
        Self::from_raw_seed(role, &seed[..])
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Encoded public key, e.g. `UABC...`
    pub fn public_key(&self) -> &str {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).as_ref().to_vec()
    }
}

/// Encode a raw seed for the given role as an `S...` string.
///
/// Only credential tooling and tests need this; the running client never
/// re-encodes its seed.
pub fn encode_seed(role: KeyRole, seed: &[u8; KEY_LEN]) -> Zeroizing<String> {
    let prefix = role.prefix_byte();
    let mut raw = Zeroizing::new(Vec::with_capacity(2 + KEY_LEN + 2));
    raw.push(PREFIX_BYTE_SEED | (prefix >> 5));
    raw.push((prefix & 0x1F) << 3);
    raw.extend_from_slice(seed);
    let crc = crc16(&raw);
    raw.extend_from_slice(&crc.to_le_bytes());
    Zeroizing::new(base32_encode(&raw))
}

/// Encode a raw Ed25519 public key for the given role.
pub fn encode_public(role: KeyRole, key: &[u8]) -> String {
    let mut raw = Vec::with_capacity(1 + key.len() + 2);
    raw.push(role.prefix_byte());
    raw.extend_from_slice(key);
    let crc = crc16(&raw);
    raw.extend_from_slice(&crc.to_le_bytes());
    base32_encode(&raw)
}

/// Decode an encoded public key into its role and raw bytes.
pub fn decode_public(encoded: &str) -> Result<(KeyRole, [u8; KEY_LEN]), NkeyError> {
    let raw = base32_decode(encoded.as_bytes())?;
    let body = verify_checksum(&raw)?;

    if body.len() != 1 + KEY_LEN {
        return Err(NkeyError::InvalidLength {
            expected: 1 + KEY_LEN,
            got: body.len(),
        });
    }
    let role = KeyRole::from_prefix_byte(body[0]).ok_or(NkeyError::InvalidPrefix)?;
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&body[1..]);
    Ok((role, key))
}

/// Verify `signature` over `message` against an encoded public key.
pub fn verify(public: &str, message: &[u8], signature: &[u8]) -> Result<KeyRole, NkeyError> {
    let (role, key) = decode_public(public)?;
    UnparsedPublicKey::new(&ED25519, key)
        .verify(message, signature)
        .map_err(|_| NkeyError::InvalidSignature)?;
    Ok(role)
}

fn verify_checksum(raw: &[u8]) -> Result<&[u8], NkeyError> {
    if raw.len() < 3 {
        return Err(NkeyError::InvalidLength {
            expected: 3,
            got: raw.len(),
        });
    }
    let (body, crc) = raw.split_at(raw.len() - 2);
    if crc16(body).to_le_bytes() != [crc[0], crc[1]] {
        return Err(NkeyError::InvalidChecksum);
    }
    Ok(body)
}

/// CRC-16/XMODEM (poly 0x1021, init 0).
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn base32_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u64 = 0;
    let mut bits_left = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_left += 8;

        while bits_left >= 5 {
            bits_left -= 5;
            let idx = ((buffer >> bits_left) & 0x1f) as usize;
            result.push(ALPHABET[idx] as char);
        }
    }

    if bits_left > 0 {
        let idx = ((buffer << (5 - bits_left)) & 0x1f) as usize;
        result.push(ALPHABET[idx] as char);
    }

    result
}

fn base32_decode(text: &[u8]) -> Result<Vec<u8>, NkeyError> {
    let mut result = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_left = 0;

    for &ch in text.iter().take_while(|&&c| c != b'=') {
        let value = ALPHABET
            .iter()
            .position(|&a| a == ch)
            .ok_or(NkeyError::InvalidEncoding)? as u64;
        buffer = (buffer << 5) | value;
        bits_left += 5;

        if bits_left >= 8 {
            bits_left -= 8;
            result.push((buffer >> bits_left) as u8);
            buffer &= (1 << bits_left) - 1;
        }
    }

    Ok(result)
}
