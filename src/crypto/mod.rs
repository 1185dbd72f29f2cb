/// Key material for claim signing
///
/// Ed25519 key pairs with nkey text encoding (role prefix, base32, CRC16).
pub mod nkey;

pub use nkey::{KeyPair, KeyRole, NkeyError};
