//! Signed claims
//!
//! Every presence announcement and post travels as a JWT signed by the
//! issuer's user nkey. The issuer's public key is the `iss` field itself, so
//! a claim carries everything needed to verify it.
//!
//! - `codec`: JWT encode/sign and decode/verify
//! - `validation`: blocking vs informational issues
//! - `types`: typed presence and post views over a verified claim

pub mod codec;
pub mod types;
pub mod validation;

pub use codec::{decode, decode_validated, encode, unix_now, Claim, ClaimError};
pub use types::{PostClaim, PresenceClaim, NEW_TAG, POST_CLAIM_TYPE, PRESENCE_CLAIM_TYPE};
pub use validation::{validate, Severity, ValidationIssue, ValidationResults};
