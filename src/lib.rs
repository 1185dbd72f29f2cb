//! claimchat - presence and chat over a pub/sub bus with signed claims
//!
//! Every message is a JWT signed with the sender's user nkey, so any
//! participant can verify who said what without a central service.
//!
//! Key principles:
//! - Claims are the unit of identity and authenticity
//! - At-most-once application of every post, whatever the bus delivers
//! - One lock around all shared state, never held across I/O
//! - History lives in memory only

pub mod bus;
pub mod claims;
pub mod coordinator;
pub mod crypto;
pub mod directory;
pub mod identity;
pub mod presence;
pub mod session;
pub mod ui;
