//! mg_keycard — keycard identity entries and trust chains
//!
//! A keycard is an ordered chain of identity entries for one owner (an
//! organization or an individual workspace). Each entry carries keys and
//! metadata, commits to its predecessor through a `Previous-Hash` field, and
//! is sealed by hash and signature fields applied in a fixed per-type order:
//!
//!   org entries:  Previous-Hash → Hash → Organization-Signature
//!   user entries: Organization-Signature → Previous-Hash → Hash → User-Signature
//!
//! A hash or signature covers every field that precedes it in the canonical
//! field order, so any modification to a sealed entry is detectable.
//!
//! # Modules
//! - `types`   — workspace IDs, user IDs, domains, workspace addresses
//! - `entry`   — one chain link: field validation, hashing, signing
//! - `keycard` — the chain: verification and extension ("chaining")

pub mod entry;
pub mod error;
pub mod keycard;
pub mod types;

pub use entry::{Entry, EntryType};
pub use error::KeycardError;
pub use keycard::{chain_next, Keycard};
pub use types::{Domain, MAddress, RandomID, UserID, WAddress};
