//! Pure countdown logic with no platform dependencies.
//! Testable on host, shared by every dashboard instance.
//!
//! A raw timer value is parsed into seconds, latched to the wall clock as a
//! [`CountdownAnchor`], and can travel to another instance as a signed
//! handoff token embedded in a link.

pub mod duration;
pub mod latch;
pub mod link;
pub mod render;
pub mod token;

pub use duration::{extract_timer, parse, ParsedDuration};
pub use latch::{latch, AnchorStore, CountdownAnchor, SessionKey};
pub use link::{build_link, parse_link, InboundParams};
pub use render::{format_hms, is_finished, progress, remaining};
pub use token::{decode, encode, HandoffPayload, Signer, TokenError, DEFAULT_TOKEN_TTL};
