//! # irc-roster
//!
//! Sans-IO channel membership and MODE state tracking for IRC client
//! sessions.
//!
//! One [`Session`] maintains the authoritative in-memory picture of
//! "who is on what channel, with what privileges" for a single live
//! connection. It consumes one decoded server notification at a time
//! ([`Event`]) and keeps a shared [`Identity`] per nickname at session
//! scope plus one membership record per (channel, nickname) pair,
//! under the network's negotiated case-insensitivity rules.
//!
//! ## Features
//!
//! - RFC 1459 / strict-rfc1459 / ascii case folding per `CASEMAPPING`
//! - `PREFIX`-driven rank letters and glyphs with a sane fallback
//! - MODE string parsing into an ordered change-set
//! - Reference-counted identity lifecycle and atomic rename
//! - NAMES snapshot reconciliation via a seen-set diff
//! - Change notifications for a presentation layer
//!
//! ## Quick Start
//!
//! ```rust
//! use irc_roster::{Event, Session, SessionConfig, Source};
//!
//! let mut session = Session::new(SessionConfig {
//!     casemapping: Some("rfc1459".to_string()),
//!     prefix: Some("(qaohv)~&@%+".to_string()),
//! });
//!
//! session
//!     .apply(&Event::Join {
//!         channel: "#rust".to_string(),
//!         source: Source::new("alice", "al", "host.example.com"),
//!     })
//!     .unwrap();
//! session
//!     .apply(&Event::Mode {
//!         channel: "#rust".to_string(),
//!         modes: "+o".to_string(),
//!         args: "alice".to_string(),
//!     })
//!     .unwrap();
//!
//! assert!(session.is_op("#rust", "ALICE"));
//! ```
//!
//! This crate performs no I/O: the transport, line tokenizer, and
//! ISUPPORT negotiation are external collaborators, and events for one
//! session must be delivered strictly sequentially.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod error;
pub mod event;
pub mod mode;
pub mod prefix;
pub mod roster;
pub mod session;
mod user;

pub use self::casemap::CaseMapping;
pub use self::error::{Result, TrackError};
pub use self::event::{Event, Source};
pub use self::mode::{ModeArg, ModeChangeSet, Polarity};
pub use self::prefix::{PrefixTable, Rank};
pub use self::roster::{ChannelMembership, MemberStatus};
pub use self::session::{
    ChangeKind, Member, RosterChange, RosterObserver, Session, SessionConfig,
};
pub use self::user::{Identity, UserAttrs, UserId};
