//! Per-channel membership records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::prefix::Rank;
use crate::user::UserId;

/// Membership status flags for one user on one channel.
///
/// Five independent booleans, not a single level: a network may grant a
/// user several ranks on the same channel simultaneously.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberStatus {
    /// +q (~)
    pub owner: bool,
    /// +a (&)
    pub admin: bool,
    /// +o (@)
    pub op: bool,
    /// +h (%)
    pub half_op: bool,
    /// +v (+)
    pub voice: bool,
}

impl MemberStatus {
    /// Status with every flag clear.
    pub fn none() -> Self {
        Self::default()
    }

    /// Status with exactly the given ranks set.
    pub fn from_ranks(ranks: &[Rank]) -> Self {
        let mut status = Self::default();
        for &rank in ranks {
            status.set(rank, true);
        }
        status
    }

    /// Set or clear one rank flag.
    pub fn set(&mut self, rank: Rank, on: bool) {
        match rank {
            Rank::Owner => self.owner = on,
            Rank::Admin => self.admin = on,
            Rank::Op => self.op = on,
            Rank::HalfOp => self.half_op = on,
            Rank::Voice => self.voice = on,
        }
    }

    /// Read one rank flag.
    pub fn has(&self, rank: Rank) -> bool {
        match rank {
            Rank::Owner => self.owner,
            Rank::Admin => self.admin,
            Rank::Op => self.op,
            Rank::HalfOp => self.half_op,
            Rank::Voice => self.voice,
        }
    }

    /// The highest set rank, if any.
    /// Priority: owner > admin > op > halfop > voice.
    pub fn highest(&self) -> Option<Rank> {
        if self.owner {
            Some(Rank::Owner)
        } else if self.admin {
            Some(Rank::Admin)
        } else if self.op {
            Some(Rank::Op)
        } else if self.half_op {
            Some(Rank::HalfOp)
        } else if self.voice {
            Some(Rank::Voice)
        } else {
            None
        }
    }

    /// True if the member holds op or a higher rank.
    pub fn has_op_or_higher(&self) -> bool {
        self.owner || self.admin || self.op
    }

    /// True if the member can speak in a moderated channel.
    pub fn has_voice_or_higher(&self) -> bool {
        self.owner || self.admin || self.op || self.half_op || self.voice
    }
}

/// One (channel, nickname) membership: a reference to the session-scope
/// identity plus this channel's status flags and activity timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelMembership {
    /// Handle of the identity this membership references.
    pub user: UserId,
    /// This channel's rank flags for the user.
    pub status: MemberStatus,
    /// When the user last spoke on this channel, if ever observed.
    /// Used only for recency sorting by the presentation layer.
    pub last_activity: Option<DateTime<Utc>>,
}

impl ChannelMembership {
    pub(crate) fn new(user: UserId) -> Self {
        Self {
            user,
            status: MemberStatus::none(),
            last_activity: None,
        }
    }
}

/// The membership map for one joined channel, keyed by folded nickname,
/// plus the channel-level limit/key state and the in-flight NAMES
/// snapshot bookkeeping.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChannelRoster {
    /// Display name of the channel, as first seen.
    pub(crate) name: String,
    /// Memberships keyed by folded nickname.
    pub(crate) members: HashMap<String, ChannelMembership>,
    /// Channel user limit (+l), if set.
    pub(crate) limit: Option<u32>,
    /// Channel key (+k), if set.
    pub(crate) key: Option<String>,
    /// Folded nicknames restated by the NAMES snapshot in progress.
    /// `None` when no snapshot is open.
    pub(crate) seen: Option<HashSet<String>>,
}

impl ChannelRoster {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}
