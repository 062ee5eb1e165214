//! Events consumed from the protocol decoder.
//!
//! The transport and line tokenizer are external collaborators: they
//! turn raw lines into one structured event at a time and are required
//! to deliver events for a session strictly sequentially. This module
//! defines that event vocabulary. Message bodies never appear here; the
//! tracker only reads identity and mode-change information.

/// The `nick!user@host` origin of a server notification.
///
/// `user` and `host` are optional because servers omit them in some
/// replies; whatever is present is merged into the session-scope
/// identity record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Source {
    /// Nickname, possibly in arbitrary case.
    pub nick: String,
    /// Username (ident), if the server sent one.
    pub user: Option<String>,
    /// Hostname, if the server sent one.
    pub host: Option<String>,
}

impl Source {
    /// Source carrying only a nickname.
    pub fn nick_only(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: None,
            host: None,
        }
    }

    /// Source with all three components.
    pub fn new(
        nick: impl Into<String>,
        user: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            nick: nick.into(),
            user: Some(user.into()),
            host: Some(host.into()),
        }
    }
}

/// One membership-affecting server notification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum Event {
    /// A user joined a channel.
    Join {
        /// Target channel.
        channel: String,
        /// Who joined.
        source: Source,
    },
    /// A user left a channel.
    Part {
        /// Target channel.
        channel: String,
        /// Who left.
        nick: String,
    },
    /// A user was kicked from a channel.
    Kick {
        /// Target channel.
        channel: String,
        /// Who was kicked (not the kicker).
        nick: String,
    },
    /// A user disconnected from the network; removed from every channel.
    Quit {
        /// Who quit.
        nick: String,
    },
    /// A user changed nickname. Channel status is untouched.
    Nick {
        /// Previous nickname.
        old: String,
        /// New nickname.
        new: String,
    },
    /// A channel MODE change.
    Mode {
        /// Target channel.
        channel: String,
        /// The raw mode token, e.g. `+ov-k`.
        modes: String,
        /// The remaining whitespace-separated arguments.
        args: String,
    },
    /// Start of a NAMES snapshot for a channel.
    NamesBegin {
        /// Target channel.
        channel: String,
    },
    /// One NAMES reply line: nicknames, each optionally carrying leading
    /// rank glyphs (`@+nick` under multi-prefix).
    NamesEntry {
        /// Target channel.
        channel: String,
        /// The names on this reply line.
        names: Vec<String>,
    },
    /// End of a NAMES snapshot; roster entries not restated by the
    /// snapshot are removed.
    NamesEnd {
        /// Target channel.
        channel: String,
    },
    /// A channel message was observed from a member. Only the fact of
    /// activity is recorded, never the body.
    Message {
        /// Target channel.
        channel: String,
        /// The sender.
        nick: String,
    },
    /// Fresh identity details for a nickname, e.g. from a WHO or WHOIS
    /// reply. Merged into the existing identity; ignored for nicknames
    /// not on any tracked channel.
    UserInfo {
        /// The nickname the details belong to.
        nick: String,
        /// Username (ident), if learned.
        user: Option<String>,
        /// Hostname, if learned.
        host: Option<String>,
        /// Realname/GECOS, if learned.
        realname: Option<String>,
        /// Free-form info string, if learned.
        info: Option<String>,
    },
    /// The local user left or closed a channel; the entire roster is
    /// discarded.
    ChannelClosed {
        /// The channel being closed.
        channel: String,
    },
}
