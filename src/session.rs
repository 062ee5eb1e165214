//! The per-connection membership coordinator.
//!
//! A [`Session`] owns the identity registry and one roster per joined
//! channel, and interprets the membership-affecting event stream
//! against them. It is sans-IO and single-writer: the protocol decoder
//! must deliver events strictly sequentially, and no operation here
//! blocks or suspends. Queries return copy-on-read snapshots so a
//! presentation layer never observes a half-applied event.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::casemap::CaseMapping;
use crate::error::Result;
use crate::event::{Event, Source};
use crate::mode;
use crate::prefix::{PrefixTable, Rank};
use crate::roster::{ChannelMembership, ChannelRoster, MemberStatus};
use crate::user::{Identity, IdentityRegistry, UserAttrs};

/// ISUPPORT results handed over by the negotiation collaborator.
///
/// Both fields are the raw token values; anything absent or
/// unrecognized falls back (`rfc1459` case mapping, `(qaohv)~&@%+`
/// prefix table).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// The `CASEMAPPING` token value, e.g. `rfc1459`.
    pub casemapping: Option<String>,
    /// The `PREFIX` token value, e.g. `(qaohv)~&@%+`.
    pub prefix: Option<String>,
}

/// What kind of mutation a change notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ChangeKind {
    /// A member appeared on the roster.
    Joined,
    /// A member left the roster (PART, KICK, QUIT, or stale after a
    /// NAMES snapshot).
    Departed,
    /// A member changed nickname; status flags carried over.
    Renamed,
    /// A member's rank flags changed.
    StatusChanged,
    /// The channel limit or key changed.
    ChannelModeChanged,
    /// Identity details (username, hostname, realname, info) were
    /// refreshed for a member of this channel.
    AttrsChanged,
    /// A member's activity timestamp was refreshed.
    Activity,
    /// A NAMES snapshot finished reconciling this roster.
    Reconciled,
    /// The channel was closed and its roster discarded.
    Closed,
}

/// A change notification carrying the affected channel.
///
/// Fired after the mutation is fully applied; the presentation layer
/// re-reads whatever it renders. This core never touches presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RosterChange {
    /// Display name of the affected channel.
    pub channel: String,
    /// What happened.
    pub kind: ChangeKind,
}

/// Observer of roster mutations.
///
/// Implemented for any `FnMut(&RosterChange)`, so closures can be
/// registered directly.
pub trait RosterObserver {
    /// Called once per change, after the mutation committed.
    fn on_change(&mut self, change: &RosterChange);
}

impl<F: FnMut(&RosterChange)> RosterObserver for F {
    fn on_change(&mut self, change: &RosterChange) {
        self(change)
    }
}

/// Copy-on-read view of one channel member, resolved against the
/// session-scope identity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Display nickname.
    pub nick: String,
    /// Username (ident), if known.
    pub username: Option<String>,
    /// Hostname, if known.
    pub hostname: Option<String>,
    /// This channel's rank flags.
    pub status: MemberStatus,
    /// When the member last spoke on this channel, if observed.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Membership state for one live IRC connection.
pub struct Session {
    casemap: CaseMapping,
    prefixes: PrefixTable,
    users: IdentityRegistry,
    /// Rosters keyed by folded channel name.
    rosters: HashMap<String, ChannelRoster>,
    observers: Vec<Box<dyn RosterObserver>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// Create a session from negotiated ISUPPORT values.
    pub fn new(config: SessionConfig) -> Self {
        let casemap = config
            .casemapping
            .as_deref()
            .map(CaseMapping::from_isupport_token)
            .unwrap_or_default();
        let prefixes = config
            .prefix
            .as_deref()
            .map(PrefixTable::parse)
            .unwrap_or_default();

        debug!(?casemap, "session tracker created");

        Self {
            casemap,
            prefixes,
            users: IdentityRegistry::new(casemap),
            rosters: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Register a change observer. Observers are called in registration
    /// order after every mutating operation.
    pub fn on_change(&mut self, observer: impl RosterObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The case mapping fixed for this session.
    pub fn casemapping(&self) -> CaseMapping {
        self.casemap
    }

    /// The prefix table fixed for this session.
    pub fn prefix_table(&self) -> &PrefixTable {
        &self.prefixes
    }

    /// Apply one decoded server notification.
    ///
    /// Malformed input and benign races with server state recover
    /// internally; only decoder/tracker contract violations (a NICK for
    /// a never-seen nickname) return an error, and even then the state
    /// is left untouched.
    pub fn apply(&mut self, event: &Event) -> Result<()> {
        let mut changes = Vec::new();

        let result = match event {
            Event::Join { channel, source } => {
                self.handle_join(channel, source, &mut changes);
                Ok(())
            }
            Event::Part { channel, nick } | Event::Kick { channel, nick } => {
                self.handle_depart(channel, nick, &mut changes);
                Ok(())
            }
            Event::Quit { nick } => {
                self.handle_quit(nick, &mut changes);
                Ok(())
            }
            Event::Nick { old, new } => self.handle_nick(old, new, &mut changes),
            Event::Mode {
                channel,
                modes,
                args,
            } => {
                self.handle_mode(channel, modes, args, &mut changes);
                Ok(())
            }
            Event::NamesBegin { channel } => {
                self.handle_names_begin(channel);
                Ok(())
            }
            Event::NamesEntry { channel, names } => {
                self.handle_names_entry(channel, names, &mut changes);
                Ok(())
            }
            Event::NamesEnd { channel } => {
                self.handle_names_end(channel, &mut changes);
                Ok(())
            }
            Event::Message { channel, nick } => {
                self.handle_message(channel, nick, &mut changes);
                Ok(())
            }
            Event::UserInfo {
                nick,
                user,
                host,
                realname,
                info,
            } => {
                let attrs = UserAttrs {
                    username: user.clone(),
                    hostname: host.clone(),
                    realname: realname.clone(),
                    info: info.clone(),
                };
                self.handle_user_info(nick, &attrs, &mut changes);
                Ok(())
            }
            Event::ChannelClosed { channel } => {
                self.handle_channel_closed(channel, &mut changes);
                Ok(())
            }
        };

        self.notify(&changes);
        result
    }

    // ------------------------------------------------------------------
    // Queries (copy-on-read snapshots)
    // ------------------------------------------------------------------

    /// Snapshot of a channel's members, unordered; the caller sorts.
    /// Unknown channels yield an empty list.
    pub fn members_of(&self, channel: &str) -> Vec<Member> {
        let folded = self.casemap.fold(channel);
        let Some(roster) = self.rosters.get(&folded) else {
            return Vec::new();
        };

        roster
            .members
            .iter()
            .filter_map(|(key, membership)| {
                let identity = self.users.lookup_folded(key)?;
                Some(Member {
                    nick: identity.nick().to_string(),
                    username: identity.username().map(str::to_owned),
                    hostname: identity.hostname().map(str::to_owned),
                    status: membership.status,
                    last_activity: membership.last_activity,
                })
            })
            .collect()
    }

    /// Read one rank flag for a (channel, nick) pair. Unknown channels
    /// or nicks read as false rather than erroring.
    pub fn has_rank(&self, channel: &str, nick: &str, rank: Rank) -> bool {
        self.membership(channel, nick)
            .map(|m| m.status.has(rank))
            .unwrap_or(false)
    }

    /// Whether the nick holds +o on the channel.
    pub fn is_op(&self, channel: &str, nick: &str) -> bool {
        self.has_rank(channel, nick, Rank::Op)
    }

    /// Whether the nick holds +v on the channel.
    pub fn is_voice(&self, channel: &str, nick: &str) -> bool {
        self.has_rank(channel, nick, Rank::Voice)
    }

    /// Whether the nick holds +h on the channel.
    pub fn is_half_op(&self, channel: &str, nick: &str) -> bool {
        self.has_rank(channel, nick, Rank::HalfOp)
    }

    /// Whether the nick holds +a on the channel.
    pub fn is_admin(&self, channel: &str, nick: &str) -> bool {
        self.has_rank(channel, nick, Rank::Admin)
    }

    /// Whether the nick holds +q on the channel.
    pub fn is_owner(&self, channel: &str, nick: &str) -> bool {
        self.has_rank(channel, nick, Rank::Owner)
    }

    /// Session-scope identity lookup (e.g. for WHOIS display). Returns
    /// a clone; the registry is never exposed live.
    pub fn identity_of(&self, nick: &str) -> Option<Identity> {
        self.users.lookup(nick).cloned()
    }

    /// Display names of all tracked channels.
    pub fn channels(&self) -> Vec<String> {
        self.rosters.values().map(|r| r.name.clone()).collect()
    }

    /// Display nicknames of every identity known to the session.
    pub fn all_nicks(&self) -> Vec<String> {
        self.users.all_nicks()
    }

    /// The channel's user limit (+l), if set.
    pub fn limit_of(&self, channel: &str) -> Option<u32> {
        self.rosters.get(&self.casemap.fold(channel))?.limit
    }

    /// The channel's key (+k), if set.
    pub fn key_of(&self, channel: &str) -> Option<String> {
        self.rosters
            .get(&self.casemap.fold(channel))?
            .key
            .clone()
    }

    fn membership(&self, channel: &str, nick: &str) -> Option<&ChannelMembership> {
        self.rosters
            .get(&self.casemap.fold(channel))?
            .members
            .get(&self.casemap.fold(nick))
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    fn handle_join(&mut self, channel: &str, source: &Source, changes: &mut Vec<RosterChange>) {
        // Some servers and test fixtures hand the join nick with its
        // rank glyphs still attached; honor them.
        let (ranks, nick) = {
            let (ranks, bare) = self.prefixes.strip_glyphs(&source.nick);
            (ranks, bare.to_string())
        };
        if nick.is_empty() {
            trace!(channel, "ignoring JOIN with empty nick");
            return;
        }

        let folded_channel = self.casemap.fold(channel);
        let folded_nick = self.casemap.fold(&nick);

        let attrs = UserAttrs {
            username: source.user.clone(),
            hostname: source.host.clone(),
            ..Default::default()
        };
        let attrs_changed = self.users.get_or_create(&nick, &attrs);
        let Some(user_id) = self.users.lookup_folded(&folded_nick).map(Identity::id) else {
            return;
        };

        let roster = self
            .rosters
            .entry(folded_channel.clone())
            .or_insert_with(|| ChannelRoster::new(channel));

        if roster.members.contains_key(&folded_nick) {
            // Duplicate JOIN: idempotent on the roster; the attribute
            // merge above still ran in case the server had fresher info.
            trace!(channel, %nick, "duplicate JOIN ignored");
        } else {
            let mut membership = ChannelMembership::new(user_id);
            membership.status = MemberStatus::from_ranks(&ranks);
            let display = roster.name.clone();
            roster.members.insert(folded_nick.clone(), membership);
            self.users.add_channel(&folded_nick, &folded_channel);

            debug!(channel, %nick, "member joined");
            changes.push(RosterChange {
                channel: display,
                kind: ChangeKind::Joined,
            });
        }

        if attrs_changed {
            self.fan_out_attrs(&folded_nick, changes);
        }
    }

    fn handle_depart(&mut self, channel: &str, nick: &str, changes: &mut Vec<RosterChange>) {
        let folded_channel = self.casemap.fold(channel);
        let folded_nick = self.casemap.fold(nick);

        let Some(roster) = self.rosters.get_mut(&folded_channel) else {
            trace!(channel, nick, "departure for untracked channel ignored");
            return;
        };

        if roster.members.remove(&folded_nick).is_none() {
            // Server notifications occasionally race or duplicate.
            trace!(channel, nick, "departure of absent member ignored");
            return;
        }
        let display = roster.name.clone();
        self.users.release(&folded_nick, &folded_channel);

        debug!(channel, nick, "member departed");
        changes.push(RosterChange {
            channel: display,
            kind: ChangeKind::Departed,
        });
    }

    fn handle_quit(&mut self, nick: &str, changes: &mut Vec<RosterChange>) {
        let folded_nick = self.casemap.fold(nick);

        let affected: Vec<String> = self
            .rosters
            .iter()
            .filter(|(_, roster)| roster.members.contains_key(&folded_nick))
            .map(|(key, _)| key.clone())
            .collect();

        for folded_channel in affected {
            if let Some(roster) = self.rosters.get_mut(&folded_channel) {
                roster.members.remove(&folded_nick);
                let display = roster.name.clone();
                self.users.release(&folded_nick, &folded_channel);
                changes.push(RosterChange {
                    channel: display,
                    kind: ChangeKind::Departed,
                });
            }
        }

        if !changes.is_empty() {
            debug!(nick, channels = changes.len(), "member quit");
        }
    }

    fn handle_nick(&mut self, old: &str, new: &str, changes: &mut Vec<RosterChange>) -> Result<()> {
        let old_folded = self.casemap.fold(old);
        let new_folded = self.casemap.fold(new);

        if self.users.lookup_folded(&old_folded).is_none() {
            return Err(crate::error::TrackError::UnknownNick(old.to_string()));
        }

        // A different identity already keyed under the new nickname can
        // only be a stale record: the server guarantees nickname
        // uniqueness, so evict it before re-keying.
        if old_folded != new_folded {
            let stale_channels: Option<Vec<String>> = self
                .users
                .lookup_folded(&new_folded)
                .map(|stale| stale.channels().map(str::to_owned).collect());
            if let Some(stale_channels) = stale_channels {
                warn!(nick = new, "evicting stale identity on nick collision");
                for folded_channel in stale_channels {
                    if let Some(roster) = self.rosters.get_mut(&folded_channel) {
                        roster.members.remove(&new_folded);
                        changes.push(RosterChange {
                            channel: roster.name.clone(),
                            kind: ChangeKind::Departed,
                        });
                    }
                    self.users.release(&new_folded, &folded_channel);
                }
            }
        }

        let channels = self.users.rename(old, new)?;

        for folded_channel in channels {
            let Some(roster) = self.rosters.get_mut(&folded_channel) else {
                continue;
            };
            if old_folded != new_folded {
                if let Some(membership) = roster.members.remove(&old_folded) {
                    // The membership record and its flags carry over
                    // untouched: the rename preserves identity
                    // continuity.
                    roster.members.insert(new_folded.clone(), membership);
                }
                if let Some(seen) = roster.seen.as_mut() {
                    if seen.remove(&old_folded) {
                        seen.insert(new_folded.clone());
                    }
                }
            }
            changes.push(RosterChange {
                channel: roster.name.clone(),
                kind: ChangeKind::Renamed,
            });
        }

        debug!(old, new, "member renamed");
        Ok(())
    }

    fn handle_mode(
        &mut self,
        channel: &str,
        modes: &str,
        args: &str,
        changes: &mut Vec<RosterChange>,
    ) {
        let folded_channel = self.casemap.fold(channel);
        if !self.rosters.contains_key(&folded_channel) {
            trace!(channel, "MODE for untracked channel ignored");
            return;
        }

        let set = mode::parse(modes, args, &self.prefixes);

        for change in &set.args {
            if let Some(rank) = self.prefixes.rank_of(change.letter) {
                let Some(target) = change.arg.as_deref() else {
                    // Short MODE line: the parser tolerates a missing
                    // argument and we no-op the triple.
                    trace!(channel, letter = %change.letter, "rank change without target");
                    continue;
                };
                self.apply_rank_change(&folded_channel, target, rank, change.polarity, changes);
            } else {
                self.apply_channel_arg_mode(&folded_channel, change, changes);
            }
        }

        if !set.added.is_empty() || !set.removed.is_empty() {
            // Plain channel flags (+i, +m, ...) carry no membership
            // state; only limit and key are tracked here.
            trace!(
                channel,
                added = %set.added.iter().collect::<String>(),
                removed = %set.removed.iter().collect::<String>(),
                "untracked channel flags"
            );
        }
    }

    fn apply_rank_change(
        &mut self,
        folded_channel: &str,
        target: &str,
        rank: Rank,
        polarity: mode::Polarity,
        changes: &mut Vec<RosterChange>,
    ) {
        let folded_nick = self.casemap.fold(target);
        let Some(roster) = self.rosters.get_mut(folded_channel) else {
            return;
        };
        let Some(membership) = roster.members.get_mut(&folded_nick) else {
            // Not an error: servers occasionally reorder or duplicate
            // notifications around departures.
            trace!(target, "MODE for unknown member ignored");
            return;
        };

        let on = polarity == mode::Polarity::Add;
        if membership.status.has(rank) != on {
            membership.status.set(rank, on);
            debug!(channel = %roster.name, target, ?rank, on, "rank changed");
            changes.push(RosterChange {
                channel: roster.name.clone(),
                kind: ChangeKind::StatusChanged,
            });
        }
    }

    fn apply_channel_arg_mode(
        &mut self,
        folded_channel: &str,
        change: &mode::ModeArg,
        changes: &mut Vec<RosterChange>,
    ) {
        let Some(roster) = self.rosters.get_mut(folded_channel) else {
            return;
        };

        let mutated = match (change.letter, change.polarity) {
            ('l', mode::Polarity::Add) => match change.arg.as_deref().map(str::parse::<u32>) {
                Some(Ok(limit)) => {
                    roster.limit = Some(limit);
                    true
                }
                _ => {
                    trace!(channel = %roster.name, "unparseable +l argument ignored");
                    false
                }
            },
            ('l', mode::Polarity::Remove) => roster.limit.take().is_some(),
            ('k', mode::Polarity::Add) => match change.arg.clone() {
                Some(key) => {
                    roster.key = Some(key);
                    true
                }
                None => false,
            },
            ('k', mode::Polarity::Remove) => roster.key.take().is_some(),
            _ => false,
        };

        if mutated {
            changes.push(RosterChange {
                channel: roster.name.clone(),
                kind: ChangeKind::ChannelModeChanged,
            });
        }
    }

    fn handle_names_begin(&mut self, channel: &str) {
        let folded_channel = self.casemap.fold(channel);
        let roster = self
            .rosters
            .entry(folded_channel)
            .or_insert_with(|| ChannelRoster::new(channel));
        roster.seen = Some(HashSet::new());
        debug!(channel, "NAMES snapshot opened");
    }

    fn handle_names_entry(
        &mut self,
        channel: &str,
        names: &[String],
        changes: &mut Vec<RosterChange>,
    ) {
        let folded_channel = self.casemap.fold(channel);
        {
            let roster = self
                .rosters
                .entry(folded_channel.clone())
                .or_insert_with(|| ChannelRoster::new(channel));
            // Servers send RPL_NAMREPLY unannounced; an entry with no
            // open snapshot starts one.
            if roster.seen.is_none() {
                trace!(channel, "NAMES entry without begin, opening snapshot");
                roster.seen = Some(HashSet::new());
            }
        }

        for name in names {
            let (ranks, bare) = {
                let (ranks, bare) = self.prefixes.strip_glyphs(name);
                (ranks, bare.to_string())
            };
            if bare.is_empty() {
                trace!(channel, %name, "NAMES entry with no nickname ignored");
                continue;
            }

            let folded_nick = self.casemap.fold(&bare);
            let attrs_changed = self.users.get_or_create(&bare, &UserAttrs::default());
            let status = MemberStatus::from_ranks(&ranks);

            let Some(user_id) = self.users.lookup_folded(&folded_nick).map(Identity::id) else {
                continue;
            };

            let Some(roster) = self.rosters.get_mut(&folded_channel) else {
                return;
            };
            let display = roster.name.clone();

            match roster.members.entry(folded_nick.clone()) {
                Entry::Occupied(mut entry) => {
                    // The snapshot restates status authoritatively.
                    let membership = entry.get_mut();
                    if membership.status != status {
                        membership.status = status;
                        changes.push(RosterChange {
                            channel: display,
                            kind: ChangeKind::StatusChanged,
                        });
                    }
                }
                Entry::Vacant(entry) => {
                    let mut membership = ChannelMembership::new(user_id);
                    membership.status = status;
                    entry.insert(membership);
                    self.users.add_channel(&folded_nick, &folded_channel);
                    changes.push(RosterChange {
                        channel: display,
                        kind: ChangeKind::Joined,
                    });
                }
            }

            if let Some(roster) = self.rosters.get_mut(&folded_channel) {
                if let Some(seen) = roster.seen.as_mut() {
                    seen.insert(folded_nick.clone());
                }
            }

            if attrs_changed {
                self.fan_out_attrs(&folded_nick, changes);
            }
        }
    }

    fn handle_names_end(&mut self, channel: &str, changes: &mut Vec<RosterChange>) {
        let folded_channel = self.casemap.fold(channel);
        let Some(roster) = self.rosters.get_mut(&folded_channel) else {
            trace!(channel, "NAMES end for untracked channel ignored");
            return;
        };
        let Some(seen) = roster.seen.take() else {
            trace!(channel, "NAMES end without snapshot ignored");
            return;
        };

        let stale: Vec<String> = roster
            .members
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        let display = roster.name.clone();

        for folded_nick in &stale {
            roster.members.remove(folded_nick);
            self.users.release(folded_nick, &folded_channel);
            changes.push(RosterChange {
                channel: display.clone(),
                kind: ChangeKind::Departed,
            });
        }

        debug!(channel, removed = stale.len(), "NAMES snapshot reconciled");
        changes.push(RosterChange {
            channel: display,
            kind: ChangeKind::Reconciled,
        });
    }

    fn handle_message(&mut self, channel: &str, nick: &str, changes: &mut Vec<RosterChange>) {
        let folded_channel = self.casemap.fold(channel);
        let folded_nick = self.casemap.fold(nick);

        let Some(roster) = self.rosters.get_mut(&folded_channel) else {
            return;
        };
        let Some(membership) = roster.members.get_mut(&folded_nick) else {
            // A message from a nick we do not have on the roster is a
            // benign desync; membership is never fabricated from
            // traffic.
            trace!(channel, nick, "message from unlisted sender ignored");
            return;
        };

        membership.last_activity = Some(Utc::now());
        changes.push(RosterChange {
            channel: roster.name.clone(),
            kind: ChangeKind::Activity,
        });
    }

    fn handle_user_info(
        &mut self,
        nick: &str,
        attrs: &UserAttrs,
        changes: &mut Vec<RosterChange>,
    ) {
        let folded_nick = self.casemap.fold(nick);
        if self.users.lookup_folded(&folded_nick).is_none() {
            // Identities are reference-counted by membership; details
            // for a nick on no tracked channel have nowhere to live.
            trace!(nick, "identity details for untracked nick ignored");
            return;
        }

        if self.users.get_or_create(nick, attrs) {
            self.fan_out_attrs(&folded_nick, changes);
        }
    }

    fn handle_channel_closed(&mut self, channel: &str, changes: &mut Vec<RosterChange>) {
        let folded_channel = self.casemap.fold(channel);
        let Some(roster) = self.rosters.remove(&folded_channel) else {
            trace!(channel, "close of untracked channel ignored");
            return;
        };

        for folded_nick in roster.members.keys() {
            self.users.release(folded_nick, &folded_channel);
        }

        debug!(channel, members = roster.members.len(), "channel closed");
        changes.push(RosterChange {
            channel: roster.name,
            kind: ChangeKind::Closed,
        });
    }

    /// Push an `AttrsChanged` notification to every channel currently
    /// referencing the identity.
    fn fan_out_attrs(&self, folded_nick: &str, changes: &mut Vec<RosterChange>) {
        let Some(identity) = self.users.lookup_folded(folded_nick) else {
            return;
        };
        for folded_channel in identity.channels() {
            if let Some(roster) = self.rosters.get(folded_channel) {
                changes.push(RosterChange {
                    channel: roster.name.clone(),
                    kind: ChangeKind::AttrsChanged,
                });
            }
        }
    }

    fn notify(&mut self, changes: &[RosterChange]) {
        for change in changes {
            for observer in &mut self.observers {
                observer.on_change(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackError;

    fn session() -> Session {
        Session::default()
    }

    fn join(session: &mut Session, channel: &str, nick: &str) {
        session
            .apply(&Event::Join {
                channel: channel.to_string(),
                source: Source::nick_only(nick),
            })
            .unwrap();
    }

    /// The core invariant in both directions: every identity's channel
    /// set matches exactly the rosters that reference it.
    fn assert_consistent(session: &Session) {
        for identity in session.users.iter() {
            let referencing: HashSet<&str> = session
                .rosters
                .iter()
                .filter(|(_, r)| r.members.contains_key(identity.folded()))
                .map(|(k, _)| k.as_str())
                .collect();
            let recorded: HashSet<&str> = identity.channels().collect();
            assert_eq!(recorded, referencing, "identity {}", identity.nick());
        }
        for (folded_channel, roster) in &session.rosters {
            for folded_nick in roster.members.keys() {
                let identity = session
                    .users
                    .lookup_folded(folded_nick)
                    .unwrap_or_else(|| panic!("dangling member {folded_nick}"));
                assert!(
                    identity.channels().any(|c| c == folded_channel),
                    "identity {folded_nick} missing back-ref to {folded_channel}"
                );
            }
        }
    }

    #[test]
    fn join_creates_member_and_identity() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        assert_eq!(s.members_of("#chan").len(), 1);
        assert!(s.identity_of("alice").is_some());
        assert!(!s.is_op("#chan", "alice"));
        assert_consistent(&s);
    }

    #[test]
    fn join_is_idempotent() {
        let mut s = session();
        join(&mut s, "#chan", "alice");
        join(&mut s, "#chan", "alice");

        assert_eq!(s.members_of("#chan").len(), 1);
        assert_consistent(&s);
    }

    #[test]
    fn join_with_glyph_grants_rank() {
        let mut s = session();
        join(&mut s, "#chan", "@alice");

        assert!(s.is_op("#chan", "alice"));
        assert_eq!(s.identity_of("alice").unwrap().nick(), "alice");
        assert_consistent(&s);
    }

    #[test]
    fn part_releases_identity_on_last_channel() {
        let mut s = session();
        join(&mut s, "#a", "bob");
        join(&mut s, "#b", "bob");

        s.apply(&Event::Part {
            channel: "#a".into(),
            nick: "bob".into(),
        })
        .unwrap();
        assert!(s.members_of("#a").is_empty());
        assert_eq!(s.members_of("#b").len(), 1);
        assert!(s.identity_of("bob").is_some());
        assert_consistent(&s);

        s.apply(&Event::Part {
            channel: "#b".into(),
            nick: "bob".into(),
        })
        .unwrap();
        assert!(s.identity_of("bob").is_none());
        assert_consistent(&s);
    }

    #[test]
    fn quit_removes_from_all_channels() {
        let mut s = session();
        join(&mut s, "#a", "bob");
        join(&mut s, "#b", "bob");
        join(&mut s, "#b", "alice");

        s.apply(&Event::Quit { nick: "bob".into() }).unwrap();

        assert!(s.members_of("#a").is_empty());
        assert_eq!(s.members_of("#b").len(), 1);
        assert!(s.identity_of("bob").is_none());
        assert!(s.identity_of("alice").is_some());
        assert_consistent(&s);
    }

    #[test]
    fn depart_of_absent_member_is_ignored() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::Part {
            channel: "#chan".into(),
            nick: "ghost".into(),
        })
        .unwrap();
        s.apply(&Event::Kick {
            channel: "#nochan".into(),
            nick: "alice".into(),
        })
        .unwrap();

        assert_eq!(s.members_of("#chan").len(), 1);
        assert_consistent(&s);
    }

    #[test]
    fn rename_is_atomic_and_preserves_status() {
        let mut s = session();
        join(&mut s, "#a", "@bob");
        join(&mut s, "#b", "bob");
        let id = s.identity_of("bob").unwrap().id();

        s.apply(&Event::Nick {
            old: "bob".into(),
            new: "robert".into(),
        })
        .unwrap();

        assert!(s.identity_of("bob").is_none());
        let renamed = s.identity_of("robert").unwrap();
        assert_eq!(renamed.id(), id);
        // Flags carried over on both channels.
        assert!(s.is_op("#a", "robert"));
        assert!(!s.is_op("#b", "robert"));
        assert_eq!(s.members_of("#a").len(), 1);
        assert_eq!(s.members_of("#b").len(), 1);
        assert_consistent(&s);
    }

    #[test]
    fn rename_unknown_nick_is_error() {
        let mut s = session();
        let err = s
            .apply(&Event::Nick {
                old: "ghost".into(),
                new: "spectre".into(),
            })
            .unwrap_err();
        assert_eq!(err, TrackError::UnknownNick("ghost".into()));
        assert_consistent(&s);
    }

    #[test]
    fn rename_onto_stale_identity_evicts_it() {
        let mut s = session();
        join(&mut s, "#chan", "alice");
        join(&mut s, "#chan", "bob");

        // The server would never allow this unless our "alice" is
        // stale; bob takes over the nick.
        s.apply(&Event::Nick {
            old: "bob".into(),
            new: "alice".into(),
        })
        .unwrap();

        assert_eq!(s.members_of("#chan").len(), 1);
        assert_eq!(s.identity_of("alice").unwrap().nick(), "alice");
        assert_consistent(&s);
    }

    #[test]
    fn mode_grants_and_revokes_ranks() {
        let mut s = session();
        join(&mut s, "#chan", "alice");
        join(&mut s, "#chan", "bob");

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "+ov".into(),
            args: "alice bob".into(),
        })
        .unwrap();
        assert!(s.is_op("#chan", "alice"));
        assert!(s.is_voice("#chan", "bob"));

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "-o".into(),
            args: "alice".into(),
        })
        .unwrap();
        assert!(!s.is_op("#chan", "alice"));
        // Identity untouched by the status change.
        assert!(s.identity_of("alice").is_some());
        assert_consistent(&s);
    }

    #[test]
    fn mode_for_unknown_nick_is_ignored() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "+o".into(),
            args: "ghost".into(),
        })
        .unwrap();

        assert!(!s.is_op("#chan", "ghost"));
        assert_eq!(s.members_of("#chan").len(), 1);
        assert_consistent(&s);
    }

    #[test]
    fn mode_nick_matching_is_case_insensitive() {
        let mut s = session();
        join(&mut s, "#chan", "Alice[");

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "+o".into(),
            args: "alice{".into(),
        })
        .unwrap();
        assert!(s.is_op("#chan", "ALICE["));
    }

    #[test]
    fn limit_and_key_modes_update_channel_state() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "+lk".into(),
            args: "25 sekrit".into(),
        })
        .unwrap();
        assert_eq!(s.limit_of("#chan"), Some(25));
        assert_eq!(s.key_of("#chan").as_deref(), Some("sekrit"));

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "-lk".into(),
            args: "".into(),
        })
        .unwrap();
        assert_eq!(s.limit_of("#chan"), None);
        assert_eq!(s.key_of("#chan"), None);
    }

    #[test]
    fn unparseable_limit_is_ignored() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::Mode {
            channel: "#chan".into(),
            modes: "+l".into(),
            args: "banana".into(),
        })
        .unwrap();
        assert_eq!(s.limit_of("#chan"), None);
    }

    #[test]
    fn names_snapshot_reconciles_stale_members() {
        let mut s = session();
        join(&mut s, "#chan", "alice");
        join(&mut s, "#chan", "bob");

        s.apply(&Event::NamesBegin {
            channel: "#chan".into(),
        })
        .unwrap();
        s.apply(&Event::NamesEntry {
            channel: "#chan".into(),
            names: vec!["alice".into()],
        })
        .unwrap();
        s.apply(&Event::NamesEnd {
            channel: "#chan".into(),
        })
        .unwrap();

        let members = s.members_of("#chan");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].nick, "alice");
        // bob's only channel: identity erased entirely.
        assert!(s.identity_of("bob").is_none());
        assert_consistent(&s);
    }

    #[test]
    fn names_snapshot_spares_members_on_other_channels() {
        let mut s = session();
        join(&mut s, "#a", "bob");
        join(&mut s, "#b", "bob");

        s.apply(&Event::NamesBegin { channel: "#a".into() }).unwrap();
        s.apply(&Event::NamesEnd { channel: "#a".into() }).unwrap();

        assert!(s.members_of("#a").is_empty());
        assert_eq!(s.members_of("#b").len(), 1);
        assert!(s.identity_of("bob").is_some());
        assert_consistent(&s);
    }

    #[test]
    fn names_entry_decodes_glyphs_multi_prefix() {
        let mut s = session();
        s.apply(&Event::NamesBegin {
            channel: "#chan".into(),
        })
        .unwrap();
        s.apply(&Event::NamesEntry {
            channel: "#chan".into(),
            names: vec!["~owner".into(), "@+mixed".into(), "plain".into()],
        })
        .unwrap();
        s.apply(&Event::NamesEnd {
            channel: "#chan".into(),
        })
        .unwrap();

        assert!(s.is_owner("#chan", "owner"));
        assert!(s.is_op("#chan", "mixed"));
        assert!(s.is_voice("#chan", "mixed"));
        assert!(!s.is_voice("#chan", "plain"));
        assert_eq!(s.members_of("#chan").len(), 3);
        assert_consistent(&s);
    }

    #[test]
    fn names_entry_without_begin_opens_snapshot() {
        let mut s = session();
        join(&mut s, "#chan", "stale");

        s.apply(&Event::NamesEntry {
            channel: "#chan".into(),
            names: vec!["fresh".into()],
        })
        .unwrap();
        s.apply(&Event::NamesEnd {
            channel: "#chan".into(),
        })
        .unwrap();

        let members = s.members_of("#chan");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].nick, "fresh");
        assert_consistent(&s);
    }

    #[test]
    fn names_end_without_snapshot_is_ignored() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::NamesEnd {
            channel: "#chan".into(),
        })
        .unwrap();
        assert_eq!(s.members_of("#chan").len(), 1);
    }

    #[test]
    fn names_restates_status_authoritatively() {
        let mut s = session();
        join(&mut s, "#chan", "@alice");
        assert!(s.is_op("#chan", "alice"));

        s.apply(&Event::NamesBegin {
            channel: "#chan".into(),
        })
        .unwrap();
        s.apply(&Event::NamesEntry {
            channel: "#chan".into(),
            names: vec!["+alice".into()],
        })
        .unwrap();
        s.apply(&Event::NamesEnd {
            channel: "#chan".into(),
        })
        .unwrap();

        assert!(!s.is_op("#chan", "alice"));
        assert!(s.is_voice("#chan", "alice"));
    }

    #[test]
    fn message_updates_activity() {
        let mut s = session();
        join(&mut s, "#chan", "alice");
        assert!(s.members_of("#chan")[0].last_activity.is_none());

        s.apply(&Event::Message {
            channel: "#chan".into(),
            nick: "alice".into(),
        })
        .unwrap();
        assert!(s.members_of("#chan")[0].last_activity.is_some());
    }

    #[test]
    fn message_from_unlisted_sender_is_ignored() {
        let mut s = session();
        join(&mut s, "#chan", "alice");

        s.apply(&Event::Message {
            channel: "#chan".into(),
            nick: "ghost".into(),
        })
        .unwrap();

        assert_eq!(s.members_of("#chan").len(), 1);
        assert!(s.identity_of("ghost").is_none());
        assert_consistent(&s);
    }

    #[test]
    fn user_info_merges_and_fans_out() {
        let mut s = session();
        join(&mut s, "#a", "alice");
        join(&mut s, "#b", "alice");

        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log2 = log.clone();
        s.on_change(move |c: &RosterChange| log2.borrow_mut().push(c.clone()));

        s.apply(&Event::UserInfo {
            nick: "alice".into(),
            user: Some("al".into()),
            host: None,
            realname: Some("Alice A.".into()),
            info: None,
        })
        .unwrap();

        // One AttrsChanged per channel referencing the identity.
        let attr_changes = log
            .borrow()
            .iter()
            .filter(|c| c.kind == ChangeKind::AttrsChanged)
            .count();
        assert_eq!(attr_changes, 2);

        let identity = s.identity_of("alice").unwrap();
        assert_eq!(identity.username(), Some("al"));
        assert_eq!(identity.realname(), Some("Alice A."));

        // Details never overwrite non-empty fields, and an unchanged
        // merge fires nothing.
        log.borrow_mut().clear();
        s.apply(&Event::UserInfo {
            nick: "alice".into(),
            user: Some("other".into()),
            host: None,
            realname: None,
            info: None,
        })
        .unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(s.identity_of("alice").unwrap().username(), Some("al"));
    }

    #[test]
    fn user_info_for_untracked_nick_is_ignored() {
        let mut s = session();
        s.apply(&Event::UserInfo {
            nick: "ghost".into(),
            user: Some("g".into()),
            host: None,
            realname: None,
            info: None,
        })
        .unwrap();
        assert!(s.identity_of("ghost").is_none());
    }

    #[test]
    fn channel_closed_releases_every_member() {
        let mut s = session();
        join(&mut s, "#a", "alice");
        join(&mut s, "#a", "bob");
        join(&mut s, "#b", "bob");

        s.apply(&Event::ChannelClosed {
            channel: "#a".into(),
        })
        .unwrap();

        assert!(s.members_of("#a").is_empty());
        assert!(s.channels().iter().all(|c| c != "#a"));
        assert!(s.identity_of("alice").is_none());
        assert!(s.identity_of("bob").is_some());
        assert_consistent(&s);
    }

    #[test]
    fn observer_fires_once_per_affected_channel_on_quit() {
        let mut s = session();
        join(&mut s, "#a", "bob");
        join(&mut s, "#b", "bob");

        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log2 = log.clone();
        s.on_change(move |c: &RosterChange| log2.borrow_mut().push(c.channel.clone()));

        s.apply(&Event::Quit { nick: "bob".into() }).unwrap();

        let mut channels = log.borrow().clone();
        channels.sort();
        assert_eq!(channels, vec!["#a".to_string(), "#b".to_string()]);
    }

    #[test]
    fn channel_names_fold_like_nicks() {
        let mut s = session();
        join(&mut s, "#Chan[1]", "alice");
        // Same channel under rfc1459 folding.
        assert_eq!(s.members_of("#chan{1}").len(), 1);
        // Display name is as first seen.
        assert_eq!(s.channels(), vec!["#Chan[1]".to_string()]);
    }

    #[test]
    fn ascii_session_keeps_bracket_nicks_distinct() {
        let mut s = Session::new(SessionConfig {
            casemapping: Some("ascii".into()),
            prefix: None,
        });
        join(&mut s, "#chan", "nick[");
        join(&mut s, "#chan", "nick{");
        assert_eq!(s.members_of("#chan").len(), 2);
        assert_consistent(&s);
    }
}
