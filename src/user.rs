//! Session-scope user identities.
//!
//! One [`Identity`] exists per distinct nickname currently visible on
//! the session, shared by every channel the user is on. Identities are
//! reference-counted by channel membership: the registry records which
//! channels hold a membership for each identity and erases the identity
//! the instant that set empties. Message traffic never keeps an
//! identity alive.

use std::collections::{HashMap, HashSet};

use crate::casemap::CaseMapping;
use crate::error::{Result, TrackError};

/// Opaque, session-unique handle to an [`Identity`].
///
/// Stable across renames, so callers can observe identity continuity
/// through NICK changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserId(u64);

/// Attributes learned about a user from server notifications.
///
/// All fields are optional; merging only fills fields that were
/// previously empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserAttrs {
    /// Username (ident).
    pub username: Option<String>,
    /// Hostname.
    pub hostname: Option<String>,
    /// Realname/GECOS.
    pub realname: Option<String>,
    /// Free-form info string.
    pub info: Option<String>,
}

impl UserAttrs {
    /// True if no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.hostname.is_none()
            && self.realname.is_none()
            && self.info.is_none()
    }
}

/// The session-wide record for one nickname.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    id: UserId,
    folded: String,
    nick: String,
    attrs: UserAttrs,
    channels: HashSet<String>,
}

impl Identity {
    /// The stable handle for this identity.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// The display nickname, as last seen (arbitrary case).
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// The canonical fold of the current nickname.
    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Username (ident), if known.
    pub fn username(&self) -> Option<&str> {
        self.attrs.username.as_deref()
    }

    /// Hostname, if known.
    pub fn hostname(&self) -> Option<&str> {
        self.attrs.hostname.as_deref()
    }

    /// Realname/GECOS, if known.
    pub fn realname(&self) -> Option<&str> {
        self.attrs.realname.as_deref()
    }

    /// Free-form info string, if known.
    pub fn info(&self) -> Option<&str> {
        self.attrs.info.as_deref()
    }

    /// The folded names of the channels currently holding a membership
    /// for this identity.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    /// Number of channels referencing this identity.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Merge fresher details, only overwriting previously-empty fields.
    /// A differing display nick is also refreshed. Returns whether
    /// anything visible changed.
    fn merge(&mut self, nick: &str, attrs: &UserAttrs) -> bool {
        let mut changed = false;

        if self.nick != nick {
            self.nick = nick.to_string();
            changed = true;
        }

        changed |= fill(&mut self.attrs.username, &attrs.username);
        changed |= fill(&mut self.attrs.hostname, &attrs.hostname);
        changed |= fill(&mut self.attrs.realname, &attrs.realname);
        changed |= fill(&mut self.attrs.info, &attrs.info);

        changed
    }
}

fn fill(slot: &mut Option<String>, value: &Option<String>) -> bool {
    if slot.is_none() && value.is_some() {
        slot.clone_from(value);
        true
    } else {
        false
    }
}

/// Per-session map from canonical nickname to its shared [`Identity`].
#[derive(Clone, Debug)]
pub(crate) struct IdentityRegistry {
    casemap: CaseMapping,
    next_id: u64,
    users: HashMap<String, Identity>,
}

impl IdentityRegistry {
    pub(crate) fn new(casemap: CaseMapping) -> Self {
        Self {
            casemap,
            next_id: 0,
            users: HashMap::new(),
        }
    }

    /// Find or create the identity for a nickname, merging any provided
    /// attributes into an existing record. Returns whether an existing
    /// record visibly changed (drives the "user changed" fan-out; a
    /// fresh creation does not count).
    pub(crate) fn get_or_create(&mut self, nick: &str, attrs: &UserAttrs) -> bool {
        let folded = self.casemap.fold(nick);

        if let Some(identity) = self.users.get_mut(&folded) {
            return identity.merge(nick, attrs);
        }

        let id = UserId(self.next_id);
        self.next_id += 1;
        self.users.insert(
            folded.clone(),
            Identity {
                id,
                folded,
                nick: nick.to_string(),
                attrs: attrs.clone(),
                channels: HashSet::new(),
            },
        );
        false
    }

    /// Record that a channel now holds a membership for this nickname.
    /// Both arguments are pre-folded.
    pub(crate) fn add_channel(&mut self, folded_nick: &str, folded_channel: &str) {
        if let Some(identity) = self.users.get_mut(folded_nick) {
            identity.channels.insert(folded_channel.to_string());
        }
    }

    /// Drop one channel reference; erases the identity when its last
    /// reference goes. Releasing a pair that is not held is a no-op.
    /// Returns true if the identity was erased entirely.
    pub(crate) fn release(&mut self, folded_nick: &str, folded_channel: &str) -> bool {
        let Some(identity) = self.users.get_mut(folded_nick) else {
            return false;
        };
        identity.channels.remove(folded_channel);
        if identity.channels.is_empty() {
            self.users.remove(folded_nick);
            true
        } else {
            false
        }
    }

    /// Re-key an identity under a new nickname.
    ///
    /// Returns the folded channel names the caller must re-key in its
    /// rosters. The identity record itself (including its [`UserId`])
    /// is untouched apart from the nickname fields, so the rename is
    /// invisible except through the new key. Renaming a nickname the
    /// registry has never seen is a contract violation.
    pub(crate) fn rename(&mut self, old: &str, new: &str) -> Result<Vec<String>> {
        let old_folded = self.casemap.fold(old);
        let new_folded = self.casemap.fold(new);

        if old_folded == new_folded {
            // Case-only change: the key is already right.
            let identity = self
                .users
                .get_mut(&old_folded)
                .ok_or_else(|| TrackError::UnknownNick(old.to_string()))?;
            identity.nick = new.to_string();
            return Ok(identity.channels.iter().cloned().collect());
        }

        let mut identity = self
            .users
            .remove(&old_folded)
            .ok_or_else(|| TrackError::UnknownNick(old.to_string()))?;
        identity.folded = new_folded.clone();
        identity.nick = new.to_string();
        let channels = identity.channels.iter().cloned().collect();
        self.users.insert(new_folded, identity);
        Ok(channels)
    }

    /// Look up an identity by nickname in any case.
    pub(crate) fn lookup(&self, nick: &str) -> Option<&Identity> {
        self.users.get(&self.casemap.fold(nick))
    }

    /// Look up an identity by pre-folded key.
    pub(crate) fn lookup_folded(&self, folded: &str) -> Option<&Identity> {
        self.users.get(folded)
    }

    /// Display nicknames of every identity known to the session.
    pub(crate) fn all_nicks(&self) -> Vec<String> {
        self.users.values().map(|u| u.nick.clone()).collect()
    }

    /// Number of identities currently known.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.users.len()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }
}
