//! IRC case-mapping functions.
//!
//! IRC uses a special case-insensitive comparison where some characters
//! are considered equivalent (e.g., `[` and `{`). Which characters fold
//! is negotiated per network via the ISUPPORT `CASEMAPPING` token; the
//! chosen mapping is fixed for the lifetime of a session and applied to
//! every nickname and channel name before comparison, hashing, or use as
//! a map key.

/// Case mapping negotiated for a session.
///
/// The variants differ only in how the characters `{}|~` relate to
/// `[]\^`:
///
/// - `Ascii`: plain ASCII lowercasing, no special equivalences.
/// - `Rfc1459`: `[` ↔ `{`, `]` ↔ `}`, `\` ↔ `|`, and `~` ↔ `^`.
/// - `Rfc1459Strict`: as `Rfc1459` but without the `~` ↔ `^` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseMapping {
    /// `CASEMAPPING=ascii`
    Ascii,
    /// `CASEMAPPING=rfc1459`, the most common mapping and the fallback.
    #[default]
    Rfc1459,
    /// `CASEMAPPING=strict-rfc1459`
    Rfc1459Strict,
}

impl CaseMapping {
    /// Map an ISUPPORT `CASEMAPPING` token to a mapping.
    ///
    /// Unrecognized tokens fall back to [`CaseMapping::Rfc1459`].
    pub fn from_isupport_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("ascii") {
            Self::Ascii
        } else if token.eq_ignore_ascii_case("strict-rfc1459") {
            Self::Rfc1459Strict
        } else {
            Self::Rfc1459
        }
    }

    /// Convert a single character to IRC lowercase under this mapping.
    #[inline]
    pub const fn fold_char(self, c: char) -> char {
        match c {
            '[' if !matches!(self, Self::Ascii) => '{',
            ']' if !matches!(self, Self::Ascii) => '}',
            '\\' if !matches!(self, Self::Ascii) => '|',
            '~' if matches!(self, Self::Rfc1459) => '^',
            'A'..='Z' => (c as u8 + 32) as char,
            _ => c,
        }
    }

    /// Convert a string to IRC lowercase under this mapping.
    ///
    /// The result is the canonical form used as a map key: two names
    /// refer to the same entity iff their folds are byte-equal.
    pub fn fold(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Compare two strings case-insensitively under this mapping,
    /// without allocating.
    pub fn eq(self, a: &str, b: &str) -> bool {
        if a.len() != b.len() {
            return false;
        }

        a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| self.fold_char(ca) == self.fold_char(cb))
    }
}
