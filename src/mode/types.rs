//! Parsed MODE change-set types.

use smallvec::SmallVec;

/// Direction of a mode change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    /// The mode is being set (`+`). This is the initial polarity of a
    /// MODE string before any explicit sign.
    Add,
    /// The mode is being cleared (`-`).
    Remove,
}

/// One argument-taking mode change: a membership grant/revocation or a
/// limit/key change.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeArg {
    /// The mode letter, case-sensitive.
    pub letter: char,
    /// Whether the mode is being set or cleared.
    pub polarity: Polarity,
    /// The consumed argument. `None` when the MODE string ran out of
    /// arguments (the interpreter treats such a triple as a no-op) or
    /// when the letter does not take an argument for this polarity
    /// (`-l`, `-k`).
    pub arg: Option<String>,
}

/// The structured result of parsing one MODE line.
///
/// Encounter order is preserved within each list; a letter that is both
/// set and cleared in the same string yields two entries, applied in
/// sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeChangeSet {
    /// Argument-less flags being set, in encounter order.
    pub added: SmallVec<[char; 8]>,
    /// Argument-less flags being cleared, in encounter order.
    pub removed: SmallVec<[char; 8]>,
    /// Argument-taking changes, in encounter order.
    pub args: Vec<ModeArg>,
}

impl ModeChangeSet {
    /// True if the parse produced no changes at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.args.is_empty()
    }
}
