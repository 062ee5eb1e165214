//! Membership prefix table.
//!
//! Maps channel membership mode letters (like `o`, `v`) to their rank
//! and display glyph (`@`, `+`), as advertised by the server in the
//! ISUPPORT `PREFIX` token (e.g. `(qaohv)~&@%+`). A hard-coded table is
//! used when the token is absent or malformed.

/// A channel membership rank.
///
/// These are independent privileges, not levels of a single enum: a
/// network may grant a user several of them on the same channel at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rank {
    /// Channel founder/owner, conventionally `+q` / `~`.
    Owner,
    /// Channel admin/protected, conventionally `+a` / `&`.
    Admin,
    /// Channel operator, conventionally `+o` / `@`.
    Op,
    /// Half-operator, conventionally `+h` / `%`.
    HalfOp,
    /// Voice, conventionally `+v` / `+`.
    Voice,
}

/// One letter/glyph pairing from the `PREFIX` token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PrefixEntry {
    letter: char,
    glyph: char,
    rank: Rank,
}

/// The conventional fallback table: `(qaohv)~&@%+`.
const DEFAULT_TABLE: [(char, char, Rank); 5] = [
    ('q', '~', Rank::Owner),
    ('a', '&', Rank::Admin),
    ('o', '@', Rank::Op),
    ('h', '%', Rank::HalfOp),
    ('v', '+', Rank::Voice),
];

/// Session-scoped table of membership mode letters and prefix glyphs.
///
/// Built once from the negotiated `PREFIX` token and shared read-only by
/// the mode parser and the membership coordinator.
///
/// # Example
///
/// ```
/// use irc_roster::prefix::{PrefixTable, Rank};
///
/// let table = PrefixTable::parse("(ov)@+");
/// assert_eq!(table.rank_of('o'), Some(Rank::Op));
/// assert_eq!(table.rank_of_glyph('+'), Some(Rank::Voice));
/// assert_eq!(table.rank_of('q'), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixTable {
    entries: Vec<PrefixEntry>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TABLE
                .iter()
                .map(|&(letter, glyph, rank)| PrefixEntry {
                    letter,
                    glyph,
                    rank,
                })
                .collect(),
        }
    }
}

impl PrefixTable {
    /// Build a table from a `PREFIX` token value like `(qaohv)~&@%+`.
    ///
    /// Letters and glyphs pair positionally. A malformed value (missing
    /// parentheses, empty halves, mismatched lengths) falls back to the
    /// conventional `(qaohv)~&@%+` table rather than failing, so a
    /// session always has a usable table.
    ///
    /// Letters other than the five conventional ones (`q a o h v`) are
    /// kept but treated as voice-equivalent. Nonstandard networks
    /// advertise extra prefix modes and rejecting them would drop those
    /// members' status entirely.
    pub fn parse(token: &str) -> Self {
        match Self::try_parse(token) {
            Some(table) => table,
            None => {
                tracing::debug!(token, "malformed PREFIX token, using default table");
                Self::default()
            }
        }
    }

    fn try_parse(token: &str) -> Option<Self> {
        let rest = token.strip_prefix('(')?;
        let close = rest.find(')')?;
        let letters = &rest[..close];
        let glyphs = &rest[close + 1..];

        if letters.is_empty() || letters.chars().count() != glyphs.chars().count() {
            return None;
        }

        let entries = letters
            .chars()
            .zip(glyphs.chars())
            .map(|(letter, glyph)| PrefixEntry {
                letter,
                glyph,
                rank: rank_for_letter(letter),
            })
            .collect();

        Some(Self { entries })
    }

    /// Look up the rank granted by a membership mode letter.
    ///
    /// Letters are matched case-sensitively (`o` and `O` are distinct
    /// mode characters). Returns `None` for letters not advertised in
    /// the table; those are ordinary channel modes, not membership
    /// modes.
    pub fn rank_of(&self, letter: char) -> Option<Rank> {
        self.entries
            .iter()
            .find(|e| e.letter == letter)
            .map(|e| e.rank)
    }

    /// Look up the rank indicated by a display glyph, as seen at the
    /// front of a NAMES entry.
    pub fn rank_of_glyph(&self, glyph: char) -> Option<Rank> {
        self.entries
            .iter()
            .find(|e| e.glyph == glyph)
            .map(|e| e.rank)
    }

    /// The mode letter for a rank, if this network advertises one.
    pub fn letter_of(&self, rank: Rank) -> Option<char> {
        self.entries
            .iter()
            .find(|e| e.rank == rank)
            .map(|e| e.letter)
    }

    /// The display glyph for a rank, if this network advertises one.
    pub fn glyph_of(&self, rank: Rank) -> Option<char> {
        self.entries
            .iter()
            .find(|e| e.rank == rank)
            .map(|e| e.glyph)
    }

    /// Whether a mode letter is a membership mode (always takes a
    /// nickname argument in a MODE string).
    pub fn is_rank_letter(&self, letter: char) -> bool {
        self.entries.iter().any(|e| e.letter == letter)
    }

    /// Split leading rank glyphs off a NAMES entry.
    ///
    /// With the `multi-prefix` capability a server may send several
    /// glyphs (`@+nick`); all of them apply. Stops at the first
    /// character that is not a known glyph.
    pub fn strip_glyphs<'a>(&self, name: &'a str) -> (Vec<Rank>, &'a str) {
        let mut ranks = Vec::new();
        let mut rest = name;

        while let Some(c) = rest.chars().next() {
            match self.rank_of_glyph(c) {
                Some(rank) => {
                    ranks.push(rank);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }

        (ranks, rest)
    }
}

/// Rank conventionally associated with a mode letter.
///
/// Unknown letters are voice-equivalent by policy (see
/// [`PrefixTable::parse`]).
fn rank_for_letter(letter: char) -> Rank {
    match letter {
        'q' => Rank::Owner,
        'a' => Rank::Admin,
        'o' => Rank::Op,
        'h' => Rank::HalfOp,
        'v' => Rank::Voice,
        _ => Rank::Voice,
    }
}
