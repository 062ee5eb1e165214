//! MODE string parsing.

use crate::prefix::PrefixTable;

use super::types::{ModeArg, ModeChangeSet, Polarity};

/// Channel mode letter for the user limit; takes an argument only when set.
const LIMIT: char = 'l';
/// Channel mode letter for the channel key; takes an argument only when set.
const KEY: char = 'k';

/// Parse one MODE line into a structured change-set.
///
/// `mode_field` is the raw mode token (e.g. `+ov-k`), `args_field` the
/// remaining whitespace-separated arguments (e.g. `alice bob`). The
/// prefix table decides, case-sensitively, which letters are membership
/// modes: those always consume one argument, while the limit/key letters
/// consume one only when being set. Every other letter lands in the
/// add/remove flag lists and consumes nothing.
///
/// This parser never fails: an argument-taking letter with no remaining
/// arguments yields a `None` argument (the interpreter no-ops it), and
/// an empty `mode_field` yields an empty change-set. Servers on the odd
/// network do send short MODE lines, and dropping the whole line over
/// one missing argument would desync the roster more than tolerating it.
pub fn parse(mode_field: &str, args_field: &str, table: &PrefixTable) -> ModeChangeSet {
    let mut set = ModeChangeSet::default();
    let mut args = args_field.split_whitespace();
    let mut polarity = Polarity::Add;

    for c in mode_field.chars() {
        match c {
            '+' => polarity = Polarity::Add,
            '-' => polarity = Polarity::Remove,
            _ => {
                let is_rank = table.is_rank_letter(c);
                let takes_arg =
                    is_rank || ((c == LIMIT || c == KEY) && polarity == Polarity::Add);

                if is_rank || c == LIMIT || c == KEY {
                    let arg = if takes_arg {
                        args.next().map(str::to_owned)
                    } else {
                        None
                    };
                    set.args.push(ModeArg {
                        letter: c,
                        polarity,
                        arg,
                    });
                } else {
                    match polarity {
                        Polarity::Add => set.added.push(c),
                        Polarity::Remove => set.removed.push(c),
                    }
                }
            }
        }
    }

    set
}
