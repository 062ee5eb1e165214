//! MODE string parsing and the parsed change-set types.

mod parse;
mod types;

pub use parse::parse;
pub use types::{ModeArg, ModeChangeSet, Polarity};
