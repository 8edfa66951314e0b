pub(crate) mod diagnostics;
pub(crate) mod outcome;
pub mod progress;
