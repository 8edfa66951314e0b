pub(crate) mod config;
pub(crate) mod deps;
pub(crate) mod distribution;
pub(crate) mod fs;
pub(crate) mod runtime;
pub(crate) mod tooling;
pub(crate) mod wheels;
