mod dedupe;
mod disambiguate;
mod inspect;
mod normalize;
pub(crate) mod probe;
pub(crate) mod scan;

pub use dedupe::{dedupe_wheels, DedupeRequest};
pub use disambiguate::{disambiguate_wheels, DisambiguateRequest};
pub use inspect::{inspect_wheel, InspectRequest};
pub use normalize::{normalize_wheels, NormalizeRequest};
