pub(crate) mod context;
mod settings;

pub use settings::{
    AmbiguityPolicy, Config, DedupeConfig, DisambiguateConfig, GlobalOptions, MissingBasePolicy,
    ToolConfig, UploadConfig,
};
pub(crate) use settings::EnvSnapshot;

/// Packages built from source for every ROCm release.
pub const DEFAULT_TRACKED_PACKAGES: [&str; 4] = ["torch", "triton", "torchvision", "amdsmi"];

/// The default set plus the optional attention kernels.
pub const EXTENDED_TRACKED_PACKAGES: [&str; 6] = [
    "torch",
    "triton",
    "torchvision",
    "amdsmi",
    "flash_attn",
    "aiter",
];
