#![deny(clippy::all)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::{fs, wheels};
pub(crate) use crate::core::runtime::effects;
pub(crate) use crate::core::tooling::{diagnostics, outcome};

pub use crate::core::config::context::{CommandContext, CommandInfo};
pub use crate::core::config::{
    AmbiguityPolicy, Config, DedupeConfig, DisambiguateConfig, GlobalOptions, MissingBasePolicy,
    ToolConfig, UploadConfig, DEFAULT_TRACKED_PACKAGES, EXTENDED_TRACKED_PACKAGES,
};
pub use crate::core::runtime::effects::{CommandRunner, Effects, Invocation, PypiClient, SystemEffects};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::runtime::{format_status_message, to_json_response, CommandGroup};
pub use crate::core::tooling::diagnostics::commands as diag_commands;
pub use crate::core::tooling::diagnostics::reasons;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome, UserError};
pub use crate::core::tooling::progress;

pub use crate::core::deps::{
    download_dependencies, filter_system_packages, pin_dependencies, DownloadRequest,
    FilterRequest, PinRequest, DEFAULT_MAX_VERSIONS,
};
pub use crate::core::distribution::{
    generate_index, upload_index, BuildInfo, IndexRequest, UploadRequest,
};
pub use crate::core::wheels::{
    dedupe_wheels, disambiguate_wheels, inspect_wheel, normalize_wheels, DedupeRequest,
    DisambiguateRequest, InspectRequest, NormalizeRequest,
};
pub use crate::core::wheels::probe::{
    CommandMetadataProbe, MetadataProbe, ProbeReport, ZipMetadataProbe,
};
