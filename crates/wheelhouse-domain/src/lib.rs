#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod metadata;
pub mod names;
pub mod requirements;
pub mod wheel;

pub use metadata::{
    declares_exact_pin, exact_pin_version, CriticalDependency, MetadataError, WheelMetadata,
    CRITICAL_PACKAGES,
};
pub use names::{
    html_escape, normalize_package_name, requires_python_from_tag, same_package,
    strip_local_version,
};
pub use requirements::{
    dependency_name, parse_requirement_line, read_requirements_file, split_requirement,
    strip_inline_comment, RequirementParts,
};
pub use wheel::{is_wheel_file, parse_wheel_filename, WheelFilename, WheelNameError};
