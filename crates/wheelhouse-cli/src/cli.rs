use std::path::PathBuf;

use clap::builder::TypedValueParser;
use clap::{value_parser, ArgAction, Args, Parser, Subcommand};
use wheelhouse_core::{MissingBasePolicy, DEFAULT_MAX_VERSIONS};

pub const WHEELHOUSE_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const WHEELHOUSE_BEFORE_HELP: &str = concat!(
    "wheelhouse ",
    env!("CARGO_PKG_VERSION"),
    " – ROCm wheel index pipeline\n\n",
    "\x1b[1;36mClean up\x1b[0m\n",
    "  dedupe           Keep only the custom torch/triton/... builds in the combined directory.\n",
    "  disambiguate     Keep the one vLLM wheel pinned to the custom torch/triton.\n",
    "  normalize        Drop local version segments (+git...) from wheel filenames.\n",
    "  inspect          Show whether a wheel pins the critical ROCm packages.\n\n",
    "\x1b[1;36mDependencies\x1b[0m\n",
    "  pin              Pin pyproject dependencies to the freshly built wheels.\n",
    "  filter           Drop system-installed packages from a dependency listing.\n",
    "  download         Fetch dependency wheels from PyPI, sampling version ranges.\n\n",
    "\x1b[1;36mPublish\x1b[0m\n",
    "  index            Write a PEP 503 simple index and landing page.\n",
    "  upload           Sync wheels and index to an S3 bucket.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "wheelhouse",
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = WHEELHOUSE_BEFORE_HELP,
    help_template = WHEELHOUSE_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct WheelhouseCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Read settings from this TOML file (default: ./wheelhouse.toml when present)",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Remove stock builds of tracked packages, keeping the custom wheels.",
        override_usage = "wheelhouse dedupe <BASE_DIR> <ALL_DIR> [--packages A,B] [--dry-run]",
        after_help = "Examples:\n  wheelhouse dedupe ./base-wheels ./all-wheels\n  wheelhouse dedupe ./base ./all --missing-base lenient --disambiguate"
    )]
    Dedupe(DedupeArgs),
    #[command(
        about = "Keep the vLLM wheel whose metadata pins the custom torch/triton.",
        override_usage = "wheelhouse disambiguate <BASE_DIR> <ALL_DIR> [--keep-first] [--dry-run]"
    )]
    Disambiguate(DisambiguateArgs),
    #[command(
        about = "Report how a wheel pins the critical ROCm packages.",
        override_usage = "wheelhouse inspect <WHEEL>"
    )]
    Inspect(InspectArgs),
    #[command(
        about = "Rename wheels to drop local version segments (+git...).",
        override_usage = "wheelhouse normalize <DIR> [--recursive] [--dry-run]"
    )]
    Normalize(NormalizeArgs),
    #[command(
        about = "Pin pyproject dependencies to the custom wheels in an install directory.",
        override_usage = "wheelhouse pin <INSTALL_DIR> <PYPROJECT>"
    )]
    Pin(PinArgs),
    #[command(
        about = "Drop system packages from a dependency listing.",
        override_usage = "wheelhouse filter <INPUT> <OUTPUT> [--check-location]"
    )]
    Filter(FilterArgs),
    #[command(
        about = "Download dependency wheels from PyPI, sampling loose version ranges.",
        override_usage = "wheelhouse download --requirements <FILE> --output-dir <DIR> [--max-versions N]"
    )]
    Download(DownloadArgs),
    #[command(
        about = "Generate a PEP 503 simple index and landing page for a wheel directory.",
        override_usage = "wheelhouse index --wheels-dir <DIR> --output-dir <DIR> --base-url <URL>",
        after_help = "Examples:\n  wheelhouse index --wheels-dir ./wheels --output-dir ./site --base-url https://my-bucket.s3.amazonaws.com"
    )]
    Index(IndexArgs),
    #[command(
        about = "Sync wheels and the generated index to an S3 bucket.",
        override_usage = "wheelhouse upload <WHEELS_DIR> <INDEX_DIR> <BUCKET> [REGION] [--delete] [--dry-run]"
    )]
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct DedupeArgs {
    #[arg(value_name = "BASE_DIR", help = "Directory holding the custom-built wheels")]
    pub base_dir: PathBuf,
    #[arg(value_name = "ALL_DIR", help = "Combined directory to clean in place")]
    pub all_dir: PathBuf,
    #[arg(
        long,
        value_delimiter = ',',
        value_name = "NAMES",
        help = "Tracked packages (comma separated; overrides config and WHEELHOUSE_TRACKED)"
    )]
    pub packages: Option<Vec<String>>,
    #[arg(
        long,
        help = "Also track flash_attn and aiter",
        conflicts_with = "packages"
    )]
    pub extended: bool,
    #[arg(
        long,
        value_name = "POLICY",
        value_parser = value_parser!(MissingBasePolicy),
        help = "What to do when a tracked package has no custom wheel: strict or lenient"
    )]
    pub missing_base: Option<MissingBasePolicy>,
    #[arg(long, help = "Run vLLM disambiguation after the per-package cleanup")]
    pub disambiguate: bool,
    #[arg(
        long,
        requires = "disambiguate",
        help = "Keep the first candidate instead of failing when disambiguation is ambiguous"
    )]
    pub keep_first: bool,
    #[arg(long, help = "Report the plan without deleting anything")]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DisambiguateArgs {
    #[arg(value_name = "BASE_DIR", help = "Directory holding the custom-built wheels")]
    pub base_dir: PathBuf,
    #[arg(value_name = "ALL_DIR", help = "Combined directory to clean in place")]
    pub all_dir: PathBuf,
    #[arg(long, value_name = "NAME", help = "Package to disambiguate (default: vllm)")]
    pub package: Option<String>,
    #[arg(
        long,
        value_delimiter = ',',
        value_name = "NAMES",
        help = "Packages whose exact pins identify the right build (default: torch,triton)"
    )]
    pub pins: Option<Vec<String>>,
    #[arg(
        long,
        value_name = "COMMAND",
        help = "External metadata checker; the wheel path is appended as the last argument"
    )]
    pub metadata_command: Option<String>,
    #[arg(
        long,
        help = "Keep the first candidate instead of failing when the result is ambiguous"
    )]
    pub keep_first: bool,
    #[arg(long, help = "Report the plan without deleting anything")]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(value_name = "WHEEL")]
    pub wheel: PathBuf,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,
    #[arg(long, help = "Show renames without touching files")]
    pub dry_run: bool,
    #[arg(short, long, help = "Descend into subdirectories")]
    pub recursive: bool,
}

#[derive(Args, Debug)]
pub struct PinArgs {
    #[arg(value_name = "INSTALL_DIR", help = "Directory holding the custom wheels")]
    pub install_dir: PathBuf,
    #[arg(value_name = "PYPROJECT", help = "pyproject.toml to rewrite (backed up to .bak)")]
    pub pyproject: PathBuf,
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
    #[arg(
        long,
        help = "Also drop packages `pip show` places under /dist-packages"
    )]
    pub check_location: bool,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[arg(long, value_name = "FILE", help = "Requirements file (follows -r includes)")]
    pub requirements: PathBuf,
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_VERSIONS,
        value_parser = value_parser!(u16).range(1..).map(usize::from),
        help = "Versions to download per ranged requirement"
    )]
    pub max_versions: usize,
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct IndexArgs {
    #[arg(long, value_name = "DIR")]
    pub wheels_dir: PathBuf,
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,
    #[arg(
        long,
        alias = "s3-url",
        value_name = "URL",
        help = "Public base URL of the bucket (e.g. https://my-bucket.s3.amazonaws.com)"
    )]
    pub base_url: String,
    #[arg(long, help = "Skip sha256 fragments")]
    pub no_hashes: bool,
    #[arg(long, help = "Skip data-requires-python attributes")]
    pub no_metadata: bool,
    #[arg(long, default_value = "N/A")]
    pub rocm_version: String,
    #[arg(long, default_value = "N/A")]
    pub python_version: String,
    #[arg(long, default_value = "N/A")]
    pub gpu_arch: String,
    #[arg(long, default_value = "latest")]
    pub vllm_version: String,
    #[arg(
        long,
        value_name = "TEXT",
        help = "Build date shown on the landing page (default: now, UTC)"
    )]
    pub build_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[arg(value_name = "WHEELS_DIR")]
    pub wheels_dir: PathBuf,
    #[arg(value_name = "INDEX_DIR")]
    pub index_dir: PathBuf,
    #[arg(value_name = "BUCKET")]
    pub bucket: String,
    #[arg(value_name = "REGION", help = "AWS region (default: us-east-1 or config)")]
    pub region: Option<String>,
    #[arg(long, help = "Delete bucket packages missing from WHEELS_DIR")]
    pub delete: bool,
    #[arg(long, help = "Pass --dryrun to every aws s3 sync")]
    pub dry_run: bool,
}
