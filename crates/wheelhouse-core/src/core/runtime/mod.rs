pub(crate) mod effects;
pub(crate) mod process;

use std::fmt;

use serde_json::{json, Value};

use crate::config::context::CommandInfo;
use crate::outcome::ExecutionOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandGroup {
    Dedupe,
    Disambiguate,
    Inspect,
    Normalize,
    Pin,
    Filter,
    Download,
    Index,
    Upload,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandGroup::Dedupe => "dedupe",
            CommandGroup::Disambiguate => "disambiguate",
            CommandGroup::Inspect => "inspect",
            CommandGroup::Normalize => "normalize",
            CommandGroup::Pin => "pin",
            CommandGroup::Filter => "filter",
            CommandGroup::Download => "download",
            CommandGroup::Index => "index",
            CommandGroup::Upload => "upload",
        };
        f.write_str(name)
    }
}

#[must_use]
pub fn to_json_response(info: CommandInfo, outcome: &ExecutionOutcome) -> Value {
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": outcome.status.label(),
        "message": format_status_message(info, &outcome.message),
        "details": details,
    })
}

#[must_use]
pub fn format_status_message(info: CommandInfo, message: &str) -> String {
    let group_name = info.group.to_string();
    let prefix = if group_name == info.name {
        format!("wheelhouse {}", info.name)
    } else {
        format!("wheelhouse {} {}", group_name, info.name)
    };
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}
