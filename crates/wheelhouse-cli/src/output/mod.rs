mod failure;

use atty::Stream;
use color_eyre::Result;
use serde_json::Value;
use wheelhouse_core::{CommandInfo, CommandStatus, ExecutionOutcome};

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(
    opts: &OutputOptions,
    info: CommandInfo,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = outcome.status.exit_code();

    if opts.json {
        let payload = wheelhouse_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    match outcome.status {
        CommandStatus::Ok => {
            if opts.quiet {
                return Ok(code);
            }
            let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
            let (headline, body) = split_message(&outcome.message);
            let message = wheelhouse_core::format_status_message(info, headline);
            println!("{}", style.status(&outcome.status, &message));
            if let Some(body) = body {
                println!("{body}");
            }
            if let Some(hint) = hint_from_details(&outcome.details) {
                println!("{}", style.info(&format!("Tip: {hint}")));
            }
        }
        CommandStatus::UserError | CommandStatus::Failure => {
            let style = Style::new(opts.no_color, atty::is(Stream::Stderr));
            let header = format!(
                "{}  {}",
                failure::error_code(info),
                wheelhouse_core::format_status_message(info, &outcome.message)
            );
            eprintln!("{}", style.error_header(&header));
            eprintln!();
            eprintln!("Why:");
            for reason in failure::collect_why_bullets(&outcome.details, &outcome.message) {
                eprintln!("  • {reason}");
            }
            let fixes = failure::collect_fix_bullets(&outcome.details);
            if !fixes.is_empty() {
                eprintln!();
                eprintln!("Fix:");
                for fix in fixes {
                    eprintln!("{}", style.fix_bullet(&format!("  • {fix}")));
                }
            }
        }
    }

    Ok(code)
}

/// Multi-line reports print their first line as the status headline.
fn split_message(message: &str) -> (&str, Option<&str>) {
    match message.split_once('\n') {
        Some((headline, body)) if !body.trim().is_empty() => (headline, Some(body)),
        Some((headline, _)) => (headline, None),
        None => (message, None),
    }
}

pub(crate) fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}
