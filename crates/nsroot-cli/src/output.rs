//! Formatted output helpers for the CLI.

use std::io::Write;

use nsroot_core::config::LaunchPlan;

/// Renders a launch plan as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_plan(plan: &LaunchPlan) -> serde_json::Result<String> {
    serde_json::to_string_pretty(plan)
}

/// Writes a launch plan to standard output.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_plan(plan: &LaunchPlan) -> anyhow::Result<()> {
    let rendered = render_plan(plan)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}
