//! Output formatting utilities

use colored::*;
use serde::Serialize;
use smartcare_session::GateDecision;
use smartcare_types::SessionState;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Print a serializable value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a session state in the chosen format.
pub fn print_state(state: &SessionState, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(state),
        OutputFormat::Text => {
            println!("Session: {}", state.status().to_string().bold());
            if let Some(identity) = state.identity() {
                println!("  Identity: {} ({})", identity.id, identity.email);
            }
            match state.profile() {
                Some(profile) => println!(
                    "  Profile:  {}, {} (license {})",
                    profile.full_name, profile.specialty, profile.license_number
                ),
                None if state.is_signed_in() => {
                    println!("  Profile:  {}", "missing; run complete-profile".yellow())
                }
                None => {}
            }
            Ok(())
        }
    }
}

/// One-line rendering of a gate decision.
pub fn describe_decision(decision: GateDecision) -> String {
    match decision {
        GateDecision::Render(route) => format!("{} {}", "render".green(), route),
        GateDecision::Placeholder => format!("{}", "placeholder".dimmed()),
        GateDecision::Redirect(route) => format!("{} {}", "redirect".yellow(), route),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}
