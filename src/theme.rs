/// Console presentation: ANSI colors, banner, strategy menu, and progress lines.
///
/// Rendering functions return strings so they can be tested; the `print_*`
/// wrappers write them to stdout.
use crate::controller::{ControllerEvent, RunOutcome, RunReport, Strategy};
use crate::retry::FailureKind;

// ---------------------------------------------------------------------------
// ANSI color helpers
// ---------------------------------------------------------------------------

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const CYAN: &str = "\x1b[36m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BOLD_CYAN: &str = "\x1b[1;36m";
pub const BOLD_GREEN: &str = "\x1b[1;32m";
pub const BOLD_YELLOW: &str = "\x1b[1;33m";
pub const BOLD_RED: &str = "\x1b[1;31m";

pub const RULE_WIDTH: usize = 60;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

// ---------------------------------------------------------------------------
// Banner and strategy menu
// ---------------------------------------------------------------------------

pub fn print_startup_banner(model: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!(
        "  {BOLD_CYAN}adaptive-analyzer{RESET} {DIM}v{version}{RESET}  {DIM}·{RESET}  {GREEN}{model}{RESET}"
    );
    println!("  {DIM}{}{RESET}", "━".repeat(RULE_WIDTH));
}

fn format_minutes(seconds: u64) -> String {
    if seconds % 60 == 0 {
        format!("{} min", seconds / 60)
    } else {
        format!("{:.1} min", seconds as f64 / 60.0)
    }
}

pub fn render_strategy_menu(strategies: &[Strategy]) -> String {
    let mut out = format!("{BOLD}Analysis strategies (tried in order):{RESET}\n");
    for (index, strategy) in strategies.iter().enumerate() {
        out.push_str(&format!(
            "  {DIM}{}.{RESET} {CYAN}{}{RESET} ({}) - {}\n",
            index + 1,
            strategy.name,
            format_minutes(strategy.timeout.as_secs()),
            scope_blurb(strategy)
        ));
    }
    out.push_str(&format!(
        "{DIM}The analyzer falls back automatically if services are slow or overloaded.{RESET}"
    ));
    out
}

fn scope_blurb(strategy: &Strategy) -> &'static str {
    match strategy.scope {
        crate::controller::Scope::Full => "complete research with web search",
        crate::controller::Scope::Quick => "essential insights, one search",
        crate::controller::Scope::Emergency => "basic assessment, no web search",
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// One progress line per controller event.
pub fn render_progress(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::AttemptStarted {
            strategy,
            scope,
            attempt,
            timeout,
        } => {
            let retry_note = if *attempt > 1 {
                format!(" {DIM}(attempt {attempt}){RESET}")
            } else {
                String::new()
            };
            format!(
                "{BOLD_CYAN}▶{RESET} {strategy}{retry_note} {DIM}[scope={scope}, timeout {}]{RESET}",
                format_minutes(timeout.as_secs())
            )
        }
        ControllerEvent::AttemptFailed {
            strategy,
            kind,
            message,
            ..
        } => {
            let label = match kind {
                FailureKind::RateLimited => "rate limited",
                FailureKind::Overloaded => "service overloaded",
                FailureKind::Timeout => "timed out",
                FailureKind::Fatal => "failed",
            };
            format!(
                "{BOLD_YELLOW}!{RESET} {strategy} {label}: {DIM}{}{RESET}",
                shorten(message, 100)
            )
        }
        ControllerEvent::RetryScheduled { delay, retry, .. } => format!(
            "{YELLOW}⏳{RESET} waiting {:.1}s before retry {retry}",
            delay.as_secs_f64()
        ),
        ControllerEvent::StrategyAdvanced { to, .. } => {
            format!("{YELLOW}↓{RESET} falling back to {to}")
        }
        ControllerEvent::Succeeded { strategy, .. } => {
            format!("{BOLD_GREEN}✓{RESET} {strategy} succeeded")
        }
    }
}

pub fn print_progress(event: &ControllerEvent) {
    println!("{}", render_progress(event));
}

fn shorten(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    format!("{}...", trimmed.chars().take(max_chars).collect::<String>())
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub fn print_results(output: &str) {
    println!();
    println!("{BOLD}ANALYSIS RESULTS{RESET}");
    println!("{}", rule());
    println!("{output}");
}

pub fn render_failure(report: &RunReport) -> String {
    match &report.outcome {
        RunOutcome::Succeeded { .. } => String::new(),
        RunOutcome::Exhausted { last_error } => {
            let detail = match last_error.as_ref().map(|err| err.kind) {
                Some(FailureKind::Timeout) => {
                    "All strategies timed out. The service may be overloaded."
                }
                Some(FailureKind::RateLimited) => {
                    "API quota exhausted and all retries failed."
                }
                Some(FailureKind::Overloaded) => {
                    "Service is overloaded and all retry attempts failed."
                }
                _ => "Analysis could not be completed after all strategies.",
            };
            format!("{BOLD_RED}✗{RESET} {detail}")
        }
        RunOutcome::Aborted { strategy, error } => format!(
            "{BOLD_RED}✗{RESET} {strategy} stopped on a non-recoverable error: {}",
            error.message
        ),
    }
}

pub fn failure_suggestions() -> [&'static str; 3] {
    [
        "Try again in 10-15 minutes when services are less loaded",
        "Use a simpler, more specific product name",
        "Check your internet connection and API keys (adaptive-analyzer doctor)",
    ]
}

pub fn print_failure(report: &RunReport) {
    println!();
    println!("{}", render_failure(report));
    println!();
    println!("💡 Suggestions:");
    for suggestion in failure_suggestions() {
        println!("  • {suggestion}");
    }
}

pub fn render_interrupted() -> String {
    format!(
        "\nAnalysis interrupted by user.\n{DIM}The adaptive controller handles API delays automatically; rerun when ready.{RESET}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::default_strategies;
    use std::time::Duration;

    #[test]
    fn menu_lists_strategies_with_minutes() {
        let menu = render_strategy_menu(&default_strategies());
        assert!(menu.contains("Full Analysis"));
        assert!(menu.contains("(10 min)"));
        assert!(menu.contains("(5 min)"));
        assert!(menu.contains("(2 min)"));
        assert!(format_minutes(90).contains("1.5 min"));
    }

    #[test]
    fn interruption_notice_suggests_a_rerun() {
        let notice = render_interrupted();
        assert!(notice.starts_with("\nAnalysis interrupted by user."));
        assert!(notice.contains("rerun when ready"));
    }

    #[test]
    fn progress_lines_describe_each_event() {
        let waiting = render_progress(&ControllerEvent::RetryScheduled {
            strategy: "Quick Analysis".to_string(),
            retry: 2,
            kind: FailureKind::Overloaded,
            delay: Duration::from_millis(60_000),
        });
        assert!(waiting.contains("waiting 60.0s before retry 2"));

        let failed = render_progress(&ControllerEvent::AttemptFailed {
            strategy: "Full Analysis".to_string(),
            attempt: 1,
            kind: FailureKind::Timeout,
            message: "x".repeat(150),
        });
        assert!(failed.contains("Full Analysis timed out"));
        assert!(failed.contains(&format!("{}...", "x".repeat(100))));
    }
}
