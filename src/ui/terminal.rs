//! Terminal rendering for the headless CLI loop.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{LogLevel, LoopStatus, UiMessage, UiSink};
use crate::history::format_duration_ms;
use crate::testing::{InactivityChoice, InactivityPrompter};

/// Prints loop notifications to stdout.
#[derive(Default)]
pub struct TerminalSink {
    countdown: Mutex<Option<ProgressBar>>,
}

impl std::fmt::Debug for TerminalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSink").finish_non_exhaustive()
    }
}

impl TerminalSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn status_label(status: LoopStatus) -> String {
        match status {
            LoopStatus::Idle => "IDLE".dimmed().to_string(),
            LoopStatus::Running => "RUNNING".green().bold().to_string(),
            LoopStatus::Waiting => "WAITING".cyan().bold().to_string(),
            LoopStatus::Paused => "PAUSED".yellow().bold().to_string(),
        }
    }

    fn countdown(&self, seconds: u32) {
        let mut slot = self.countdown.lock().unwrap_or_else(PoisonError::into_inner);
        if seconds == 0 {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
            return;
        }
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(u64::from(seconds));
            let style = ProgressStyle::with_template("  next task in {msg}s {bar:20.cyan/blue}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        bar.set_message(seconds.to_string());
        bar.set_position(bar.length().unwrap_or(0).saturating_sub(u64::from(seconds)));
    }

    /// Render one message as a terminal line, if it has one.
    #[must_use]
    pub fn format(message: &UiMessage) -> Option<String> {
        match message {
            UiMessage::Status {
                status,
                iteration,
                task,
            } => {
                let mut line = format!("{} iteration {}", Self::status_label(*status), iteration);
                if let Some(task) = task {
                    line.push_str(&format!(": {}", task.description));
                    if !task.unmet_dependencies.is_empty() {
                        line.push_str(&format!(
                            " {}",
                            format!("(waiting on {})", task.unmet_dependencies.join(", ")).dimmed()
                        ));
                    }
                }
                Some(line)
            }
            UiMessage::Log { message, level, .. } => Some(match level {
                LogLevel::Info => message.clone(),
                LogLevel::Success => format!("{} {}", "OK".green().bold(), message),
                LogLevel::Warning => format!("{} {}", "Warning:".yellow(), message),
                LogLevel::Error => format!("{} {}", "Error:".red().bold(), message),
            }),
            UiMessage::Stats(stats) => Some(format!(
                "   {} done, {} pending, {} blocked, {} skipped ({:.0}%)",
                stats.complete,
                stats.actionable(),
                stats.blocked,
                stats.skipped,
                stats.percent_done()
            )),
            UiMessage::SessionTiming { completions, .. } => {
                let total: u64 = completions.iter().map(|c| c.duration_ms).sum();
                (!completions.is_empty()).then(|| {
                    format!(
                        "   session: {} tasks in {}",
                        completions.len(),
                        format_duration_ms(total)
                    )
                })
            }
            UiMessage::PrdGenerating => Some("Generating task document...".cyan().to_string()),
            UiMessage::PrdGenerated => Some(format!("{} Task document created", "OK".green().bold())),
            UiMessage::Countdown { .. } | UiMessage::History { .. } | UiMessage::Refresh => None,
        }
    }
}

impl UiSink for TerminalSink {
    fn deliver(&self, message: UiMessage) {
        if let UiMessage::Countdown { seconds } = message {
            self.countdown(seconds);
            return;
        }
        if let Some(line) = Self::format(&message) {
            println!("{line}");
        }
    }
}

// ============================================================================
// Terminal Prompter
// ============================================================================

/// Map a typed answer to a choice. Empty input keeps waiting.
#[must_use]
pub fn parse_choice(input: &str) -> Option<InactivityChoice> {
    match input.trim().to_lowercase().as_str() {
        "" | "c" | "continue" => Some(InactivityChoice::Continue),
        "r" | "retry" => Some(InactivityChoice::Retry),
        "s" | "skip" => Some(InactivityChoice::Skip),
        "q" | "stop" | "quit" => Some(InactivityChoice::Stop),
        _ => None,
    }
}

/// Asks inactivity questions on stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

#[async_trait]
impl InactivityPrompter for TerminalPrompter {
    async fn ask(&self, task_description: &str) -> Option<InactivityChoice> {
        println!(
            "\n{} No activity on: {}",
            "Stalled:".yellow().bold(),
            task_description
        );
        println!("   [c]ontinue waiting, [r]etry, [s]kip, [q] stop");

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => parse_choice(&line),
        }
    }

    fn notify(&self, level: LogLevel, message: &str) {
        if let Some(line) = TerminalSink::format(&UiMessage::highlight(level, message)) {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::TaskStats;

    #[test]
    fn test_format_skips_silent_messages() {
        assert!(TerminalSink::format(&UiMessage::Refresh).is_none());
        assert!(TerminalSink::format(&UiMessage::Countdown { seconds: 2 }).is_none());
    }

    #[test]
    fn test_format_log_levels() {
        colored::control::set_override(false);
        let line = TerminalSink::format(&UiMessage::log(LogLevel::Warning, "slow")).unwrap();
        assert_eq!(line, "Warning: slow");
    }

    #[test]
    fn test_format_stats_line() {
        colored::control::set_override(false);
        let stats = TaskStats {
            total: 4,
            pending: 1,
            in_progress: 0,
            complete: 2,
            blocked: 1,
            skipped: 0,
        };
        let line = TerminalSink::format(&UiMessage::Stats(stats)).unwrap();
        assert!(line.contains("2 done, 1 pending, 1 blocked"));
        assert!(line.contains("(50%)"));
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("\n"), Some(InactivityChoice::Continue));
        assert_eq!(parse_choice("R"), Some(InactivityChoice::Retry));
        assert_eq!(parse_choice(" skip "), Some(InactivityChoice::Skip));
        assert_eq!(parse_choice("q"), Some(InactivityChoice::Stop));
        assert_eq!(parse_choice("maybe"), None);
    }
}
