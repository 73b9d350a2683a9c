//! Terminal notifier
//!
//! Prints job notifications as coloured lines on stdout.

use cierre_core::domain::job::{JobHandle, Progress};
use cierre_poller::{Notification, NotificationLevel, Notifier};
use colored::*;

/// Notifier printing to the terminal
#[derive(Debug, Clone, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, n: Notification) {
        let marker = match n.level {
            NotificationLevel::Info => "▸".cyan(),
            NotificationLevel::Success => "✓".green(),
            NotificationLevel::Warning => "⚠".yellow(),
            NotificationLevel::Error => "✗".red(),
        };
        let message = match n.level {
            NotificationLevel::Error => n.message.red(),
            NotificationLevel::Warning => n.message.yellow(),
            _ => n.message.normal(),
        };

        println!(
            "{} {} {}",
            n.at.format("%H:%M:%S").to_string().dimmed(),
            marker,
            message
        );
    }

    fn progress(&self, handle: &JobHandle, progress: &Progress) {
        println!(
            "{} {:>3}% {}",
            handle.task_id.dimmed(),
            progress.percentage,
            progress.description.dimmed()
        );
    }
}
