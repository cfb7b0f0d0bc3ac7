//! TUI rendering traits for livecal types.
//!
//! Extension traits that add colored terminal rendering to livecal-core types
//! using owo_colors.

use livecal_core::ApplyStats;
use livecal_core::event::{FieldValue, LocalEvent};
use livecal_core::local::{MutationAction, Notification};
use livecal_core::wire::{Document, WireValue};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for MutationAction {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            MutationAction::Create => symbol.green().to_string(),
            MutationAction::Update => symbol.yellow().to_string(),
            MutationAction::Delete => symbol.red().to_string(),
        }
    }
}

impl Render for ApplyStats {
    fn render(&self) -> String {
        if !self.has_changes() && self.skipped == 0 {
            return "No remote changes".dimmed().to_string();
        }

        let mut parts = Vec::new();
        if self.created > 0 {
            parts.push(format!("{} created", self.created).green().to_string());
        }
        if self.updated > 0 {
            parts.push(format!("{} updated", self.updated).yellow().to_string());
        }
        if self.deleted > 0 {
            parts.push(format!("{} deleted", self.deleted).red().to_string());
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped).dimmed().to_string());
        }
        parts.join(", ")
    }
}

impl Render for LocalEvent {
    fn render(&self) -> String {
        let start = self
            .get("start_date")
            .and_then(FieldValue::as_datetime)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        format!("{} {} {}", self.id.dimmed(), self, start.dimmed())
    }
}

impl Render for Document {
    fn render(&self) -> String {
        let text = self
            .get("text")
            .and_then(WireValue::as_str)
            .unwrap_or("(untitled)");

        format!("{} {}", self.id.dimmed(), text)
    }
}

impl Render for Notification {
    fn render(&self) -> String {
        match self {
            Notification::LiveUpdateCollision { id, action, .. } => format!(
                "{} {} {} {} while open in the editor",
                "!".yellow(),
                action.render(),
                id,
                action.to_string().yellow()
            ),
            Notification::OutboundFailed {
                id,
                action,
                message,
            } => format!(
                "{} failed to {} {}: {}",
                "!".red(),
                action,
                id,
                message.red()
            ),
        }
    }
}
