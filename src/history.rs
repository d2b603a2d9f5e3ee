use chrono::{DateTime, Utc};
use dialoguer::{Select, theme::ColorfulTheme};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub title: String,
    pub episode: String,
    pub timestamp: DateTime<Utc>,
    /// Search string handed to ani-cli; replays reuse it together with `index`.
    pub query: String,
    pub index: usize,
}

impl HistoryEntry {
    pub fn new(title: &str, episode: &str, query: &str, index: usize) -> Self {
        Self {
            title: title.to_string(),
            episode: episode.to_string(),
            timestamp: Utc::now(),
            query: query.to_string(),
            index,
        }
    }

    fn same_viewing(&self, other: &HistoryEntry) -> bool {
        self.title == other.title && self.episode == other.episode
    }
}

/// Chronological watch log, oldest first.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

impl History {
    /// Appends unless it repeats the latest entry's title and episode.
    /// Returns whether anything was added.
    pub fn record(&mut self, entry: HistoryEntry) -> bool {
        if self
            .entries
            .last()
            .is_some_and(|last| last.same_viewing(&entry))
        {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest_first(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn select_entry(&self) -> dialoguer::Result<Option<HistoryEntry>> {
        if self.entries.is_empty() {
            println!("History is empty.");
            return Ok(None);
        }

        let recent: Vec<&HistoryEntry> = self.latest_first().collect();
        let items: Vec<String> = recent
            .iter()
            .map(|entry| {
                format!(
                    "{} \u{00b7} episode {} \u{00b7} watched {}",
                    entry.title,
                    entry.episode,
                    entry.timestamp.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();

        let selection = Select::with_theme(&theme())
            .with_prompt("Select an entry to replay (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.map(|idx| recent[idx].clone()))
    }
}

pub fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}
