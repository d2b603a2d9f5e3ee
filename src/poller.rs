use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::providers::AnimeProvider;
use crate::store::LibraryStore;
use crate::types::{ResultRecord, Translation};

pub const TITLE_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Library entries whose episode count went up, already carrying the new count.
    pub updated: Vec<ResultRecord>,
    pub checked: usize,
    pub failed: usize,
}

/// Re-searches every tracked title and bumps stored episode counts that the
/// remote has overtaken. Per-title failures are logged and skipped.
pub async fn check_updates(
    provider: &impl AnimeProvider,
    store: &mut LibraryStore,
    translation: Translation,
    pause: Duration,
) -> UpdateReport {
    let tracked: Vec<(String, String)> = store
        .library()
        .values()
        .map(|entry| (entry.id.clone(), entry.title.clone()))
        .collect();

    let mut report = UpdateReport::default();
    for (pos, (id, title)) in tracked.iter().enumerate() {
        if pos > 0 {
            sleep(pause).await;
        }
        report.checked += 1;

        let results = match provider.search_shows(title, translation).await {
            Ok(results) => results,
            Err(err) => {
                warn!(%title, %err, "update check failed");
                report.failed += 1;
                continue;
            }
        };
        let Some(remote) = results.into_iter().find(|r| &r.id == id) else {
            debug!(%title, "title no longer in search results");
            continue;
        };
        let Some(entry) = store.library_mut().get_mut(id) else {
            continue;
        };
        if remote.episodes > entry.episodes {
            info!(%title, from = entry.episodes, to = remote.episodes, "new episodes");
            entry.episodes = remote.episodes;
            report.updated.push(entry.clone());
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::types::SortKey;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct FakeAllAnime {
        pages: HashMap<String, Result<Vec<ResultRecord>, String>>,
        searched: Mutex<Vec<String>>,
    }

    impl FakeAllAnime {
        fn new(pages: &[(&str, Result<Vec<ResultRecord>, String>)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(q, r)| (q.to_string(), r.clone()))
                    .collect(),
                searched: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnimeProvider for FakeAllAnime {
        async fn search_shows(
            &self,
            query: &str,
            _translation: Translation,
        ) -> Result<Vec<ResultRecord>> {
            self.searched.lock().unwrap().push(query.to_string());
            match self.pages.get(query) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(msg)) => Err(Error::Remote(msg.clone())),
                None => Ok(Vec::new()),
            }
        }

        async fn browse_shows(&self, _: Translation, _: SortKey, _: u32) -> Vec<ResultRecord> {
            Vec::new()
        }

        async fn fetch_episodes(&self, _: &str, _: Translation) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn record(id: &str, title: &str, episodes: u32) -> ResultRecord {
        ResultRecord {
            index: 1,
            id: id.to_string(),
            title: title.to_string(),
            episodes,
            synopsis: None,
        }
    }

    fn store_with(entries: &[ResultRecord]) -> (tempfile::TempDir, LibraryStore) {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = LibraryStore::load(tmp.path().join("store.json"));
        for entry in entries {
            store.track(entry.clone());
        }
        (tmp, store)
    }

    #[tokio::test(start_paused = true)]
    async fn increased_count_is_stored_and_reported() {
        let (_tmp, mut store) = store_with(&[record("A", "Alpha", 5)]);
        let provider = FakeAllAnime::new(&[(
            "Alpha",
            Ok(vec![record("Z", "Alpha Zero", 99), record("A", "Alpha", 7)]),
        )]);

        let report = check_updates(&provider, &mut store, Translation::Sub, TITLE_PAUSE).await;

        assert_eq!(store.library()["A"].episodes, 7);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.updated[0].id, "A");
        assert_eq!(report.updated[0].episodes, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn same_count_or_missing_id_changes_nothing() {
        let (_tmp, mut store) = store_with(&[record("A", "Alpha", 5), record("B", "Beta", 2)]);
        let provider = FakeAllAnime::new(&[
            ("Alpha", Ok(vec![record("A", "Alpha", 5)])),
            ("Beta", Ok(vec![record("C", "Beta Prime", 12)])),
        ]);

        let report = check_updates(&provider, &mut store, Translation::Sub, TITLE_PAUSE).await;

        assert!(report.updated.is_empty());
        assert_eq!(store.library()["A"].episodes, 5);
        assert_eq!(store.library()["B"].episodes, 2);
        assert_eq!(report.checked, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_title_is_skipped_and_scan_continues() {
        let (_tmp, mut store) = store_with(&[record("A", "Alpha", 1), record("B", "Beta", 1)]);
        let provider = FakeAllAnime::new(&[
            ("Alpha", Err("HTTP 500".to_string())),
            ("Beta", Ok(vec![record("B", "Beta", 3)])),
        ]);

        let report = check_updates(&provider, &mut store, Translation::Sub, TITLE_PAUSE).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(store.library()["B"].episodes, 3);
        assert_eq!(*provider.searched.lock().unwrap(), vec!["Alpha", "Beta"]);
    }

    #[tokio::test(start_paused = true)]
    async fn titles_are_spaced_by_the_pause() {
        let entries = [record("A", "Alpha", 1), record("B", "Beta", 1), record("C", "Gamma", 1)];
        let (_tmp, mut store) = store_with(&entries);
        let provider = FakeAllAnime::new(&[]);

        let start = Instant::now();
        check_updates(&provider, &mut store, Translation::Dub, TITLE_PAUSE).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
    }
}
