use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::ImageCache;
use crate::error::Result;
use crate::history::HistoryEntry;
use crate::providers::AnimeProvider;
use crate::types::{ResultRecord, Translation};

/// Identifies one search/browse invocation. Only the newest ticket may publish results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// What the user has picked so far. `query` plus `index` is what ani-cli needs
/// to find the show again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub query: Option<String>,
    pub index: Option<usize>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub episode: Option<String>,
}

/// State owned by the foreground task: the current page, the selection and
/// the thumbnails for that page.
#[derive(Debug)]
pub struct Session {
    generation: u64,
    query: String,
    results: Vec<ResultRecord>,
    selection: Selection,
    images: Arc<ImageCache>,
}

impl Session {
    pub fn new(images: Arc<ImageCache>) -> Self {
        Self {
            generation: 0,
            query: String::new(),
            results: Vec::new(),
            selection: Selection::default(),
            images,
        }
    }

    /// Starts a new search or browse. Anything still in flight for an older
    /// ticket will be ignored by `apply`.
    pub fn begin(&mut self, query: &str) -> Ticket {
        self.generation += 1;
        self.query = query.to_string();
        self.results.clear();
        self.selection = Selection::default();
        self.images.clear();
        debug!(generation = self.generation, query, "search started");
        Ticket(self.generation)
    }

    pub fn apply(&mut self, ticket: Ticket, results: Vec<ResultRecord>) -> bool {
        if ticket.0 != self.generation {
            info!(
                stale = ticket.0,
                current = self.generation,
                "dropping results of a superseded search"
            );
            return false;
        }
        self.results = results;
        true
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Picks a record from the current page. The page's query goes with it,
    /// empty for browse pages.
    pub fn select_anime(&mut self, record: &ResultRecord) {
        self.selection = Selection {
            query: Some(self.query.clone()).filter(|q| !q.is_empty()),
            index: Some(record.index),
            id: Some(record.id.clone()),
            title: Some(record.title.clone()),
            episode: None,
        };
    }

    pub fn select_episode(&mut self, episode: &str) {
        self.selection.episode = Some(episode.to_string());
    }

    /// Gives the selection a query/index pair ani-cli can resolve. Records from
    /// a browse page, the library or an update report carry an index relative
    /// to some other listing, so their title is searched again and the rank of
    /// the matching id is used. Returns false when the title cannot be found.
    pub async fn resolve_for_playback(
        &mut self,
        provider: &impl AnimeProvider,
        translation: Translation,
    ) -> Result<bool> {
        if self.selection.query.is_some() {
            return Ok(true);
        }
        let (Some(id), Some(title)) = (self.selection.id.clone(), self.selection.title.clone())
        else {
            return Ok(false);
        };
        let page = provider.search_shows(&title, translation).await?;
        match page.iter().find(|r| r.id == id) {
            Some(found) => {
                self.selection.query = Some(title);
                self.selection.index = Some(found.index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// History entries already hold the query and index ani-cli was given.
    pub fn select_history(&mut self, entry: &HistoryEntry) {
        self.selection = Selection {
            query: Some(entry.query.clone()),
            index: Some(entry.index),
            id: None,
            title: Some(entry.title.clone()),
            episode: Some(entry.episode.clone()),
        };
    }

    /// Selection for an entry that did not come from the current page.
    pub fn select_detached(&mut self, record: &ResultRecord) {
        self.selection = Selection {
            query: None,
            index: None,
            id: Some(record.id.clone()),
            title: Some(record.title.clone()),
            episode: None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Thumbnail;
    use crate::types::SortKey;

    fn record(index: usize, id: &str) -> ResultRecord {
        ResultRecord {
            index,
            id: id.to_string(),
            title: format!("Title {id}"),
            episodes: 12,
            synopsis: None,
        }
    }

    struct OnePage(Vec<ResultRecord>);

    impl AnimeProvider for OnePage {
        async fn search_shows(&self, _: &str, _: Translation) -> Result<Vec<ResultRecord>> {
            Ok(self.0.clone())
        }

        async fn browse_shows(&self, _: Translation, _: SortKey, _: u32) -> Vec<ResultRecord> {
            Vec::new()
        }

        async fn fetch_episodes(&self, _: &str, _: Translation) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn stale_ticket_cannot_overwrite_newer_results() {
        let mut session = Session::new(Arc::new(ImageCache::default()));
        let old = session.begin("first");
        let new = session.begin("second");

        assert!(session.apply(new, vec![record(1, "new")]));
        assert!(!session.apply(old, vec![record(1, "old")]));
        assert_eq!(session.results()[0].id, "new");
        assert_eq!(session.query(), "second");
    }

    #[test]
    fn begin_clears_thumbnails_and_selection() {
        let images = Arc::new(ImageCache::default());
        let mut session = Session::new(Arc::clone(&images));
        let ticket = session.begin("q");
        session.apply(ticket, vec![record(1, "a")]);
        images.insert("a", Thumbnail::placeholder());
        session.select_anime(&record(1, "a"));

        session.begin("other");

        assert!(images.is_empty());
        assert_eq!(session.selection(), &Selection::default());
    }

    #[test]
    fn browse_selection_has_no_query() {
        let mut session = Session::new(Arc::new(ImageCache::default()));
        session.begin("");
        session.select_anime(&record(4, "b"));
        session.select_episode("2");
        let sel = session.selection();
        assert_eq!(sel.query, None);
        assert_eq!(sel.index, Some(4));
        assert_eq!(sel.episode.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn history_selection_is_ready_without_a_search() {
        let mut session = Session::new(Arc::new(ImageCache::default()));
        session.select_history(&HistoryEntry::new("Frieren", "7", "frieren", 2));
        let provider = OnePage(Vec::new());

        assert!(session.resolve_for_playback(&provider, Translation::Sub).await.unwrap());
        let sel = session.selection();
        assert_eq!(sel.query.as_deref(), Some("frieren"));
        assert_eq!((sel.index, sel.episode.as_deref()), (Some(2), Some("7")));
    }

    #[tokio::test]
    async fn detached_selection_is_resolved_by_title_search() {
        let mut session = Session::new(Arc::new(ImageCache::default()));
        session.select_detached(&record(9, "target"));
        let provider = OnePage(vec![record(1, "other"), record(2, "target")]);

        assert!(session.resolve_for_playback(&provider, Translation::Sub).await.unwrap());

        let sel = session.selection();
        assert_eq!(sel.query.as_deref(), Some("Title target"));
        assert_eq!(sel.index, Some(2));
    }

    #[tokio::test]
    async fn unresolvable_selection_reports_false() {
        let mut session = Session::new(Arc::new(ImageCache::default()));
        session.select_detached(&record(9, "gone"));
        let provider = OnePage(vec![record(1, "other")]);

        assert!(!session.resolve_for_playback(&provider, Translation::Sub).await.unwrap());
        assert_eq!(session.selection().index, None);
    }
}
