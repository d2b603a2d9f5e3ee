use crate::error::Result;
use crate::types::{ResultRecord, SortKey, Translation};

pub mod allanime;
pub mod jikan;

pub trait AnimeProvider {
    async fn search_shows(&self, query: &str, translation: Translation)
    -> Result<Vec<ResultRecord>>;
    /// Best effort: failures are logged and come back as an empty page.
    async fn browse_shows(
        &self,
        translation: Translation,
        sort: SortKey,
        page: u32,
    ) -> Vec<ResultRecord>;
    async fn fetch_episodes(&self, show_id: &str, translation: Translation) -> Result<Vec<String>>;
}

/// First hit of a synopsis/artwork lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynopsisCandidate {
    pub synopsis: Option<String>,
    pub image_url: Option<String>,
}

pub trait SynopsisProvider {
    async fn lookup(&self, title: &str) -> Result<Option<SynopsisCandidate>>;
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}
