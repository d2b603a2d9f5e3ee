use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::AnimeProvider;
use crate::error::{Error, Result};
use crate::types::{ResultRecord, SortKey, Translation, sorted_episode_labels};

const ALLANIME_API_URL: &str = "https://api.allanime.day/api";
const ALLANIME_REFERER: &str = "https://allmanga.to";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0";

pub const SEARCH_PAGE_SIZE: u32 = 40;
pub const BROWSE_PAGE_SIZE: u32 = 21;

pub struct AllAnimeClient {
    client: Client,
    api_url: String,
}

impl AllAnimeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_url: ALLANIME_API_URL.to_string(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        gql: &str,
        variables: serde_json::Value,
        what: &str,
    ) -> Result<T> {
        debug!(what, %variables, "AllAnime request");
        let response = self
            .client
            .get(&self.api_url)
            .header("Referer", ALLANIME_REFERER)
            .header("Accept", "application/json")
            .query(&[("variables", variables.to_string()), ("query", gql.to_string())])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Remote(format!("AllAnime API HTTP {status}: {text}")));
        }
        let envelope: GraphQlEnvelope<T> = serde_json::from_str(&text)
            .map_err(|err| Error::Remote(format!("failed to parse {what} response: {err}")))?;
        extract_data(envelope)
    }

    async fn fetch_page(
        &self,
        variables: serde_json::Value,
        translation: Translation,
    ) -> Result<Vec<ResultRecord>> {
        let payload: SearchPayload = self.query(SEARCH_SHOWS_QUERY, variables, "search").await?;
        Ok(records_from_payload(payload, translation))
    }
}

impl AnimeProvider for AllAnimeClient {
    async fn search_shows(
        &self,
        query: &str,
        translation: Translation,
    ) -> Result<Vec<ResultRecord>> {
        let variables = search_variables(query, translation, SEARCH_PAGE_SIZE, 1, None);
        self.fetch_page(variables, translation).await
    }

    async fn browse_shows(
        &self,
        translation: Translation,
        sort: SortKey,
        page: u32,
    ) -> Vec<ResultRecord> {
        let variables =
            search_variables("", translation, BROWSE_PAGE_SIZE, page.max(1), Some(sort));
        match self.fetch_page(variables, translation).await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, page, sort = sort.as_api_str(), "browse failed, showing empty page");
                Vec::new()
            }
        }
    }

    async fn fetch_episodes(&self, show_id: &str, translation: Translation) -> Result<Vec<String>> {
        let variables = serde_json::json!({ "showId": show_id });
        let payload: ShowDetailPayload = self
            .query(SHOW_DETAIL_QUERY, variables, "show detail")
            .await?;
        Ok(episodes_for_mode(payload.show.available_episodes_detail, translation))
    }
}

fn search_variables(
    query: &str,
    translation: Translation,
    limit: u32,
    page: u32,
    sort: Option<SortKey>,
) -> serde_json::Value {
    let mut search = serde_json::json!({
        "allowAdult": false,
        "allowUnknown": false,
        "query": query,
    });
    if let Some(sort) = sort {
        search["sortBy"] = serde_json::Value::from(sort.as_api_str());
    }
    serde_json::json!({
        "search": search,
        "limit": limit,
        "page": page,
        "translationType": translation.as_str(),
        "countryOrigin": "ALL"
    })
}

fn records_from_payload(payload: SearchPayload, translation: Translation) -> Vec<ResultRecord> {
    payload
        .shows
        .edges
        .into_iter()
        .enumerate()
        .map(|(pos, edge)| ResultRecord {
            index: pos + 1,
            id: edge.id,
            title: edge.name,
            episodes: match translation {
                Translation::Sub => edge.available_episodes.sub,
                Translation::Dub => edge.available_episodes.dub,
            },
            synopsis: None,
        })
        .collect()
}

fn episodes_for_mode(detail: EpisodeDetail, translation: Translation) -> Vec<String> {
    let labels = match translation {
        Translation::Sub => detail.sub,
        Translation::Dub => detail.dub,
    };
    sorted_episode_labels(labels)
}

fn extract_data<T>(envelope: GraphQlEnvelope<T>) -> Result<T> {
    if let Some(errors) = envelope.errors {
        let joined = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::Remote(format!("AllAnime API error: {joined}")));
    }
    envelope
        .data
        .ok_or_else(|| Error::Remote("AllAnime API returned empty response".to_string()))
}

// --- GraphQL Structs ---

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    shows: SearchShows,
}

#[derive(Debug, Deserialize)]
struct SearchShows {
    #[serde(default)]
    edges: Vec<SearchEdge>,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(rename = "availableEpisodes")]
    #[serde(default)]
    available_episodes: AvailabilitySnapshot,
}

#[derive(Debug, Deserialize, Default)]
struct AvailabilitySnapshot {
    #[serde(default)]
    sub: u32,
    #[serde(default)]
    dub: u32,
}

#[derive(Debug, Deserialize)]
struct ShowDetailPayload {
    show: ShowDetail,
}

#[derive(Debug, Deserialize)]
struct ShowDetail {
    #[serde(rename = "availableEpisodesDetail")]
    #[serde(default)]
    available_episodes_detail: EpisodeDetail,
}

#[derive(Debug, Deserialize, Default)]
struct EpisodeDetail {
    #[serde(default)]
    sub: Vec<String>,
    #[serde(default)]
    dub: Vec<String>,
}

// --- Queries ---

const SEARCH_SHOWS_QUERY: &str = r#"query($search: SearchInput, $limit: Int, $page: Int, $translationType: VaildTranslationTypeEnumType, $countryOrigin: VaildCountryOriginEnumType) {
  shows(search: $search, limit: $limit, page: $page, translationType: $translationType, countryOrigin: $countryOrigin) {
    edges {
      _id
      name
      availableEpisodes
      __typename
    }
  }
}"#;

const SHOW_DETAIL_QUERY: &str = r#"query($showId: String!) {
  show(_id: $showId) {
    _id
    availableEpisodesDetail
  }
}"#;
