use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{SynopsisCandidate, SynopsisProvider};
use crate::error::{Error, Result};

const JIKAN_SEARCH_URL: &str = "https://api.jikan.moe/v4/anime";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/*,*/*;q=0.8";

/// Synopsis and cover art from the public Jikan (MyAnimeList) API.
pub struct JikanClient {
    client: Client,
    search_url: String,
}

impl JikanClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("anidesk/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            search_url: JIKAN_SEARCH_URL.to_string(),
        })
    }
}

impl SynopsisProvider for JikanClient {
    async fn lookup(&self, title: &str) -> Result<Option<SynopsisCandidate>> {
        let url = search_url(&self.search_url, title)?;
        debug!(%url, "Jikan lookup");
        let response: JikanSearch = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(first_candidate(response))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .header("Accept", IMAGE_ACCEPT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn search_url(base: &str, title: &str) -> Result<Url> {
    Url::parse_with_params(base, &[("q", title), ("limit", "1")])
        .map_err(|err| Error::Remote(format!("invalid Jikan URL: {err}")))
}

fn first_candidate(response: JikanSearch) -> Option<SynopsisCandidate> {
    response.data.into_iter().next().map(|anime| SynopsisCandidate {
        synopsis: anime.synopsis,
        image_url: anime.images.and_then(|images| images.jpg).and_then(|jpg| jpg.image_url),
    })
}

#[derive(Debug, Deserialize)]
struct JikanSearch {
    #[serde(default)]
    data: Vec<JikanAnime>,
}

#[derive(Debug, Deserialize)]
struct JikanAnime {
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    images: Option<JikanImages>,
}

#[derive(Debug, Deserialize)]
struct JikanImages {
    #[serde(default)]
    jpg: Option<JikanImage>,
}

#[derive(Debug, Deserialize)]
struct JikanImage {
    #[serde(default)]
    image_url: Option<String>,
}
