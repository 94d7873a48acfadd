use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::credential::Credential;
use crate::domain::track::Track;
use crate::services::error::ApiError;
use crate::services::fetcher::{CurrentlyPlaying, NowPlayingApi};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1/";

#[derive(Deserialize)]
struct CurrentlyPlayingBody {
    #[serde(default)]
    is_playing: bool,
    item: Option<WireItem>,
}

#[derive(Deserialize)]
struct RecentlyPlayedBody {
    #[serde(default)]
    items: Vec<PlayHistory>,
}

#[derive(Deserialize)]
struct PlayHistory {
    track: WireItem,
}

#[derive(Deserialize)]
struct WireItem {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<WireArtist>,
    /// Absent for podcast episodes.
    album: Option<WireAlbum>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct WireArtist {
    name: String,
}

#[derive(Deserialize)]
struct WireAlbum {
    name: String,
    #[serde(default)]
    images: Vec<WireImage>,
}

#[derive(Deserialize)]
struct WireImage {
    url: String,
}

#[derive(Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl WireItem {
    fn into_track(self) -> Option<Track> {
        let album = self.album?;
        Some(Track {
            id: self.id.unwrap_or_default(),
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album: album.name,
            images: album.images.into_iter().map(|img| img.url).collect(),
            external_url: self.external_urls.spotify,
        })
    }
}

pub struct SpotifyClient {
    http: Client,
    base: Url,
}

impl SpotifyClient {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        credential: &Credential,
    ) -> Result<(StatusCode, String), ApiError> {
        let url = self.base.join(path)?;
        let resp = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        Ok((status, body))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl NowPlayingApi for SpotifyClient {
    async fn currently_playing(
        &self,
        credential: &Credential,
    ) -> Result<CurrentlyPlaying, ApiError> {
        let (status, body) = self
            .get("me/player/currently-playing", &[], credential)
            .await?;

        match status {
            StatusCode::NO_CONTENT => Ok(CurrentlyPlaying::NothingActive),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            s if s.is_success() => {
                if body.trim().is_empty() {
                    return Ok(CurrentlyPlaying::NothingActive);
                }
                let payload: CurrentlyPlayingBody = decode(&body)?;
                Ok(CurrentlyPlaying::Active {
                    is_playing: payload.is_playing,
                    item: payload.item.and_then(WireItem::into_track),
                })
            }
            s => Err(ApiError::Status(s.as_u16())),
        }
    }

    async fn recently_played(&self, credential: &Credential) -> Result<Option<Track>, ApiError> {
        let (status, body) = self
            .get("me/player/recently-played", &[("limit", "1")], credential)
            .await?;

        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::NO_CONTENT => Ok(None),
            s if s.is_success() => {
                let history: RecentlyPlayedBody = decode(&body)?;
                Ok(history
                    .items
                    .into_iter()
                    .next()
                    .and_then(|entry| entry.track.into_track()))
            }
            s => Err(ApiError::Status(s.as_u16())),
        }
    }
}
