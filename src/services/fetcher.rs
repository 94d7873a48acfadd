use async_trait::async_trait;

use crate::domain::credential::Credential;
use crate::domain::track::Track;
use crate::services::error::ApiError;

/// Result of the currently-playing query when the service did not reject it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentlyPlaying {
    /// The explicit "no active content" signal (204 / empty body).
    NothingActive,
    Active {
        is_playing: bool,
        item: Option<Track>,
    },
}

/// Transport for the two calls of the retrieval protocol.
#[async_trait]
pub trait NowPlayingApi: Send + Sync {
    async fn currently_playing(&self, credential: &Credential)
    -> Result<CurrentlyPlaying, ApiError>;

    /// The single most recent play-history entry.
    async fn recently_played(&self, credential: &Credential) -> Result<Option<Track>, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Playing(Track),
    RecentlyPlayed(Track),
    Empty,
    Expired,
    TransientFailure,
}

pub struct NowPlayingFetcher<A> {
    api: A,
}

impl<A: NowPlayingApi> NowPlayingFetcher<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Currently-playing first; the play history is consulted only on the
    /// explicit nothing-active signal, never on errors.
    pub async fn fetch(&self, credential: &Credential) -> FetchOutcome {
        match self.api.currently_playing(credential).await {
            Ok(CurrentlyPlaying::NothingActive) => self.fetch_recent(credential).await,
            Ok(CurrentlyPlaying::Active {
                is_playing,
                item: Some(track),
            }) => {
                tracing::debug!(is_playing, "Active item: {track}");
                FetchOutcome::Playing(track)
            }
            Ok(CurrentlyPlaying::Active { item: None, .. }) => FetchOutcome::Empty,
            Err(e) => classify_failure("currently playing", e),
        }
    }

    async fn fetch_recent(&self, credential: &Credential) -> FetchOutcome {
        match self.api.recently_played(credential).await {
            Ok(Some(track)) => FetchOutcome::RecentlyPlayed(track),
            Ok(None) => FetchOutcome::Empty,
            Err(e) => classify_failure("recently played", e),
        }
    }
}

fn classify_failure(call: &str, error: ApiError) -> FetchOutcome {
    match error {
        ApiError::Unauthorized => {
            tracing::info!("Access token rejected by {call} query");
            FetchOutcome::Expired
        }
        other => {
            tracing::warn!("Failed to fetch {call} track: {other}");
            FetchOutcome::TransientFailure
        }
    }
}
