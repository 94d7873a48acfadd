use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub images: Vec<String>,
    pub external_url: Option<String>,
}

impl Track {
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.artist_line())
    }
}

/// The most recent track the service reported and whether it is actively playing.
///
/// `is_playing` is only ever set from the currently-playing query; tracks from the
/// play history always arrive with `is_playing == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub track: Option<Track>,
    pub is_playing: bool,
}
