use super::track::{PlaybackState, Track};

/// Everything the presentation layer needs to draw the card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub playback: PlaybackState,
    pub is_loading: bool,
    pub is_authenticated: bool,
}

impl ViewState {
    pub fn track(&self) -> Option<&Track> {
        self.playback.track.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing
    }
}

/// `Authenticating` is implicit: a credential is held but no fetch made with
/// it has finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_view_is_unauthenticated() {
        let view = ViewState::default();
        assert!(!view.is_authenticated);
        assert!(view.track().is_none());
        assert!(!view.is_playing());
    }
}
