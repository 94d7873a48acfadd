use crate::domain::track::Track;
use crate::domain::view::ViewState;

const CONNECT_HINT: &str = "Connect your music account to show what you're listening to.";
const EMPTY_HINT: &str = "Nothing played recently.";

pub fn render_card(view: &ViewState) -> String {
    if !view.is_authenticated {
        return format!("┌ Now Playing\n│ {CONNECT_HINT}\n└ [c] Connect");
    }

    let header = match (view.is_loading, view.track()) {
        (true, _) => "Loading…",
        (false, Some(_)) if view.is_playing() => "Now playing",
        (false, Some(_)) => "Last played",
        (false, None) => "Now Playing",
    };

    let body = match view.track() {
        Some(track) => track_lines(track),
        None if view.is_loading => Vec::new(),
        None => vec![EMPTY_HINT.to_string()],
    };

    let mut card = format!("┌ {header}\n");
    for line in body {
        card.push_str(&format!("│ {line}\n"));
    }
    card.push_str("└ [r] Refresh");
    card
}

fn track_lines(track: &Track) -> Vec<String> {
    let mut lines = vec![
        format!("**{}**", track.name),
        track.artist_line(),
        track.album.clone(),
    ];
    if let Some(cover) = track.cover_url() {
        lines.push(format!("Cover: {cover}"));
    }
    if let Some(url) = &track.external_url {
        lines.push(format!("Open: {url}"));
    }
    lines
}
