pub mod now_playing;

/// User actions accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Refresh,
    Connect,
    Quit,
}

impl Action {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "refresh" => Some(Action::Refresh),
            "c" | "connect" => Some(Action::Connect),
            "q" | "quit" | "exit" => Some(Action::Quit),
            _ => None,
        }
    }
}
