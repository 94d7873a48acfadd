use std::io::Write;
use std::sync::Mutex;

use reqwest::Url;
use serde::Serialize;

use crate::services::error::ConnectError;

/// The embedding client that displays this view.
pub trait FrameHost: Send + Sync {
    /// Tells the host the view may be displayed. Called once per mount.
    fn ready(&self);
}

/// The page address, whose fragment carries the OAuth redirect parameters.
pub trait Address {
    fn fragment(&self) -> Option<String>;

    /// Removes the fragment so reloading does not replay the same grant.
    fn clear_fragment(&mut self);
}

pub trait Navigator {
    fn navigate(&self, url: &Url) -> Result<(), ConnectError>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostMessage {
    Ready,
}

/// Posts host messages as JSON lines on a writer (stdout in the binary).
pub struct JsonFrameHost<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonFrameHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn post(&self, message: &HostMessage) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = serde_json::to_writer(&mut *out, message)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to post message to frame host: {e}");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> FrameHost for JsonFrameHost<W> {
    fn ready(&self) {
        tracing::info!("Signalling frame host ready");
        self.post(&HostMessage::Ready);
    }
}

/// Address the page was loaded at, typically the OAuth redirect target.
#[derive(Debug, Clone)]
pub struct RedirectAddress {
    url: Url,
}

impl RedirectAddress {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Address for RedirectAddress {
    fn fragment(&self) -> Option<String> {
        self.url.fragment().map(str::to_string)
    }

    fn clear_fragment(&mut self) {
        self.url.set_fragment(None);
    }
}

pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &Url) -> Result<(), ConnectError> {
        tracing::info!("Opening {url}");
        webbrowser::open(url.as_str()).map_err(ConnectError::Navigation)
    }
}
