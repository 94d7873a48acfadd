use std::env;
use std::path::PathBuf;

use reqwest::Url;

use crate::infrastructure::spotify::DEFAULT_API_BASE;

const DEFAULT_LOGIN_URL: &str = "http://localhost:3000/api/login";
const TOKEN_FILE: &str = "access_token";
const APP_DIR: &str = "now-playing-frame";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("No data directory available; set NOW_PLAYING_TOKEN_PATH")]
    NoDataDir,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: Url,
    pub login_url: Url,
    pub token_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut api_base = parse_url(
            "SPOTIFY_API_BASE",
            var("SPOTIFY_API_BASE").as_deref().unwrap_or(DEFAULT_API_BASE),
        )?;
        // Relative joins drop the last segment unless the base ends in '/'.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let login_url = parse_url(
            "NOW_PLAYING_LOGIN_URL",
            var("NOW_PLAYING_LOGIN_URL")
                .as_deref()
                .unwrap_or(DEFAULT_LOGIN_URL),
        )?;

        let token_path = match var("NOW_PLAYING_TOKEN_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_token_path().ok_or(ConfigError::NoDataDir)?,
        };

        Ok(Self {
            api_base,
            login_url,
            token_path,
        })
    }
}

pub fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn default_token_path() -> Option<PathBuf> {
    Some(dirs::data_local_dir()?.join(APP_DIR).join(TOKEN_FILE))
}
