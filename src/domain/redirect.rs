use url::form_urlencoded;

use super::credential::Credential;

/// What the authorization endpoint handed back in the address fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectGrant {
    Token {
        credential: Credential,
        token_type: Option<String>,
        expires_in: Option<u64>,
    },
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Parses a query-string encoded fragment such as
/// `#access_token=abc123&token_type=Bearer&expires_in=3600`.
///
/// Returns `None` when the fragment carries neither a token nor an OAuth error,
/// so unrelated anchors are left alone.
pub fn parse_fragment(fragment: &str) -> Option<RedirectGrant> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);

    let mut access_token = None;
    let mut token_type = None;
    let mut expires_in = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "token_type" => token_type = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse().ok(),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(credential) = access_token.and_then(Credential::new) {
        return Some(RedirectGrant::Token {
            credential,
            token_type,
            expires_in,
        });
    }

    error.map(|error| RedirectGrant::Denied { error, description })
}
