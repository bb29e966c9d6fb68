//! OAuth 1.0a request signing (HMAC-SHA1, RFC 5849).

use crate::config::Credentials;
use crate::error::{Result, SyncError};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// Percent-encode per RFC 3986: only `A-Z a-z 0-9 - . _ ~` stay literal.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    // form_urlencoded leaves `*` literal, writes spaces as `+` and escapes `~`.
    url::form_urlencoded::byte_serialize(input.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Signs requests on behalf of one user token.
pub struct OAuthSigner<'a> {
    credentials: &'a Credentials,
    rng: SystemRandom,
}

impl<'a> OAuthSigner<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self {
            credentials,
            rng: SystemRandom::new(),
        }
    }

    /// Build the `Authorization` header value for a request, using a fresh
    /// nonce and the current time.
    ///
    /// `base_url` must exclude the query string; `query` holds the
    /// unencoded request parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if no nonce can be generated.
    pub fn authorization_header(
        &self,
        method: &str,
        base_url: &str,
        query: &[(&str, String)],
    ) -> Result<String> {
        let nonce = self.nonce()?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let header = self.authorization_header_with(method, base_url, query, &nonce, &timestamp);
        Ok(header)
    }

    /// Same as [`Self::authorization_header`] with a fixed nonce and
    /// timestamp.
    #[must_use]
    pub fn authorization_header_with(
        &self,
        method: &str,
        base_url: &str,
        query: &[(&str, String)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.credentials.access_token.clone()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ];

        let base = signature_base_string(method, base_url, query, &oauth_params);
        let signature = self.sign(&base);
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort_by(|a, b| a.0.cmp(b.0));

        let fields: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn sign(&self, base: &str) -> String {
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credentials.consumer_secret),
            percent_encode(&self.credentials.access_secret)
        );
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
        STANDARD.encode(hmac::sign(&key, base.as_bytes()).as_ref())
    }

    fn nonce(&self) -> Result<String> {
        let mut bytes = [0u8; 24];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| SyncError::auth("could not generate a request nonce"))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Build the signature base string: `METHOD&url&params`, with every
/// parameter encoded, sorted by key then value, and joined.
#[must_use]
pub fn signature_base_string(
    method: &str,
    base_url: &str,
    query: &[(&str, String)],
    oauth_params: &[(&str, String)],
) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .chain(oauth_params)
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();

    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url),
        percent_encode(&param_string)
    )
}
