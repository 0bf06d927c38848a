use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

use super::response_error;
use crate::UploadError;

const VERIFIER_LEN: usize = 43;

/// Tokens expiring within this window are refreshed early
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How the S256 digest of the verifier is written into the challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeEncoding {
    /// Lowercase hex, as TikTok's desktop flow expects
    Hex,
    /// Unpadded base64url (RFC 7636), as Google expects
    Base64Url,
}

/// A PKCE verifier and its derived challenge
#[derive(Debug, Clone)]
pub struct Pkce {
    verifier: String,
    challenge: String,
    encoding: ChallengeEncoding,
}

impl Pkce {
    pub fn generate(encoding: ChallengeEncoding) -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier, encoding)
    }

    pub fn from_verifier(verifier: impl Into<String>, encoding: ChallengeEncoding) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier, encoding);
        Self {
            verifier,
            challenge,
            encoding,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn encoding(&self) -> ChallengeEncoding {
        self.encoding
    }

    /// Recompute the challenge from the verifier and compare
    pub fn verify(&self) -> bool {
        verify(&self.verifier, &self.challenge, self.encoding)
    }
}

pub fn challenge_for(verifier: &str, encoding: ChallengeEncoding) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    match encoding {
        ChallengeEncoding::Hex => digest.iter().map(|b| format!("{:02x}", b)).collect(),
        ChallengeEncoding::Base64Url => URL_SAFE_NO_PAD.encode(digest),
    }
}

pub fn verify(verifier: &str, challenge: &str, encoding: ChallengeEncoding) -> bool {
    challenge_for(verifier, encoding) == challenge
}

/// Provider-specific endpoints and parameter names
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub authorize_url: String,
    pub token_url: String,
    /// `client_id` for Google, `client_key` for TikTok
    pub client_id_param: &'static str,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub encoding: ChallengeEncoding,
    /// Extra authorize parameters such as `access_type=offline`
    pub extra_params: Vec<(String, String)>,
}

/// An authorize URL together with the state and PKCE pair needed to finish it
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce: Pkce,
}

impl AuthorizationRequest {
    pub fn new(provider: &OAuthProvider) -> Self {
        let state = uuid::Uuid::new_v4().to_string();
        let pkce = Pkce::generate(provider.encoding);

        let mut params: Vec<(&str, &str)> = vec![
            (provider.client_id_param, provider.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("scope", provider.scope.as_str()),
            ("state", state.as_str()),
            ("code_challenge", pkce.challenge()),
            ("code_challenge_method", "S256"),
        ];
        params.extend(
            provider
                .extra_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", provider.authorize_url, query);

        Self { url, state, pkce }
    }
}

/// Extract the authorization code from the redirected URL
///
/// Accepts a full URL or a bare query string.
pub fn parse_callback(callback: &str, expected_state: &str) -> Result<String, UploadError> {
    let callback = callback.trim();
    let parsed = Url::parse(callback).or_else(|_| {
        let query = callback.trim_start_matches('?');
        Url::parse(&format!("http://localhost/?{}", query))
    });
    let url = parsed.map_err(|e| UploadError::Authentication(format!("Invalid callback URL: {}", e)))?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        let description = param("error_description").unwrap_or(error);
        return Err(UploadError::Authentication(description));
    }

    match param("state") {
        Some(state) if state == expected_state => {}
        _ => {
            return Err(UploadError::Authentication(
                "State mismatch in callback, possible CSRF".to_string(),
            ))
        }
    }

    param("code")
        .filter(|code| !code.is_empty())
        .ok_or_else(|| UploadError::Authentication("Callback has no authorization code".to_string()))
}

/// Token response shared by Google and TikTok
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    open_id: Option<String>,
}

/// Token persisted to disk between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub open_id: Option<String>,
}

impl StoredToken {
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: response.scope,
            open_id: response.open_id,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
            .unwrap_or(false)
    }

    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let content = fs_err::read_to_string(path)
            .map_err(|e| UploadError::Authentication(format!("No stored token: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| UploadError::Authentication(format!("Unreadable token file: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), UploadError> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|e| UploadError::Platform(format!("Failed to create token dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| UploadError::Platform(format!("Failed to serialize token: {}", e)))?;
        fs_err::write(path, content)
            .map_err(|e| UploadError::Platform(format!("Failed to write token: {}", e)))
    }
}

/// Swap an authorization code for tokens
///
/// The PKCE pair is checked locally first so a corrupted verifier never reaches the provider.
pub async fn exchange_code(
    client: &Client,
    provider: &OAuthProvider,
    code: &str,
    pkce: &Pkce,
) -> Result<StoredToken, UploadError> {
    if !pkce.verify() {
        return Err(UploadError::Authentication(
            "PKCE verifier does not match the challenge".to_string(),
        ));
    }

    let form = [
        (provider.client_id_param, provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", provider.redirect_uri.as_str()),
        ("code_verifier", pkce.verifier()),
    ];

    tracing::debug!(token_url = %provider.token_url, "Exchanging authorization code");
    request_token(client, &provider.token_url, &form).await
}

/// Obtain a fresh access token; the old refresh token is kept when none is returned
pub async fn refresh_token(
    client: &Client,
    provider: &OAuthProvider,
    current: &StoredToken,
) -> Result<StoredToken, UploadError> {
    let refresh = current.refresh_token.as_deref().ok_or_else(|| {
        UploadError::Authentication("Token expired and no refresh token is stored".to_string())
    })?;

    let form = [
        (provider.client_id_param, provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];

    tracing::debug!(token_url = %provider.token_url, "Refreshing access token");
    let mut token = request_token(client, &provider.token_url, &form).await?;
    if token.refresh_token.is_none() {
        token.refresh_token = current.refresh_token.clone();
    }
    if token.open_id.is_none() {
        token.open_id = current.open_id.clone();
    }
    Ok(token)
}

async fn request_token(
    client: &Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<StoredToken, UploadError> {
    let response = client
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| UploadError::Authentication(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| UploadError::Authentication(format!("Failed to read token response: {}", e)))?;

    if !status.is_success() {
        return Err(match response_error(status, &body) {
            UploadError::Platform(msg) => UploadError::Authentication(msg),
            other => other,
        });
    }

    parse_token_response(&body, Utc::now())
}

fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<StoredToken, UploadError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| UploadError::Authentication(format!("Unexpected token response: {}", e)))?;

    // TikTok reports failures inside a 200 body
    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        let description = value
            .get("error_description")
            .and_then(|d| d.as_str())
            .unwrap_or(error);
        return Err(UploadError::Authentication(description.to_string()));
    }

    let response: TokenResponse = serde_json::from_value(value)
        .map_err(|e| UploadError::Authentication(format!("Unexpected token response: {}", e)))?;
    Ok(StoredToken::from_response(response, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OAuthProvider {
        OAuthProvider {
            authorize_url: "https://www.tiktok.com/v2/auth/authorize/".into(),
            token_url: "https://open.tiktokapis.com/v2/oauth/token/".into(),
            client_id_param: "client_key",
            client_id: "key123".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
            scope: "user.info.basic,video.upload".into(),
            encoding: ChallengeEncoding::Hex,
            extra_params: vec![],
        }
    }

    #[test]
    fn test_base64url_challenge_matches_rfc7636() {
        let challenge = challenge_for(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            ChallengeEncoding::Base64Url,
        );
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_hex_challenge() {
        let challenge = challenge_for("abc", ChallengeEncoding::Hex);
        assert_eq!(
            challenge,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generated_pair_verifies() {
        for encoding in [ChallengeEncoding::Hex, ChallengeEncoding::Base64Url] {
            let pkce = Pkce::generate(encoding);
            assert_eq!(pkce.verifier().len(), 43);
            assert!(pkce.verifier().chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(pkce.verify());
            assert!(!verify("another-verifier", pkce.challenge(), encoding));
        }
    }

    #[test]
    fn test_authorization_url() {
        let request = AuthorizationRequest::new(&provider());
        let url = Url::parse(&request.url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_key"], "key123");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(pairs["state"], request.state);
        assert_eq!(pairs["code_challenge"], request.pkce.challenge());
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn test_parse_callback() {
        let code = parse_callback("http://localhost:8080/callback?code=abc%2A123&state=s1", "s1").unwrap();
        assert_eq!(code, "abc*123");

        let bare = parse_callback("?code=xyz&state=s1", "s1").unwrap();
        assert_eq!(bare, "xyz");
    }

    #[test]
    fn test_parse_callback_rejects_wrong_state() {
        let err = parse_callback("http://localhost/callback?code=abc&state=evil", "s1").unwrap_err();
        assert!(matches!(err, UploadError::Authentication(_)));
    }

    #[test]
    fn test_parse_callback_surfaces_provider_error() {
        let err = parse_callback(
            "http://localhost/callback?error=access_denied&error_description=User+cancelled&state=s1",
            "s1",
        )
        .unwrap_err();
        assert_eq!(err, UploadError::Authentication("User cancelled".into()));
    }

    #[test]
    fn test_token_response_sets_expiry() {
        let now = Utc::now();
        let token = parse_token_response(
            r#"{"access_token": "act.1", "refresh_token": "rft.1", "expires_in": 3600, "open_id": "u1"}"#,
            now,
        )
        .unwrap();
        assert_eq!(token.access_token, "act.1");
        assert_eq!(token.expires_at, Some(now + Duration::seconds(3600)));
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(3590)));
    }

    #[test]
    fn test_token_error_in_body() {
        let err = parse_token_response(
            r#"{"error": "invalid_grant", "error_description": "Code expired"}"#,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, UploadError::Authentication("Code expired".into()));
    }

    #[test]
    fn test_token_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens").join("tiktok.json");
        let token = StoredToken {
            access_token: "act".into(),
            refresh_token: Some("rft".into()),
            expires_at: None,
            scope: None,
            open_id: None,
        };
        token.save(&path).unwrap();
        assert_eq!(StoredToken::load(&path).unwrap(), token);
        assert!(!token.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_exchange_rejects_mismatched_pkce() {
        let mut pkce = Pkce::generate(ChallengeEncoding::Hex);
        pkce.challenge = "tampered".into();
        let err = exchange_code(&Client::new(), &provider(), "code", &pkce)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Authentication(_)));
    }
}
