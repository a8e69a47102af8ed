//! OAuth 2.0 token acquisition and refresh
//!
//! [`HttpOAuthClient`] talks to real token endpoints and supports three grants:
//! authorization code with PKCE through a loopback redirect, client
//! credentials, and resource-owner password. [`MockOAuthClient`] replays
//! scripted outcomes for tests.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::callback::CallbackServer;
use crate::error::OAuthError;
use crate::types::Credential;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Lifetime assumed when a token response carries no `expires_in`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Longest lifetime taken from a token response; larger `expires_in` values are clamped
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// How long the loopback listener waits for the browser redirect
pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    AuthorizationCode,
    ClientCredentials,
    Password,
}

/// How the client identifies itself to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// HTTP Basic with client id and secret
    Basic,
    /// `client_id` and `client_secret` form fields
    Form,
    /// `client_key` and `client_secret` form fields
    FormClientKey,
}

/// Everything needed to obtain or refresh a token for one platform
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub grant: GrantType,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_auth: ClientAuth,
    pub scope_delimiter: char,
    /// Extra query parameters for the authorization URL
    pub authorize_params: Vec<(String, String)>,
}

impl OAuthConfig {
    /// Minimal configuration for a token endpoint, everything else defaulted
    pub fn new(client_id: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            scopes: Vec::new(),
            grant: GrantType::AuthorizationCode,
            authorize_url: String::new(),
            token_url: token_url.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            username: None,
            password: None,
            client_auth: ClientAuth::Form,
            scope_delimiter: ' ',
            authorize_params: Vec::new(),
        }
    }

    pub fn scope_string(&self) -> String {
        self.scopes.join(&self.scope_delimiter.to_string())
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("grant", &self.grant)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_auth", &self.client_auth)
            .finish()
    }
}

/// Normalized token endpoint response
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    /// Scopes granted, when the endpoint reports them
    pub scopes: Option<BTreeSet<String>>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            scopes: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Turn the grant into a stored credential
    ///
    /// `previous_refresh_token` is kept when the endpoint did not rotate it.
    /// Granted scopes default to the requested ones when not reported.
    pub fn into_credential(
        self,
        platform: &str,
        account_id: &str,
        requested_scopes: &[String],
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Credential {
        let lifetime = self
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME)
            .min(MAX_TOKEN_LIFETIME);
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Credential {
            platform: platform.to_string(),
            account_id: account_id.to_string(),
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            expires_at,
            scopes: self
                .scopes
                .unwrap_or_else(|| requested_scopes.iter().cloned().collect()),
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Token acquisition seam used by the credential manager
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Run the full grant configured for the platform
    async fn authorize(&self, platform: &str, config: &OAuthConfig)
        -> Result<TokenGrant, OAuthError>;

    /// Exchange a refresh token for a new access token
    async fn refresh(
        &self,
        platform: &str,
        config: &OAuthConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, OAuthError>;
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        Self::from_verifier(random_token(64))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self { verifier, challenge }
    }
}

/// Random URL-safe token, used for `state` and PKCE verifiers
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Build the URL the user opens to grant access
pub fn authorization_url(
    config: &OAuthConfig,
    state: &str,
    pkce: &PkceChallenge,
) -> Result<url::Url, OAuthError> {
    let client_param = match config.client_auth {
        ClientAuth::FormClientKey => "client_key",
        ClientAuth::Basic | ClientAuth::Form => "client_id",
    };

    let mut params: Vec<(&str, String)> = vec![
        (client_param, config.client_id.clone()),
        ("response_type", "code".to_string()),
        ("redirect_uri", config.redirect_uri.clone()),
        ("scope", config.scope_string()),
        ("state", state.to_string()),
        ("code_challenge", pkce.challenge.clone()),
        ("code_challenge_method", "S256".to_string()),
    ];
    params.extend(
        config
            .authorize_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone())),
    );

    url::Url::parse_with_params(&config.authorize_url, &params).map_err(|e| {
        OAuthError::NotConfigured(format!(
            "invalid authorize_url '{}': {}",
            config.authorize_url, e
        ))
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parse a successful token endpoint body
pub fn parse_token_response(body: &str) -> Result<TokenGrant, OAuthError> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| OAuthError::Protocol(format!("invalid token response: {}", e)))?;

    if response.access_token.is_empty() {
        return Err(OAuthError::Protocol(
            "token response has an empty access_token".to_string(),
        ));
    }

    let expires_in = response.expires_in.and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            .map(Duration::from_secs)
    });

    let scopes = response.scope.map(|s| {
        s.split([' ', ','])
            .filter(|scope| !scope.is_empty())
            .map(String::from)
            .collect()
    });

    Ok(TokenGrant {
        access_token: response.access_token,
        refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        expires_in,
        scopes,
    })
}

/// Classify a failed token endpoint response
///
/// An `invalid_grant` error means the code or refresh token itself is no
/// longer usable, as opposed to the request being rejected for other reasons.
pub fn classify_token_error(status: u16, body: &str) -> OAuthError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(error) => {
            let detail = match error.error_description {
                Some(description) => format!("{}: {}", error.error, description),
                None => error.error.clone(),
            };
            if error.error == "invalid_grant" {
                OAuthError::InvalidGrant { status, detail }
            } else {
                OAuthError::Rejected { status, detail }
            }
        }
        Err(_) => OAuthError::Rejected {
            status,
            detail: body.chars().take(200).collect(),
        },
    }
}

/// Shows the user the URL to open for an authorization-code grant
///
/// Called with the platform name and the authorization URL once the redirect
/// listener is ready.
pub type AuthorizationPrompt = Arc<dyn Fn(&str, &url::Url) + Send + Sync>;

/// Default prompt: log the URL
pub fn log_authorization_url(platform: &str, url: &url::Url) {
    tracing::warn!(platform, "Open this URL in a browser to authorize {}: {}", platform, url);
}

/// OAuth client backed by reqwest
pub struct HttpOAuthClient {
    http: reqwest::Client,
    authorization_timeout: Duration,
    prompt: AuthorizationPrompt,
}

impl HttpOAuthClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            authorization_timeout: DEFAULT_AUTHORIZATION_TIMEOUT,
            prompt: Arc::new(log_authorization_url),
        }
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    /// Replace how the authorization URL is shown to the user
    pub fn with_authorization_prompt(mut self, prompt: AuthorizationPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    async fn authorization_code(
        &self,
        platform: &str,
        config: &OAuthConfig,
    ) -> Result<TokenGrant, OAuthError> {
        let state = random_token(32);
        let pkce = PkceChallenge::generate();
        let auth_url = authorization_url(config, &state, &pkce)?;

        let server = CallbackServer::bind(&config.redirect_uri).await?;

        tracing::info!("Waiting for {} authorization on {}", platform, config.redirect_uri);
        (self.prompt)(platform, &auth_url);

        let code = server
            .wait_for_code(&state, self.authorization_timeout)
            .await?;

        self.token_request(
            config,
            vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code),
                ("redirect_uri", config.redirect_uri.clone()),
                ("code_verifier", pkce.verifier),
            ],
        )
        .await
    }

    async fn token_request(
        &self,
        config: &OAuthConfig,
        mut params: Vec<(&str, String)>,
    ) -> Result<TokenGrant, OAuthError> {
        let mut request = self
            .http
            .post(&config.token_url)
            .header(reqwest::header::ACCEPT, "application/json");

        match config.client_auth {
            ClientAuth::Basic => {
                request = request.basic_auth(&config.client_id, config.client_secret.as_ref());
            }
            ClientAuth::Form | ClientAuth::FormClientKey => {
                let id_param = if config.client_auth == ClientAuth::FormClientKey {
                    "client_key"
                } else {
                    "client_id"
                };
                params.push((id_param, config.client_id.clone()));
                if let Some(secret) = &config.client_secret {
                    params.push(("client_secret", secret.clone()));
                }
            }
        }

        let response = request
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        if status.is_success() {
            parse_token_response(&body)
        } else {
            Err(classify_token_error(status.as_u16(), &body))
        }
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn authorize(
        &self,
        platform: &str,
        config: &OAuthConfig,
    ) -> Result<TokenGrant, OAuthError> {
        if config.client_id.is_empty() {
            return Err(OAuthError::NotConfigured(format!(
                "no client_id for {}",
                platform
            )));
        }

        match config.grant {
            GrantType::AuthorizationCode => self.authorization_code(platform, config).await,
            GrantType::ClientCredentials => {
                self.token_request(
                    config,
                    vec![
                        ("grant_type", "client_credentials".to_string()),
                        ("scope", config.scope_string()),
                    ],
                )
                .await
            }
            GrantType::Password => {
                let (Some(username), Some(password)) = (&config.username, &config.password)
                else {
                    return Err(OAuthError::NotConfigured(format!(
                        "password grant for {} needs username and password",
                        platform
                    )));
                };
                self.token_request(
                    config,
                    vec![
                        ("grant_type", "password".to_string()),
                        ("username", username.clone()),
                        ("password", password.clone()),
                        ("scope", config.scope_string()),
                    ],
                )
                .await
            }
        }
    }

    async fn refresh(
        &self,
        _platform: &str,
        config: &OAuthConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, OAuthError> {
        self.token_request(
            config,
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.to_string()),
            ],
        )
        .await
    }
}

/// Scripted OAuth client for testing
///
/// Each call pops the next scripted outcome; once the script is exhausted,
/// calls succeed with fresh numbered tokens valid for one hour.
#[derive(Clone, Default)]
pub struct MockOAuthClient {
    authorize_script: Arc<Mutex<VecDeque<Result<TokenGrant, OAuthError>>>>,
    refresh_script: Arc<Mutex<VecDeque<Result<TokenGrant, OAuthError>>>>,
    delay: Duration,

    /// Number of times authorize has been called
    pub authorize_call_count: Arc<Mutex<usize>>,

    /// Number of times refresh has been called
    pub refresh_call_count: Arc<Mutex<usize>>,

    /// Refresh tokens presented to refresh, in call order
    pub refresh_tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl MockOAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorize_result(self, result: Result<TokenGrant, OAuthError>) -> Self {
        self.authorize_script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_refresh_result(self, result: Result<TokenGrant, OAuthError>) -> Self {
        self.refresh_script.lock().unwrap().push_back(result);
        self
    }

    /// Simulate token endpoint latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn authorize_calls(&self) -> usize {
        *self.authorize_call_count.lock().unwrap()
    }

    pub fn refresh_calls(&self) -> usize {
        *self.refresh_call_count.lock().unwrap()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    fn default_grant(kind: &str, n: usize) -> TokenGrant {
        TokenGrant::new(format!("mock-{}-access-{}", kind, n))
            .with_refresh_token(format!("mock-{}-refresh-{}", kind, n))
            .with_expires_in(DEFAULT_TOKEN_LIFETIME)
    }
}

#[async_trait]
impl OAuthClient for MockOAuthClient {
    async fn authorize(
        &self,
        _platform: &str,
        _config: &OAuthConfig,
    ) -> Result<TokenGrant, OAuthError> {
        let n = {
            let mut count = self.authorize_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.authorize_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::default_grant("authorize", n)))
    }

    async fn refresh(
        &self,
        _platform: &str,
        _config: &OAuthConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, OAuthError> {
        let n = {
            let mut count = self.refresh_call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.refresh_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::default_grant("refresh", n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedResponse, TestServer};

    #[test]
    fn test_pkce_s256_known_vector() {
        let pkce =
            PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_random_tokens_differ() {
        let a = random_token(32);
        let b = random_token(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorization_url_contains_pkce_and_state() {
        let mut config = OAuthConfig::new("my-client", "https://example.com/token");
        config.authorize_url = "https://example.com/authorize".to_string();
        config.scopes = vec!["a".to_string(), "b".to_string()];
        config.authorize_params = vec![("access_type".to_string(), "offline".to_string())];

        let pkce = PkceChallenge::from_verifier("verifier".to_string());
        let url = authorization_url(&config, "xyz", &pkce).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("client_id".to_string(), "my-client".to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "a b".to_string())));
        assert!(pairs.contains(&("code_challenge_method".to_string(), "S256".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
    }

    #[test]
    fn test_authorization_url_uses_client_key() {
        let mut config = OAuthConfig::new("tt-key", "https://example.com/token");
        config.authorize_url = "https://example.com/authorize".to_string();
        config.client_auth = ClientAuth::FormClientKey;

        let pkce = PkceChallenge::generate();
        let url = authorization_url(&config, "s", &pkce).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "client_key" && v == "tt-key"));
    }

    #[test]
    fn test_parse_token_response() {
        let grant = parse_token_response(
            r#"{"access_token":"at","refresh_token":"rt","expires_in":7200,"scope":"video.upload,video.publish","token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt"));
        assert_eq!(grant.expires_in, Some(Duration::from_secs(7200)));
        let scopes = grant.scopes.unwrap();
        assert!(scopes.contains("video.upload"));
        assert!(scopes.contains("video.publish"));
    }

    #[test]
    fn test_parse_token_response_string_expiry() {
        let grant = parse_token_response(r#"{"access_token":"at","expires_in":"3600"}"#).unwrap();
        assert_eq!(grant.expires_in, Some(Duration::from_secs(3600)));
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.scopes, None);
    }

    #[test]
    fn test_parse_token_response_rejects_garbage() {
        assert!(matches!(
            parse_token_response("<html>oops</html>"),
            Err(OAuthError::Protocol(_))
        ));
    }

    #[test]
    fn test_classify_invalid_grant() {
        let error = classify_token_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#,
        );
        match error {
            OAuthError::InvalidGrant { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.contains("revoked"));
            }
            other => panic!("Expected InvalidGrant, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_other_rejections() {
        assert!(matches!(
            classify_token_error(401, r#"{"error":"invalid_client"}"#),
            OAuthError::Rejected { status: 401, .. }
        ));
        assert!(matches!(
            classify_token_error(503, "Service Unavailable"),
            OAuthError::Rejected { status: 503, .. }
        ));
    }

    #[test]
    fn test_into_credential_keeps_previous_refresh_token() {
        let now = Utc::now();
        let grant = TokenGrant::new("new-access").with_expires_in(Duration::from_secs(60));
        let credential = grant.into_credential(
            "x",
            "acct1",
            &["tweet.write".to_string()],
            Some("old-refresh".to_string()),
            now,
        );
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(credential.expires_at, now + chrono::Duration::seconds(60));
        assert!(credential.scopes.contains("tweet.write"));
    }

    #[test]
    fn test_into_credential_defaults_lifetime() {
        let now = Utc::now();
        let credential = TokenGrant::new("a").into_credential("x", "acct1", &[], None, now);
        assert_eq!(credential.expires_at, now + chrono::Duration::hours(1));
    }

    #[test]
    fn test_into_credential_clamps_huge_expiry() {
        let now = Utc::now();
        let grant =
            parse_token_response(r#"{"access_token":"at","expires_in":9000000000000000}"#)
                .unwrap();
        let credential = grant.into_credential("youtube", "channel", &[], None, now);

        let max = chrono::Duration::from_std(MAX_TOKEN_LIFETIME).unwrap();
        assert_eq!(credential.expires_at, now + max);
        assert!(credential.is_valid_at(now, Duration::from_secs(300)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = OAuthConfig::new("id", "https://example.com/token");
        config.client_secret = Some("shh-secret".to_string());
        config.password = Some("hunter2".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("shh-secret"));
        assert!(!debug.contains("hunter2"));

        let grant = TokenGrant::new("access-value").with_refresh_token("refresh-value");
        let debug = format!("{:?}", grant);
        assert!(!debug.contains("access-value"));
        assert!(!debug.contains("refresh-value"));
    }

    #[tokio::test]
    async fn test_refresh_posts_form_with_basic_auth() {
        let server = TestServer::start(vec![ScriptedResponse::json(
            200,
            r#"{"access_token":"fresh","expires_in":3600}"#,
        )])
        .await;

        let mut config = OAuthConfig::new("cid", server.url("/token"));
        config.client_secret = Some("csecret".to_string());
        config.client_auth = ClientAuth::Basic;

        let client = HttpOAuthClient::new(reqwest::Client::new());
        let grant = client.refresh("reddit", &config, "rt-1").await.unwrap();
        assert_eq!(grant.access_token, "fresh");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].request_line.starts_with("POST /token"));
        assert!(requests[0].header("authorization").unwrap().starts_with("Basic "));
        assert!(requests[0].body_text().contains("grant_type=refresh_token"));
        assert!(requests[0].body_text().contains("refresh_token=rt-1"));
        assert!(!requests[0].body_text().contains("client_secret"));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_from_endpoint() {
        let server = TestServer::start(vec![ScriptedResponse::json(
            400,
            r#"{"error":"invalid_grant"}"#,
        )])
        .await;

        let config = OAuthConfig::new("cid", server.url("/token"));
        let client = HttpOAuthClient::new(reqwest::Client::new());
        let result = client.refresh("youtube", &config, "revoked").await;
        assert!(matches!(result, Err(OAuthError::InvalidGrant { status: 400, .. })));

        let body = server.requests()[0].body_text();
        assert!(body.contains("client_id=cid"));
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_authorization_code_flow_through_prompt() {
        let server = TestServer::start(vec![ScriptedResponse::json(
            200,
            r#"{"access_token":"user-token","refresh_token":"user-refresh","expires_in":3600}"#,
        )])
        .await;

        let mut config = OAuthConfig::new("cid", server.url("/token"));
        config.authorize_url = "https://accounts.example.com/authorize".to_string();
        config.redirect_uri = format!("http://127.0.0.1:{}/callback", free_port());

        let shown = Arc::new(Mutex::new(Vec::new()));
        let seen = shown.clone();
        // Stands in for the user's browser: follow the redirect with the issued state
        let prompt: AuthorizationPrompt = Arc::new(move |platform: &str, url: &url::Url| {
            seen.lock().unwrap().push(platform.to_string());
            let pairs: std::collections::HashMap<String, String> =
                url.query_pairs().into_owned().collect();
            let redirect = format!(
                "{}?code=granted-code&state={}",
                pairs["redirect_uri"], pairs["state"]
            );
            tokio::spawn(async move {
                let _ = reqwest::get(redirect).await;
            });
        });

        let client = HttpOAuthClient::new(reqwest::Client::new())
            .with_authorization_timeout(Duration::from_secs(5))
            .with_authorization_prompt(prompt);
        let grant = client.authorize("youtube", &config).await.unwrap();

        assert_eq!(grant.access_token, "user-token");
        assert_eq!(grant.refresh_token.as_deref(), Some("user-refresh"));
        assert_eq!(*shown.lock().unwrap(), vec!["youtube"]);

        let body = server.requests()[0].body_text();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=granted-code"));
        assert!(body.contains("code_verifier="));
    }

    #[tokio::test]
    async fn test_password_grant_requires_credentials() {
        let mut config = OAuthConfig::new("cid", "http://127.0.0.1:9/token");
        config.grant = GrantType::Password;
        let client = HttpOAuthClient::new(reqwest::Client::new());
        let result = client.authorize("reddit", &config).await;
        assert!(matches!(result, Err(OAuthError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_client_credentials_grant() {
        let server = TestServer::start(vec![ScriptedResponse::json(
            200,
            r#"{"access_token":"app-token","scope":"read"}"#,
        )])
        .await;

        let mut config = OAuthConfig::new("key", server.url("/token"));
        config.grant = GrantType::ClientCredentials;
        config.client_auth = ClientAuth::FormClientKey;
        config.scopes = vec!["read".to_string()];

        let client = HttpOAuthClient::new(reqwest::Client::new());
        let grant = client.authorize("tiktok", &config).await.unwrap();
        assert_eq!(grant.access_token, "app-token");

        let body = server.requests()[0].body_text();
        assert!(body.contains("grant_type=client_credentials"));
        assert!(body.contains("client_key=key"));
    }

    #[tokio::test]
    async fn test_missing_client_id_is_not_configured() {
        let config = OAuthConfig::new("", "http://127.0.0.1:9/token");
        let client = HttpOAuthClient::new(reqwest::Client::new());
        assert!(matches!(
            client.authorize("youtube", &config).await,
            Err(OAuthError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_client_scripts_then_defaults() {
        let mock = MockOAuthClient::new().with_refresh_result(Err(OAuthError::InvalidGrant {
            status: 400,
            detail: "revoked".to_string(),
        }));
        let config = OAuthConfig::new("id", "unused");

        assert!(mock.refresh("x", &config, "rt").await.is_err());
        let grant = mock.refresh("x", &config, "rt2").await.unwrap();
        assert_eq!(grant.access_token, "mock-refresh-access-2");
        assert_eq!(mock.refresh_calls(), 2);
        assert_eq!(mock.refresh_tokens_seen(), vec!["rt", "rt2"]);
        assert_eq!(mock.authorize_calls(), 0);
    }
}
