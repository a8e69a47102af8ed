//! Loopback listener for the OAuth authorization-code redirect
//!
//! Binds the host and port of the configured redirect URI and serves a single
//! route at its path. The first redirect that reaches it decides the outcome:
//! the browser gets a short page and the code (or the failure) is handed to
//! the waiting caller, after which the listener shuts down. Other paths
//! (favicons, probes) get axum's 404.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::OAuthError;

/// Time allowed for the answer page to reach the browser after the outcome is known
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization complete</h1>\
<p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
<p>Return to the terminal for details.</p></body></html>";

type Outcome = Result<String, OAuthError>;

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

pub struct CallbackServer {
    listener: TcpListener,
    path: String,
}

impl CallbackServer {
    /// Bind the listener for a loopback redirect URI such as `http://localhost:8080/callback`
    pub async fn bind(redirect_uri: &str) -> Result<Self, OAuthError> {
        let url = url::Url::parse(redirect_uri).map_err(|e| {
            OAuthError::Callback(format!("invalid redirect_uri '{}': {}", redirect_uri, e))
        })?;

        let host = url.host_str().unwrap_or_default().to_string();
        if !matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]") {
            return Err(OAuthError::Callback(format!(
                "redirect_uri must point at this machine, got host '{}'",
                host
            )));
        }
        let port = url.port_or_known_default().unwrap_or(80);
        let bind_host = if host == "[::1]" { "::1" } else { "127.0.0.1" };

        let listener = TcpListener::bind((bind_host, port)).await.map_err(|e| {
            OAuthError::Callback(format!("cannot listen on {}:{}: {}", bind_host, port, e))
        })?;

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|addr| addr.port())
    }

    /// Serve until the redirect arrives, checking `state`, and return the authorization code
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
    ) -> Result<String, OAuthError> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route(&self.path, get(handle_redirect))
            .with_state(RedirectState {
                expected_state: Arc::from(expected_state),
                outcome: Arc::new(Mutex::new(Some(outcome_tx))),
            });

        debug!("Listening for authorization redirect on {}", self.path);
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = tokio::time::timeout(timeout, outcome_rx).await;

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
            debug!("Authorization listener did not stop within {:?}", SHUTDOWN_GRACE);
        }

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OAuthError::Callback(
                "authorization listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => Err(OAuthError::Callback(format!(
                "no authorization received within {}s",
                timeout.as_secs()
            ))),
        }
    }
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let (status, outcome) = redirect_outcome(&params, &state.expected_state);
    let page = if outcome.is_ok() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };

    let sender = state.outcome.lock().ok().and_then(|mut slot| slot.take());
    match sender {
        Some(sender) => {
            info!("Authorization redirect received");
            let _ = sender.send(outcome);
        }
        None => debug!("Ignoring repeated authorization redirect"),
    }

    (status, Html(page))
}

/// Decide what a redirect's query parameters mean
fn redirect_outcome(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> (StatusCode, Outcome) {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(String::as_str)
            .unwrap_or_default();
        return (
            StatusCode::OK,
            Err(OAuthError::Callback(format!(
                "authorization denied: {} {}",
                error, description
            ))),
        );
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return (
            StatusCode::BAD_REQUEST,
            Err(OAuthError::Callback(
                "state mismatch in authorization redirect".to_string(),
            )),
        );
    }

    match params.get("code").filter(|code| !code.is_empty()) {
        Some(code) => (StatusCode::OK, Ok(code.clone())),
        None => (
            StatusCode::BAD_REQUEST,
            Err(OAuthError::Callback(
                "authorization redirect has no code".to_string(),
            )),
        ),
    }
}
