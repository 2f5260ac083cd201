//! Keystone Relay Server
//!
//! A development server for the three Keystone services:
//!
//! 1. **Pythia**: transforms blinded passwords for BrainKey and proves the
//!    transform was done with the published key.
//!
//! 2. **Cards**: accepts self-signed cards, countersigns them and serves
//!    lookups and searches with supersession flags.
//!
//! 3. **Keyknox**: stores one encrypted value per caller and replaces it
//!    only when the client names the current hash.
//!
//! **Privacy**: The relay never sees passwords or plaintext keys. It handles
//! blinded points and opaque encrypted blobs.

mod api;
mod error;
mod state;

use axum::{extract::State, http::Method, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use keystone_core::encoding::to_base64;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{RelayConfig, RelayState, DEFAULT_PYTHIA_KEY_ID, DEFAULT_PYTHIA_SCOPE};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "keystone-relay", version, about = "Keystone development services")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Server region label (e.g. "US East", "EU West")
    #[arg(long, default_value = "local", env = "RELAY_REGION")]
    region: String,

    /// Transformation key id
    #[arg(long, default_value = DEFAULT_PYTHIA_KEY_ID, env = "PYTHIA_KEY_ID")]
    pythia_key_id: String,

    /// Transformation deployment secret. Random when unset, which changes
    /// every BrainKey on restart.
    #[arg(long, env = "PYTHIA_SECRET")]
    pythia_secret: Option<String>,

    /// Transformation scope secret
    #[arg(long, default_value = DEFAULT_PYTHIA_SCOPE, env = "PYTHIA_SCOPE_SECRET")]
    pythia_scope_secret: String,

    /// Hex seed (32 bytes) of the card countersigning key. Random when unset.
    #[arg(long, env = "SERVICE_SIGNING_SEED")]
    service_signing_seed: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "RELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> Result<RelayConfig, String> {
        let defaults = RelayConfig::default();

        let pythia_secret = match self.pythia_secret {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                tracing::warn!("PYTHIA_SECRET not set; BrainKeys will change on restart");
                defaults.pythia_secret
            }
        };

        let service_signing_seed = match self.service_signing_seed {
            Some(seed) => {
                let bytes = hex::decode(seed.trim())
                    .map_err(|e| format!("SERVICE_SIGNING_SEED is not hex: {}", e))?;
                bytes
                    .try_into()
                    .map_err(|_| "SERVICE_SIGNING_SEED must be 32 bytes".to_string())?
            }
            None => {
                tracing::warn!("SERVICE_SIGNING_SEED not set; card service key is ephemeral");
                defaults.service_signing_seed
            }
        };

        Ok(RelayConfig {
            port: self.port,
            region: self.region,
            pythia_key_id: self.pythia_key_id,
            pythia_secret,
            pythia_scope_secret: self.pythia_scope_secret.into_bytes(),
            service_signing_seed,
        })
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keystone_relay=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = args.into_config().expect("Invalid configuration");
    let port = config.port;
    let state = RelayState::new(config).expect("Failed to initialize services");

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Keystone relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app(state))
        .await
        .expect("Server error");
}

/// Full router with middleware.
fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/info", get(info_handler))
        .merge(api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "keystone-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let operations: serde_json::Map<String, serde_json::Value> = state
        .stats
        .iter()
        .map(|entry| (entry.key().to_string(), json!(*entry.value())))
        .collect();

    Json(json!({
        "cards": state.cards.len(),
        "operations": operations,
    }))
}

/// Server info endpoint: the keys clients pin.
async fn info_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "service": "keystone-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "core_version": keystone_core::version(),
        "region": state.config.region,
        "service_public_key": hex::encode(state.cards.service_public_key()),
        "brainkey_public_key": hex::encode(state.seeds.transformation_public_key()),
        "brainkey_public_key_base64": to_base64(state.seeds.transformation_public_key()),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use keystone_core::auth::{AccessToken, AccessTokenProvider, ConstAccessTokenProvider};
    use keystone_core::brainkey::{BrainKey, HttpPythiaClient, ProofPolicy};
    use keystone_core::cards::{CardManager, HttpCardClient, VirgilCardVerifier};
    use keystone_core::crypto::KeyPair;
    use keystone_core::keyknox::{
        HttpKeyknoxClient, KeyknoxClient, KeyknoxManager, HASH_HEADER, PREVIOUS_HASH_HEADER,
    };
    use keystone_core::oprf::RistrettoOprf;
    use keystone_core::{Error, ServiceConfig};
    use tower::ServiceExt;

    fn test_state() -> RelayState {
        RelayState::new(RelayConfig::default()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Serve `router` on a free local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base_url
    }

    fn keyknox_put(token: &str, previous: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::put("/keyknox/v1")
            .header(header::AUTHORIZATION, format!("Virgil {}", token))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(previous) = previous {
            builder = builder.header(PREVIOUS_HASH_HEADER, previous);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "keystone-relay");
    }

    #[tokio::test]
    async fn test_info_exposes_pinned_keys() {
        let state = test_state();
        let expected = hex::encode(state.cards.service_public_key());

        let response = app(state)
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["service_public_key"], expected);
    }

    #[tokio::test]
    async fn test_keyknox_requires_authorization() {
        let response = app(test_state())
            .oneshot(Request::get("/keyknox/v1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_keyknox_push_and_conflict() {
        let state = test_state();
        let router = app(state.clone());
        let body = json!({ "meta": "AQ==", "value": "Ag==" });

        let first = router
            .clone()
            .oneshot(keyknox_put("alice", None, body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let hash = first
            .headers()
            .get(HASH_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(json_body(first).await["version"], "1.1");

        // No previous hash on a non-empty value
        let stale = router
            .clone()
            .oneshot(keyknox_put("alice", None, body.clone()))
            .await
            .unwrap();
        assert_eq!(stale.status(), StatusCode::CONFLICT);

        let second = router
            .clone()
            .oneshot(keyknox_put("alice", Some(&hash), body.clone()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let garbage = router
            .oneshot(keyknox_put("alice", Some("%%%"), body))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

        assert_eq!(state.count("keyknox.push"), 2);
    }

    #[tokio::test]
    async fn test_unknown_card_is_404() {
        let response = app(test_state())
            .oneshot(
                Request::get("/card/v5/deadbeef")
                    .header(header::AUTHORIZATION, "Virgil alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "keystone-relay",
            "--port",
            "9000",
            "--pythia-secret",
            "s3cret",
            "--service-signing-seed",
            &"ab".repeat(32),
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.pythia_secret, b"s3cret");
        assert_eq!(config.service_signing_seed, [0xab; 32]);

        let bad = Args::parse_from(["keystone-relay", "--service-signing-seed", "abcd"]);
        assert!(bad.into_config().is_err());
    }

    /// The core HTTP clients against a live relay.
    #[tokio::test]
    async fn test_core_clients_end_to_end() {
        let state = test_state();
        let base_url = serve(app(state.clone())).await;

        let mut config = ServiceConfig::with_base_url(&base_url);
        config.service_public_key = Some(state.cards.service_public_key());
        config.brainkey_public_key =
            Some(state.seeds.transformation_public_key().try_into().unwrap());

        let tokens: Arc<dyn AccessTokenProvider> =
            Arc::new(ConstAccessTokenProvider::new(AccessToken::new("alice")));

        // BrainKey with proofs
        let brainkey = BrainKey::new(
            Arc::new(RistrettoOprf::new()),
            Arc::new(HttpPythiaClient::from_config(&config)),
            tokens.clone(),
            ProofPolicy::from_config(&config),
        );
        assert!(matches!(brainkey.policy(), ProofPolicy::Verify { .. }));
        let a = brainkey.generate_key_pair("pw", Some("alice")).await.unwrap();
        let b = brainkey.generate_key_pair("pw", Some("alice")).await.unwrap();
        assert_eq!(a.public_keys(), b.public_keys());

        // Cards
        let cards = CardManager::new(
            Arc::new(HttpCardClient::from_config(&config)),
            Arc::new(VirgilCardVerifier::from_config(&config)),
            tokens.clone(),
        );
        let key = KeyPair::generate();
        let first = cards
            .publish_card(cards.generate_raw_card(&key, "alice", None).unwrap())
            .await
            .unwrap();
        let second = cards
            .publish_card(
                cards
                    .generate_raw_card(&KeyPair::generate(), "alice", Some(first.id.as_str()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(cards.get_card(&first.id).await.unwrap().is_outdated);
        let heads = cards.search_cards("alice").await.unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads.heads().next().unwrap().id, second.id);

        // Keyknox
        let client = Arc::new(HttpKeyknoxClient::from_config(&config));
        let manager = KeyknoxManager::for_self(client.clone(), tokens.clone(), a);
        assert!(manager.pull_value().await.unwrap().is_empty());

        let pushed = manager.push_value(b"backup", None).await.unwrap();
        assert_eq!(manager.pull_value().await.unwrap().value, b"backup");

        manager
            .push_value(b"newer", Some(pushed.keyknox_hash.as_slice()))
            .await
            .unwrap();
        let err = manager
            .push_value(b"stale", Some(pushed.keyknox_hash.as_slice()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyknoxConflict));

        let reset = client
            .reset_value(&AccessToken::new("alice"))
            .await
            .unwrap();
        assert_eq!(reset.version.to_string(), "2.0");
    }

    #[tokio::test]
    async fn test_keyknox_client_requires_hash_header() {
        let body = json!({ "meta": "", "value": "", "version": "1.0" });

        let without_header = {
            let body = body.clone();
            Router::new().route(
                "/keyknox/v1",
                get(move || {
                    let body = body.clone();
                    async move { Json(body) }
                }),
            )
        };
        let with_garbage = Router::new().route(
            "/keyknox/v1",
            get(move || {
                let body = body.clone();
                async move { ([(HASH_HEADER, "%%%")], Json(body)) }
            }),
        );

        let token = AccessToken::new("alice");
        for router in [without_header, with_garbage] {
            let client = HttpKeyknoxClient::new(serve(router).await, "Virgil");
            let err = client.pull_value(&token).await.unwrap_err();
            assert!(matches!(err, Error::InvalidPreviousHashHeader));
        }
    }
}
