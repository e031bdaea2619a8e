//! End-to-end router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{AuthState, router};
use crate::audit::testing::RecordingAuditSink;
use crate::audit::{AuditAction, AuditOutcome};
use crate::cert::revocation::testing::FixedChecker;
use crate::cert::testing::{LeafOptions, ca, leaf};
use crate::cert::ocsp::OcspChecker;
use crate::cert::{
    CaChainValidator, PeerCertificate, RevocationChecker, RevocationPolicy, RevocationStatus,
    TrustStore,
};
use crate::client_auth::TlsClientAuthenticator;
use crate::client_auth::registry::testing::registry;
use crate::client_auth::testing::client;
use crate::config::AuthConfig;
use crate::oauth::AuthorizationService;
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
use crate::oauth::token::{ErrorResponse, TokenResponse};
use crate::provider::testing::FixedLogin;
use crate::provider::{InteractiveConsentProvider, SigningKeyProvider, StaticSigningKeyProvider};
use crate::secret::SecretHasher;
use crate::storage::memory::{
    InMemoryAuthorizationRequestStorage, InMemoryClientStorage, InMemoryConsentStorage,
    InMemoryRefreshTokenStorage,
};
use crate::token::issuer::testing::{ISSUER, issuer};
use crate::token::{AccessTokenClaims, Jwks, TokenService};
use crate::types::ClientCredential;

struct Harness {
    app: Router,
    audit: Arc<RecordingAuditSink>,
    keys: Arc<StaticSigningKeyProvider>,
    device_cert: Vec<u8>,
}

fn harness() -> Harness {
    // The OCSP responder never answers; fail-open admits the certificate.
    let checker = FixedChecker(RevocationStatus::inconclusive("ocsp: responder timed out"));
    harness_with_revocation(Arc::new(checker), LeafOptions::default())
}

fn harness_with_revocation(
    revocation: Arc<dyn RevocationChecker>,
    device_options: LeafOptions<'_>,
) -> Harness {
    let hasher = SecretHasher::with_iterations(1_000);
    let billing = client(
        "billing",
        ClientCredential::ClientSecretBasic {
            secret_hash: hasher.hash("s3cret"),
        },
    );
    let device = client(
        "device",
        ClientCredential::TlsClientAuth { subject_dn: None },
    );
    let clients = Arc::new(InMemoryClientStorage::from_clients([billing, device]).unwrap());

    let root = ca("Device CA");
    let device_cert = leaf(&root, device_options).der;
    let mut trust = TrustStore::new();
    trust.add_der(root.cert.der().clone()).unwrap();
    let chain = CaChainValidator::new(Arc::new(trust))
        .with_revocation(revocation, RevocationPolicy::FailOpen);

    let audit = Arc::new(RecordingAuditSink::default());
    let registry = Arc::new(
        registry(clients.clone(), audit.clone())
            .with(Arc::new(TlsClientAuthenticator::ca_chain(chain))),
    );

    let requests = Arc::new(InMemoryAuthorizationRequestStorage::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenStorage::new());
    let (token_issuer, keys) = issuer(refresh_tokens.clone());

    let authorization = AuthorizationService::new(
        &AuthConfig::default(),
        clients,
        requests.clone(),
        Arc::new(InMemoryConsentStorage::new()),
        Arc::new(FixedLogin),
        Arc::new(InteractiveConsentProvider),
        audit.clone(),
    )
    .unwrap();
    let tokens = TokenService::new(
        registry.clone(),
        requests,
        refresh_tokens,
        token_issuer,
        audit.clone(),
    );

    let app = router(AuthState {
        authorization: Arc::new(authorization),
        tokens: Arc::new(tokens),
        clients: registry,
        keys: keys.clone(),
    });
    Harness {
        app,
        audit,
        keys,
        device_cert,
    }
}

// =============================================================================
// Request helpers
// =============================================================================

fn encode(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn form(uri: &str) -> axum::http::request::Builder {
    Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
}

fn post(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    form(uri).body(Body::from(encode(pairs))).unwrap()
}

fn post_basic(uri: &str, client_id: &str, secret: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    let credentials = STANDARD.encode(format!("{client_id}:{secret}"));
    form(uri)
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::from(encode(pairs)))
        .unwrap()
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Runs authorize, login and consent; returns the code.
    async fn authorize(&self, client_id: &str, verifier: &PkceVerifier) -> String {
        let challenge = PkceChallenge::from_verifier(verifier);
        let redirect_uri = format!("https://{client_id}.example.com/cb");
        let query = encode(&[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", &redirect_uri),
            ("scope", "openid profile"),
            ("state", "af0ifjsldkj"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ]);

        let response = self.send(get(&format!("/authorize?{query}"))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let request_id = param(&location(&response), "request_id").unwrap();

        let response = self
            .send(post(
                "/authorize/login",
                &[
                    ("request_id", &request_id),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).starts_with("/consent?"));

        let response = self
            .send(post(
                "/authorize",
                &[("request_id", &request_id), ("decision", "grant")],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = location(&response);
        assert!(location.starts_with(&redirect_uri));
        assert_eq!(param(&location, "state").as_deref(), Some("af0ifjsldkj"));
        param(&location, "code").unwrap()
    }

    async fn exchange(&self, code: &str, verifier: &str) -> Response {
        self.send(post_basic(
            "/token",
            "billing",
            "s3cret",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", "https://billing.example.com/cb"),
                ("code_verifier", verifier),
            ],
        ))
        .await
    }
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// Query parameter of an absolute or relative URL.
fn param(location: &str, name: &str) -> Option<String> {
    let url = url::Url::parse("http://localhost/")
        .unwrap()
        .join(location)
        .unwrap();
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_authorization_code_flow() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;

    let response = h.exchange(&code, verifier.as_str()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let tokens: TokenResponse = json(response).await;
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope, "openid profile");
    assert!(tokens.refresh_token.is_some());

    let key = h.keys.current_signing_key().await.unwrap();
    let claims = key
        .verify::<AccessTokenClaims>(&tokens.access_token, ISSUER, "billing")
        .unwrap()
        .claims;
    assert_eq!(claims.sub, "user-alice");

    let actions = h.audit.actions();
    for expected in [
        AuditAction::ConsentGranted,
        AuditAction::CodeIssued,
        AuditAction::ClientAuthenticated,
        AuditAction::CodeRedeemed,
        AuditAction::TokenIssued,
    ] {
        assert!(actions.contains(&expected), "missing {expected:?}");
    }
}

#[tokio::test]
async fn test_code_replay_rejected() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;

    assert_eq!(
        h.exchange(&code, verifier.as_str()).await.status(),
        StatusCode::OK
    );

    let response = h.exchange(&code, verifier.as_str()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_grant");
    assert!(h.audit.actions().contains(&AuditAction::CodeReplayRejected));
}

#[tokio::test]
async fn test_wrong_verifier_leaves_code_redeemable() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;

    let other = PkceVerifier::generate();
    let response = h.exchange(&code, other.as_str()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_grant");

    assert_eq!(
        h.exchange(&code, verifier.as_str()).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_refresh_rotation() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;
    let tokens: TokenResponse = json(h.exchange(&code, verifier.as_str()).await).await;
    let original = tokens.refresh_token.unwrap();

    let refresh = |token: &str, scope: &str| {
        post_basic(
            "/token",
            "billing",
            "s3cret",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", token),
                ("scope", scope),
            ],
        )
    };

    let response = h.send(refresh(&original, "openid")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated: TokenResponse = json(response).await;
    assert_eq!(rotated.scope, "openid");
    let next = rotated.refresh_token.unwrap();
    assert_ne!(next, original);

    let response = h.send(refresh(&original, "openid")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The rotated token keeps the original grant.
    let response = h.send(refresh(&next, "openid profile")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn redeem_with_device_certificate(h: &Harness) -> Response {
    let verifier = PkceVerifier::generate();
    let code = h.authorize("device", &verifier).await;

    let mut request = post(
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://device.example.com/cb"),
            ("code_verifier", verifier.as_str()),
            ("client_id", "device"),
        ],
    );
    request
        .extensions_mut()
        .insert(PeerCertificate::from_der(h.device_cert.clone()));
    h.send(request).await
}

fn assert_degraded_event(h: &Harness) {
    let events = h.audit.events();
    let degraded = events
        .iter()
        .find(|e| e.action == AuditAction::RevocationCheckDegraded)
        .unwrap();
    assert_eq!(degraded.outcome, AuditOutcome::Degraded);
    assert_eq!(degraded.client_id.as_deref(), Some("device"));
}

#[tokio::test]
async fn test_mtls_with_degraded_revocation() {
    let h = harness();
    let response = redeem_with_device_certificate(&h).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_degraded_event(&h);
}

#[tokio::test]
async fn test_mtls_with_slow_ocsp_responder_fails_open() {
    let responder = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocsp"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&responder)
        .await;

    let checker = OcspChecker::new(Duration::from_millis(200)).unwrap();
    let h = harness_with_revocation(
        Arc::new(checker),
        LeafOptions {
            ocsp_url: Some(format!("{}/ocsp", responder.uri())),
            ..LeafOptions::default()
        },
    );

    let response = redeem_with_device_certificate(&h).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token: TokenResponse = json(response).await;
    assert_eq!(token.token_type, "Bearer");
    assert_degraded_event(&h);
    assert_eq!(responder.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mtls_without_certificate_is_rejected() {
    let h = harness();
    let response = h
        .send(post(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", "abc"),
                ("redirect_uri", "https://device.example.com/cb"),
                ("code_verifier", "x"),
                ("client_id", "device"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_client");
}

// =============================================================================
// Endpoint behavior
// =============================================================================

#[tokio::test]
async fn test_wrong_secret_leaves_code_redeemable() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;

    let response = h
        .send(post_basic(
            "/token",
            "billing",
            "wrong",
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", "https://billing.example.com/cb"),
                ("code_verifier", verifier.as_str()),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_client");

    let response = h.exchange(&code, verifier.as_str()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unregistered_redirect_is_not_followed() {
    let h = harness();
    let query = encode(&[
        ("response_type", "code"),
        ("client_id", "billing"),
        ("redirect_uri", "https://attacker.example.com/cb"),
        ("code_challenge", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"),
        ("code_challenge_method", "S256"),
    ]);
    let response = h.send(get(&format!("/authorize?{query}"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key(header::LOCATION));
}

#[tokio::test]
async fn test_invalid_scope_redirects_with_state() {
    let h = harness();
    let query = encode(&[
        ("response_type", "code"),
        ("client_id", "billing"),
        ("redirect_uri", "https://billing.example.com/cb"),
        ("scope", "openid admin"),
        ("state", "xyz"),
        ("code_challenge", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"),
        ("code_challenge_method", "S256"),
    ]);
    let response = h.send(get(&format!("/authorize?{query}"))).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = location(&response);
    assert_eq!(param(&location, "error").as_deref(), Some("invalid_scope"));
    assert_eq!(param(&location, "state").as_deref(), Some("xyz"));
}

#[tokio::test]
async fn test_deny_redirects_access_denied() {
    let h = harness();
    let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());
    let query = encode(&[
        ("response_type", "code"),
        ("client_id", "billing"),
        ("redirect_uri", "https://billing.example.com/cb"),
        ("scope", "openid"),
        ("state", "xyz"),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ]);
    let response = h.send(get(&format!("/authorize?{query}"))).await;
    let request_id = param(&location(&response), "request_id").unwrap();
    h.send(post(
        "/authorize/login",
        &[
            ("request_id", &request_id),
            ("username", "alice"),
            ("password", "secret"),
        ],
    ))
    .await;

    let response = h
        .send(post(
            "/authorize",
            &[("request_id", &request_id), ("decision", "deny")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = location(&response);
    assert_eq!(param(&location, "error").as_deref(), Some("access_denied"));
    assert_eq!(param(&location, "state").as_deref(), Some("xyz"));
}

#[tokio::test]
async fn test_non_form_body_rejected() {
    let h = harness();
    let request = Request::post("/token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"grant_type":"authorization_code"}"#))
        .unwrap();
    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_request");
}

#[tokio::test]
async fn test_revoke_endpoint() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let code = h.authorize("billing", &verifier).await;
    let tokens: TokenResponse = json(h.exchange(&code, verifier.as_str()).await).await;
    let refresh = tokens.refresh_token.unwrap();

    let response = h
        .send(post_basic(
            "/revoke",
            "billing",
            "s3cret",
            &[("token", &refresh), ("token_type_hint", "refresh_token")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown tokens get the same answer.
    let response = h
        .send(post_basic("/revoke", "billing", "s3cret", &[("token", "nope")]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .send(post_basic(
            "/token",
            "billing",
            "s3cret",
            &[("grant_type", "refresh_token"), ("refresh_token", &refresh)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_consent_revoke_endpoint() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    h.authorize("billing", &verifier).await;

    let response = h
        .send(post_basic(
            "/consent/revoke",
            "billing",
            "s3cret",
            &[("user_id", "user-alice")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.audit.actions().contains(&AuditAction::ConsentRevoked));

    // The next authorization asks for consent again.
    h.authorize("billing", &verifier).await;
}

#[tokio::test]
async fn test_jwks_publishes_signing_key() {
    let h = harness();
    let response = h.send(get("/.well-known/jwks.json")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let jwks: Jwks = json(response).await;
    let key = h.keys.current_signing_key().await.unwrap();
    assert_eq!(jwks.keys.len(), 1);
    assert_eq!(jwks.keys[0].kid, key.kid());
}
