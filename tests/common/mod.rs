#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::{Method, StatusCode};
use actix_web::middleware::Logger;
use actix_web::web::{self, Bytes};
use actix_web::{test, App};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use taskgate::auth::{Admission, Authenticator};
use taskgate::background::BackgroundTasks;
use taskgate::clock::ManualClock;
use taskgate::config::Config;
use taskgate::gate::RequestGate;
use taskgate::models::{Token, TokenScope, User};
use taskgate::notify::{Notifier, NotifyError};
use taskgate::ratelimit::{RateLimitConfig, RateLimiter};
use taskgate::routes::{self, health};
use taskgate::state::AppState;
use taskgate::storage::MemoryStore;

pub const PASSWORD: &str = "pa55word-long-enough";

/// Keeps every token handed to it so tests can play the recipient.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i32, Token)>>,
}

impl RecordingNotifier {
    pub fn latest(&self, user_id: i32, scope: TokenScope) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(id, token)| *id == user_id && token.scope == scope)
            .map(|(_, token)| token.plaintext.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_token(&self, recipient: &User, token: &Token) -> Result<(), NotifyError> {
        self.sent.lock().push((recipient.id, token.clone()));
        Ok(())
    }
}

/// Everything behind one test server: in-memory storage, a hand-driven clock and a
/// notifier that records instead of sending.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub background: Arc<BackgroundTasks>,
    pub state: web::Data<AppState>,
    pub gate: Arc<RequestGate>,
}

impl Harness {
    /// Limiter off, so tests are free to fire as many requests as they like.
    pub fn new() -> Self {
        Self::with_limiter(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn with_limiter(limiter: RateLimitConfig) -> Self {
        let config = Config {
            limiter,
            // Lowest cost bcrypt accepts.
            bcrypt_cost: 4,
            ..Config::default()
        };

        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let background = Arc::new(BackgroundTasks::new());

        let state = web::Data::new(AppState::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            background.clone(),
            &config,
        ));
        let limiter = Arc::new(RateLimiter::new(config.limiter.clone(), clock.clone()));
        let gate = Arc::new(RequestGate::new(
            limiter,
            Authenticator::new(state.tokens.clone()),
        ));

        Self {
            store,
            clock,
            notifier,
            background,
            state,
            gate,
        }
    }

    /// The same routing and middleware stack the server runs.
    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.state.clone())
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api/v1")
                    .wrap(Admission::new(self.gate.clone()))
                    .configure(routes::config),
            )
    }

    /// Lets queued notifications run.
    pub async fn flush_notifications(&self) {
        assert!(self.background.drain(Duration::from_secs(5)).await);
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Sends `req` and renders middleware errors the way the server would.
pub async fn send<S, R, B>(app: &S, req: R) -> Reply
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    let response = match app.call(req).await {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(err) => err.error_response(),
    };
    let status = response.status();
    let headers = response.headers().clone();
    let body = actix_web::body::to_bytes(response.into_body())
        .await
        .unwrap_or_default();
    Reply {
        status,
        headers,
        body,
    }
}

/// A request from 127.0.0.1, optionally carrying a bearer token.
pub fn request(method: Method, uri: &str, token: Option<&str>) -> test::TestRequest {
    request_from(method, uri, token, "127.0.0.1:40000")
}

pub fn request_from(
    method: Method,
    uri: &str,
    token: Option<&str>,
    peer: &str,
) -> test::TestRequest {
    let mut req = test::TestRequest::default()
        .method(method)
        .uri(uri)
        .peer_addr(peer.parse().unwrap());
    if let Some(token) = token {
        req = req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token)));
    }
    req
}

pub async fn register<S, B>(app: &S, name: &str, email: &str) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    let req = request(Method::POST, "/api/v1/users", None)
        .set_json(json!({ "name": name, "email": email, "password": PASSWORD }))
        .to_request();
    send(app, req).await
}

pub async fn login<S, B>(app: &S, email: &str, password: &str) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    let req = request(Method::POST, "/api/v1/tokens/authentication", None)
        .set_json(json!({ "email": email, "password": password }))
        .to_request();
    send(app, req).await
}

pub async fn activate<S, B>(app: &S, token: &str) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    let req = request(Method::PUT, "/api/v1/users/activated", None)
        .set_json(json!({ "token": token }))
        .to_request();
    send(app, req).await
}

impl Harness {
    /// Registers a user and returns its id, failing the test on anything but 202.
    pub async fn registered_user<S, B>(&self, app: &S, email: &str) -> i32
    where
        S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody + 'static,
    {
        let reply = register(app, "Test User", email).await;
        assert_eq!(
            reply.status,
            StatusCode::ACCEPTED,
            "registration failed: {}",
            String::from_utf8_lossy(&reply.body)
        );
        reply.json()["user"]["id"]
            .as_i64()
            .expect("user id in registration response") as i32
    }

    /// Registers and logs in without activating. Returns `(user_id, bearer token)`.
    pub async fn unactivated_user<S, B>(&self, app: &S, email: &str) -> (i32, String)
    where
        S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody + 'static,
    {
        let id = self.registered_user(app, email).await;
        (id, bearer(login(app, email, PASSWORD).await))
    }

    /// Registers, activates through the emailed token, then logs in.
    pub async fn activated_user<S, B>(&self, app: &S, email: &str) -> (i32, String)
    where
        S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody + 'static,
    {
        let id = self.registered_user(app, email).await;
        self.flush_notifications().await;
        let token = self
            .notifier
            .latest(id, TokenScope::Activation)
            .expect("activation token was sent");
        assert_eq!(activate(app, &token).await.status, StatusCode::OK);
        (id, bearer(login(app, email, PASSWORD).await))
    }
}

/// Pulls the plaintext out of a successful login reply.
pub fn bearer(reply: Reply) -> String {
    assert_eq!(
        reply.status,
        StatusCode::CREATED,
        "login failed: {}",
        String::from_utf8_lossy(&reply.body)
    );
    reply.json()["authentication_token"]["token"]
        .as_str()
        .expect("token in login response")
        .to_string()
}
