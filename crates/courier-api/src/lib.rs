pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod push;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tracing::error;

use courier_db::Database;
use courier_gateway::router::DeliveryRouter;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub router: DeliveryRouter,
    /// VAPID public key handed to clients; `None` when push is disabled.
    pub vapid_public_key: Option<String>,
}

/// REST surface: public auth routes plus session-protected messaging.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/push/public-key", get(push::public_key))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/read", post(messages::mark_read))
        .route("/messages/unread/{user_id}", get(messages::unread_count))
        .route("/messages/{user_id}", get(messages::get_conversation))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Run a blocking DB closure off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use uuid::Uuid;

    use courier_gateway::notify::{NotificationDispatcher, PushError, PushFuture, PushSender};
    use courier_gateway::presence::Presence;
    use courier_types::push::{PushPayload, PushSubscription};

    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<PushPayload>>,
        pub(crate) fail: bool,
    }

    impl PushSender for RecordingSender {
        fn send<'a>(&'a self, _subscription: &'a PushSubscription, payload: &'a [u8]) -> PushFuture<'a> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(serde_json::from_slice(payload)?);
                if self.fail {
                    return Err(PushError::Transport("push service unavailable".into()));
                }
                Ok(())
            })
        }
    }

    pub(crate) struct TestApp {
        pub(crate) state: AppState,
        pub(crate) sender: Arc<RecordingSender>,
    }

    impl TestApp {
        pub(crate) fn new() -> Self {
            Self::with_sender(RecordingSender::default())
        }

        pub(crate) fn with_sender(sender: RecordingSender) -> Self {
            let sender = Arc::new(sender);
            let router = DeliveryRouter::new(
                Presence::new(),
                NotificationDispatcher::new(sender.clone()),
            )
            .with_ack_timeout(std::time::Duration::from_millis(200));
            let state = Arc::new(AppStateInner {
                db: Database::open_in_memory().unwrap(),
                jwt_secret: "test-secret".into(),
                router,
                vapid_public_key: Some("BPublicKey".into()),
            });
            Self { state, sender }
        }

        pub(crate) fn app(&self) -> Router {
            routes(self.state.clone())
        }

        /// Insert a user directly and return (id, bearer token).
        pub(crate) fn user(&self, name: &str) -> (Uuid, String) {
            let id = Uuid::new_v4();
            self.state
                .db
                .create_user(&id.to_string(), name, "unused-hash", None)
                .unwrap();
            let token = auth::create_token(&self.state.jwt_secret, id, name).unwrap();
            (id, token)
        }

        pub(crate) async fn request(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, Vec<u8>) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .app()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, bytes.to_vec())
        }
    }

    pub(crate) fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }
}
