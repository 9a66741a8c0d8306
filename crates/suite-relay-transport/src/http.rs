//! HTTP message endpoint.

use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::post};
use bytes::Bytes;
use suite_relay_session::EventRelay;

use crate::protocol::decode_body;

/// Shared handler state.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Arc<EventRelay>,
}

impl RelayState {
    /// Create handler state around a relay.
    #[must_use]
    pub const fn new(relay: Arc<EventRelay>) -> Self {
        Self { relay }
    }
}

/// Accept one message or a batch in the request body.
///
/// Responds once every message the policy waits on has been processed.
/// Listener failures are reported to the error sink, never to the caller.
pub async fn message_handler(State(state): State<RelayState>, body: Bytes) -> StatusCode {
    let errors = state.relay.error_sink();
    let messages = match decode_body(&body) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!("Rejected message body: {e}");
            errors.report(Box::new(e));
            return StatusCode::BAD_REQUEST;
        }
    };

    for message in &messages {
        if let Err(e) = state.relay.handle_message(message).await {
            errors.report(Box::new(e));
        }
    }

    StatusCode::NO_CONTENT
}

/// Create the HTTP message router.
#[must_use]
pub fn create_http_router(relay: Arc<EventRelay>) -> Router {
    Router::new()
        .route("/", post(message_handler))
        .with_state(RelayState::new(relay))
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, PoisonError};

    use super::*;
    use axum::{body::Body, http::Request};
    use futures::{FutureExt, future};
    use serde_json::Value;
    use suite_relay_core::{ErrorChannel, SyncPolicy};
    use suite_relay_session::{ListenerError, ListenerFuture, listener_fn};
    use tower::ServiceExt;

    fn post_body(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_relays_batch_in_order() {
        let relay = Arc::new(EventRelay::new(SyncPolicy::Always));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _sub = relay.subscribe(
            "S1",
            listener_fn(move |name: &str, _: &Value| -> ListenerFuture {
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(name.to_string());
                future::ok(()).boxed()
            }),
        );

        let response = create_http_router(Arc::clone(&relay))
            .oneshot(post_body(
                r#"[
                    {"id":1,"sessionId":"S1","name":"suiteStart","data":[{"tests":[]}]},
                    "{\"id\":2,\"sessionId\":\"S1\",\"name\":\"testStart\"}"
                ]"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(*seen.lock().unwrap(), vec!["suiteStart", "testStart"]);
    }

    #[tokio::test]
    async fn test_listener_failure_still_succeeds() {
        let (sink, mut errors) = ErrorChannel::new();
        let relay = Arc::new(EventRelay::with_error_sink(
            SyncPolicy::Always,
            Arc::new(sink),
        ));
        let _sub = relay.subscribe(
            "S1",
            listener_fn(|_: &str, _: &Value| -> ListenerFuture {
                future::err(ListenerError::Failed("reporter down".into())).boxed()
            }),
        );

        let response = create_http_router(relay)
            .oneshot(post_body(r#"{"id":1,"sessionId":"S1","name":"testEnd"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(errors.recv().await.unwrap().to_string().contains("reporter down"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (sink, mut errors) = ErrorChannel::new();
        let relay = Arc::new(EventRelay::with_error_sink(SyncPolicy::Never, Arc::new(sink)));

        let response = create_http_router(relay)
            .oneshot(post_body("{broken"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(errors.recv().await.is_some());
    }
}
