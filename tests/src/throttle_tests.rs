use app_error::{AppError, AppResult};
use app_middleware::LoginThrottle;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::{Arc, Mutex};

use crate::common::{PASSWORD, Setup, error_code};

/// Records every call and optionally refuses all logins.
#[derive(Default)]
struct RecordingThrottle {
    events: Mutex<Vec<String>>,
    refuse: bool,
}

impl RecordingThrottle {
    fn record(&self, event: &str, client: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, client));
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginThrottle for RecordingThrottle {
    async fn check(&self, client: &str) -> AppResult<()> {
        self.record("check", client);
        if self.refuse {
            return Err(AppError::RateLimitError("Too many login attempts.".into()));
        }
        Ok(())
    }

    async fn record_failure(&self, client: &str) -> AppResult<()> {
        self.record("failure", client);
        Ok(())
    }

    async fn record_success(&self, client: &str) -> AppResult<()> {
        self.record("success", client);
        Ok(())
    }
}

#[tokio::test]
async fn test_throttle_sees_client_address_and_outcome() {
    let throttle = Arc::new(RecordingThrottle::default());
    let app = Setup {
        throttle: Some(throttle.clone()),
        ..Default::default()
    }
    .build()
    .await;
    app.register("alice").await;

    app.login("alice", "Wrong1!", "203.0.113.5").await;
    app.login("alice", PASSWORD, "203.0.113.5").await;

    assert_eq!(
        throttle.events(),
        vec![
            "check:203.0.113.5",
            "failure:203.0.113.5",
            "check:203.0.113.5",
            "success:203.0.113.5",
        ]
    );
}

#[tokio::test]
async fn test_refusal_happens_before_credentials_are_checked() {
    let throttle = Arc::new(RecordingThrottle {
        refuse: true,
        ..Default::default()
    });
    let app = Setup {
        throttle: Some(throttle.clone()),
        ..Default::default()
    }
    .build()
    .await;
    app.register("alice").await;

    let response = app.login("alice", PASSWORD, "203.0.113.5").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(response).await, "RATE_LIMIT");

    // Neither a failure nor a success was recorded
    assert_eq!(throttle.events(), vec!["check:203.0.113.5"]);
}
