use app_error::AppResult;
use axum::{
    Extension, Json,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Round trip to the database. Failures surface as a generic 500.
pub async fn db_status(Extension(state): Extension<AppState>) -> AppResult<Json<Value>> {
    state.db.health_check().await?;
    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
    })))
}

pub async fn ws_tasks(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_tasks_socket)
}

// Echoes every text frame until the client goes away.
async fn handle_tasks_socket(mut socket: WebSocket) {
    info!("Task channel connected");

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let reply = task_reply(text.as_str());
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!("Task channel closed");
}

fn task_reply(data: &str) -> String {
    format!("Message text: {}", data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_reply_wraps_payload() {
        assert_eq!(task_reply("build #42"), "Message text: build #42");
    }
}
