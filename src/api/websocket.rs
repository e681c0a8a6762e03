/// WebSocket Real-Time Updates
///
/// Streams the notifier's dashboard feed (the same broadcast channel the
/// `dashboard` channel adapter publishes to) to connected clients.
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::models::WsMessage;
use super::AppState;

/// WebSocket connection handler
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    actix_web::rt::spawn(handle_ws_session(session, msg_stream, state.into_inner()));

    Ok(response)
}

/// Handle a WebSocket session
async fn handle_ws_session(
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    state: Arc<AppState>,
) {
    tracing::info!("websocket connection established");

    let mut subscriptions: HashSet<String> = HashSet::new();
    subscriptions.insert("notifications".to_string());
    let mut feed = state.dashboard_feed.subscribe();

    let init_msg = json!({
        "type": "connected",
        "message": "connected to the orchestrator dashboard feed",
    });

    if let Err(e) = session.text(init_msg.to_string()).await {
        tracing::error!("failed to send init message: {}", e);
        return;
    }

    loop {
        tokio::select! {
            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ws_msg) = serde_json::from_str::<WsMessage>(&text) {
                            match ws_msg {
                                WsMessage::Subscribe { channel } => {
                                    subscriptions.insert(channel.clone());
                                    let response = json!({"type": "subscribed", "channel": channel});
                                    let _ = session.text(response.to_string()).await;
                                }
                                WsMessage::Unsubscribe { channel } => {
                                    subscriptions.remove(&channel);
                                }
                                WsMessage::Ping => {
                                    let _ = session.text(json!({"type": "pong"}).to_string()).await;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("websocket connection closed");
                        break;
                    }
                    None => {
                        tracing::info!("websocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }

            received = feed.recv() => {
                match received {
                    Ok(notification) if subscriptions.contains("notifications") => {
                        let msg = WsMessage::Notification {
                            subject: notification.subject,
                            body: notification.body,
                            severity: format!("{:?}", notification.severity),
                            fields: notification.fields,
                        };
                        if let Ok(json) = serde_json::to_string(&msg) {
                            let _ = session.text(json).await;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("websocket client lagged, skipped {} notifications", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!("websocket session ended");
}

/// Health check for WebSocket endpoints
pub async fn ws_health() -> Result<HttpResponse, actix_web::Error> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ready",
        "endpoint": "/ws",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_message_serialization() {
        let msg = WsMessage::Ping;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("ping"));
    }
}
