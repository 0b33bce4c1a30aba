use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use crate::services::chat_service::{self, SendMessage};
use crate::socket::{socket_user, user_room, ErrorPayload};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TypingEvent {
    pub receiver_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TypingNotice {
    pub sender_id: Uuid,
    pub is_typing: bool,
}

pub fn register(socket: &SocketRef, state: &Arc<AppState>) {
    socket.on("sendMessage", {
        let state = state.clone();
        move |socket: SocketRef, Data::<SendMessage>(payload)| {
            let state = state.clone();
            async move { on_send_message(socket, payload, &state).await }
        }
    });

    socket.on("typing", |socket: SocketRef, Data::<TypingEvent>(payload)| async move {
        on_typing(socket, payload);
    });
}

async fn on_send_message(socket: SocketRef, payload: SendMessage, state: &AppState) {
    let Some(sender_id) = socket_user(&socket) else {
        return;
    };
    let receiver_id = payload.receiver_id;

    let saved = match state.db.get() {
        Ok(mut conn) => chat_service::save_message(&mut conn, sender_id, payload),
        Err(e) => Err(courtside_shared::AppError::internal(e.to_string())),
    };

    match saved {
        Ok(view) => {
            if let Err(e) = socket.within(user_room(receiver_id)).emit("newMessage", &view) {
                tracing::warn!(receiver_id = %receiver_id, error = %e, "failed to deliver message");
            }
            if let Err(e) = socket.within(user_room(sender_id)).emit("messageSent", &view) {
                tracing::warn!(sender_id = %sender_id, error = %e, "failed to confirm message");
            }
            tracing::debug!(message_id = %view.message.id, sender_id = %sender_id, receiver_id = %receiver_id, "message sent");
        }
        Err(e) => {
            tracing::error!(sender_id = %sender_id, error = %e, "sendMessage failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    message: "Failed to send message".into(),
                },
            );
        }
    }
}

fn on_typing(socket: SocketRef, payload: TypingEvent) {
    let Some(sender_id) = socket_user(&socket) else {
        return;
    };
    let notice = TypingNotice {
        sender_id,
        is_typing: payload.is_typing,
    };
    let _ = socket.to(user_room(payload.receiver_id)).emit("displayTyping", &notice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_event_parses() {
        let id = Uuid::now_v7();
        let ev: TypingEvent = serde_json::from_value(serde_json::json!({ "receiver_id": id, "is_typing": true })).unwrap();
        assert_eq!(ev.receiver_id, id);
        assert!(ev.is_typing);
    }

    #[test]
    fn typing_notice_shape() {
        let notice = TypingNotice { sender_id: Uuid::nil(), is_typing: false };
        let v = serde_json::to_value(&notice).unwrap();
        assert_eq!(v["is_typing"], false);
        assert_eq!(v["sender_id"], Uuid::nil().to_string());
    }
}
