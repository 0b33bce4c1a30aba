use std::sync::Arc;

use serde::Serialize;
use socketioxide::extract::SocketRef;
use uuid::Uuid;

use courtside_shared::middleware::validate_jwt;

use crate::AppState;

pub mod chat;
pub mod notifications;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub(crate) fn socket_user(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

/// `?token=` wins over an `Authorization: Bearer` handshake header.
fn handshake_token(query: Option<&str>, authorization: Option<&str>) -> Option<String> {
    let from_query = query.unwrap_or_default().split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token" && !value.is_empty()).then(|| value.to_string())
    });
    from_query.or_else(|| {
        authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
    })
}

fn authenticate(socket: &SocketRef, state: &AppState) -> Result<Uuid, String> {
    let parts = socket.req_parts();
    let authorization = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let token = handshake_token(parts.uri.query(), authorization)
        .ok_or_else(|| "missing token query parameter".to_string())?;

    let claims = validate_jwt(&token, &state.config.jwt_secret).map_err(|e| e.to_string())?;
    if claims.is_expired() {
        return Err("token has expired".into());
    }
    Ok(claims.sub)
}

pub async fn on_connect(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, sid = %socket.id, "socket auth failed");
            let _ = socket.emit("error", &ErrorPayload { message: msg });
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);
    socket.join(user_room(user_id)).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket connected");
    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    chat::register(&socket, &state);
    notifications::register(&socket);

    socket.on_disconnect(|socket: SocketRef| async move {
        if let Some(user_id) = socket_user(&socket) {
            tracing::info!(user_id = %user_id, sid = %socket.id, "socket disconnected");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_read_from_query() {
        assert_eq!(handshake_token(Some("EIO=4&token=abc.def&transport=websocket"), None), Some("abc.def".into()));
    }

    #[test]
    fn header_is_a_fallback() {
        assert_eq!(handshake_token(Some("EIO=4"), Some("Bearer xyz")), Some("xyz".into()));
        assert_eq!(handshake_token(Some("token=q"), Some("Bearer xyz")), Some("q".into()));
        assert_eq!(handshake_token(Some("token="), None), None);
        assert_eq!(handshake_token(None, Some("Basic xyz")), None);
    }

    #[test]
    fn rooms_are_per_user() {
        assert_eq!(user_room(Uuid::nil()), "user:00000000-0000-0000-0000-000000000000");
    }
}
