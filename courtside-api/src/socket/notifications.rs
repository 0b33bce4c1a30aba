use socketioxide::extract::{Data, SocketRef};

pub fn register(socket: &SocketRef) {
    socket.on("ping", |socket: SocketRef, Data::<serde_json::Value>(payload)| async move {
        let _ = socket.emit("pong", &payload);
    });
}
