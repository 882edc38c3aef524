pub mod notifications;
pub mod websocket;
