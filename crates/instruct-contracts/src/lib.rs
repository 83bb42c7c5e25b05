pub mod chat;
pub mod events;
pub mod protocol;
pub mod request;
pub mod session;
