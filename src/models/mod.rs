pub mod notification;
pub mod response;
pub mod session;
