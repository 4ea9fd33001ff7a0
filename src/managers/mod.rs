pub mod coordinator;
pub mod logging;
pub mod notification;
pub mod rotation;
