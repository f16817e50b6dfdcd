pub mod assist;
pub mod connection;
pub mod handlers;
pub mod hub;
pub mod identity;
pub mod rooms;
