pub mod broadcast;
pub mod connection;
pub mod message;
pub mod presence;
pub mod send;
