pub mod health;
pub mod negotiate;
pub mod notify;
