pub mod credential;
pub mod email;
pub mod health;
pub mod message;
pub mod order;
pub mod payment;
pub mod response;
pub mod retry;
