pub mod health;
pub mod mailer;
pub mod orders;
pub mod rbmq;
