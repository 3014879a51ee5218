pub mod health;
pub mod messages;
pub mod models;
pub mod posts;
pub mod stream;
pub mod users;
pub mod webhooks;
