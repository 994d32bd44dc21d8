pub mod reviews;
pub mod users;
pub mod webhooks;
