pub mod review;
pub mod user;
pub mod vote;

pub use review::*;
pub use user::*;
pub use vote::*;
