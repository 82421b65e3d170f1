mod auth;
mod health;
mod users;

pub use auth::*;
pub use health::*;
pub use users::*;
