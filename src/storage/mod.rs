mod memory;
mod sessions;
mod traits;
mod users;

pub use memory::{MemorySessionStore, MemoryUserStore};
pub use sessions::{NewSession, PostgresSessionStore, Session};
pub use traits::{SessionStore, StorageError, StorageResult, UserStore};
pub use users::{CreateUser, PostgresUserStore, User, UserSummary, DEFAULT_ROLES};
