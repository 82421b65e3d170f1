mod context;
mod error;
mod middleware;
mod password;
mod service;
mod token;

pub use context::AuthContext;
pub use error::{AuthError, ErrorResponse};
pub use middleware::{
    auth_middleware, extract_bearer_token, parse_bearer, require_role, AllowedRoles, AUTH_COOKIE,
};
pub use password::{CredentialHasher, PasswordError};
pub use service::{
    AuthPolicy, AuthResponse, AuthService, ClientInfo, LoginRequest, RegisterRequest,
    MIN_PASSWORD_LENGTH,
};
pub use token::{Claims, TokenCodec, TokenError};

#[cfg(test)]
pub(crate) use service::tests::harness as test_harness;
