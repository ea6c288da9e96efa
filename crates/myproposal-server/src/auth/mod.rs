//! Authentication: JWT tokens, password hashing and Google OAuth.

pub mod claims;
pub mod jwt;
pub mod oauth;
pub mod password;

pub use claims::Claims;
pub use jwt::JwtManager;
pub use oauth::{GoogleOAuthClient, GoogleOAuthConfig, GoogleProfile, OAuthError};
