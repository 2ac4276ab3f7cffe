//! Caller authentication and stream access tokens

mod extract;
mod tokens;

pub use extract::{AdminUser, AuthUser};
pub use tokens::{
    AccessClaims, IssuedStreamToken, JwtTokens, Role, StreamClaims, StreamTokenAuthority,
    STREAM_SCOPE,
};
