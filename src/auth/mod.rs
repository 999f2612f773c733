//! Credentials and the signed session cookie
//!
//! - [`credentials`]: registered users, Argon2id password and secret-answer hashes
//! - [`cookie`]: HMAC-signed `{u, key}` cookie payload
//! - [`password`]: hashing primitives shared by both, plus session token minting

pub mod cookie;
pub mod credentials;
pub mod password;

pub use cookie::{CookieCodec, SessionCookie};
pub use credentials::{CredentialStore, NewUser};
