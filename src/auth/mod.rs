//! Authentication: password hashing, bearer tokens and credential checks.

pub mod credentials;
pub mod password;
pub mod token;

pub use credentials::{CredentialService, Registration, DEFAULT_ROLE};
pub use password::{PasswordPolicy, PasswordService};
pub use token::{TokenClaims, TokenService};
