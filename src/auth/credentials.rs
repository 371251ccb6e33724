//! Credential verification, registration and bearer-token identity.

use std::sync::Arc;

use tracing::{info, warn};

use super::password::{hash_password_blocking, verify_password_blocking, PasswordPolicy};
use super::token::TokenService;
use crate::error::{AppError, StoreError};
use crate::models::{NewUser, User};
use crate::store::Store;
use crate::telemetry::{record_auth_attempt, AuthOutcome};

/// Role given to self-registered accounts.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Name of an existing organization to join.
    pub organization: Option<String>,
}

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    policy: PasswordPolicy,
    hash_cost: u32,
    default_organization_id: i32,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: TokenService,
        policy: PasswordPolicy,
        hash_cost: u32,
        default_organization_id: i32,
    ) -> Self {
        Self {
            store,
            tokens,
            policy,
            hash_cost,
            default_organization_id,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Checks the password policy and hashes off the async runtime.
    pub async fn hash_new_password(&self, password: &str) -> Result<String, AppError> {
        self.policy.validate(password)?;
        hash_password_blocking(password.to_string(), self.hash_cost).await
    }

    /// Unknown usernames and wrong passwords fail identically. A correct
    /// password on a deactivated account is `Forbidden`.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let Some(user) = self.store.find_user_by_username(username)? else {
            record_auth_attempt("login", AuthOutcome::InvalidCredentials);
            return Err(AppError::InvalidCredentials);
        };

        let verified =
            verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !verified {
            record_auth_attempt("login", AuthOutcome::InvalidCredentials);
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            record_auth_attempt("login", AuthOutcome::AccountInactive);
            warn!(user_id = user.id, "Login attempt on inactive account");
            return Err(AppError::forbidden("Account is inactive"));
        }

        record_auth_attempt("login", AuthOutcome::Success);
        info!(user_id = user.id, username = %user.username, "User logged in");
        Ok(user)
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AppError> {
        self.tokens
            .issue(&user.username)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    /// Verifies the token and loads its subject. Unknown and inactive
    /// subjects are `Unauthorized`.
    pub fn resolve_user(&self, token: &str) -> Result<User, AppError> {
        let claims = self.tokens.verify(token).map_err(|e| {
            record_auth_attempt("verify", AuthOutcome::Token(e));
            AppError::from(e)
        })?;

        match self.store.find_user_by_username(&claims.sub)? {
            Some(user) if user.is_active => Ok(user),
            Some(user) => {
                record_auth_attempt("verify", AuthOutcome::AccountInactive);
                warn!(user_id = user.id, "Token presented for inactive account");
                Err(AppError::Unauthorized(
                    "Could not validate credentials".to_string(),
                ))
            }
            None => {
                record_auth_attempt("verify", AuthOutcome::UnknownSubject);
                Err(AppError::Unauthorized(
                    "Could not validate credentials".to_string(),
                ))
            }
        }
    }

    fn registration_organization(&self, name: Option<&str>) -> Result<Option<i32>, AppError> {
        if let Some(name) = name {
            return self
                .store
                .find_organization_by_name(name)?
                .map(|org| Some(org.id))
                .ok_or_else(|| AppError::not_found("Organization not found"));
        }
        match self.store.get_organization(self.default_organization_id) {
            Ok(org) => Ok(Some(org.id)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates an active account holding the default role.
    pub async fn register(&self, registration: Registration) -> Result<User, AppError> {
        if self
            .store
            .find_user_by_username(&registration.username)?
            .is_some()
        {
            record_auth_attempt("register", AuthOutcome::Duplicate);
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        let role = self.store.find_role_by_name(DEFAULT_ROLE)?.ok_or_else(|| {
            AppError::Internal(format!("default role '{}' has not been seeded", DEFAULT_ROLE))
        })?;
        let organization_id = self.registration_organization(registration.organization.as_deref())?;

        let password_hash = self.hash_new_password(&registration.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                username: registration.username,
                email: registration.email,
                password_hash,
                role_id: Some(role.id),
                organization_id,
                is_active: true,
            })
            .map_err(|e| {
                if matches!(e, StoreError::Conflict(_)) {
                    record_auth_attempt("register", AuthOutcome::Duplicate);
                }
                AppError::from(e)
            })?;

        record_auth_attempt("register", AuthOutcome::Success);
        info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }
}
