use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// An authenticated user, as seen by the rest of the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A bearer token bound to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub identity: Identity,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<AuthSession>;
    async fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession>;
    async fn resolve(&self, token: &str) -> AuthResult<Identity>;
    async fn sign_out(&self, token: &str) -> AuthResult<()>;
    async fn update_profile(&self, user_id: &str, display_name: &str) -> AuthResult<Identity>;
}

struct Account {
    identity: Identity,
    salt: String,
    password_hash: String,
}

/// Accounts and tokens kept in process memory.
pub struct InMemoryIdentityProvider {
    accounts: DashMap<String, Account>,
    emails: DashMap<String, String>,
    tokens: DashMap<String, String>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            emails: DashMap::new(),
            tokens: DashMap::new(),
        }
    }

    fn issue_token(&self, identity: Identity) -> AuthSession {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), identity.user_id.clone());
        AuthSession { token, identity }
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<AuthSession> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword(MIN_PASSWORD_LENGTH));
        }

        let user_id = Uuid::new_v4().simple().to_string();
        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => return Err(AuthError::EmailInUse),
            Entry::Vacant(slot) => {
                slot.insert(user_id.clone());
            }
        }

        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };
        let identity = Identity {
            user_id: user_id.clone(),
            email,
            display_name,
            created_at: Utc::now(),
        };
        let salt = Uuid::new_v4().simple().to_string();
        self.accounts.insert(
            user_id.clone(),
            Account {
                identity: identity.clone(),
                password_hash: hash_password(&salt, password),
                salt,
            },
        );

        info!(user_id = %user_id, "Account registered");
        Ok(self.issue_token(identity))
    }

    async fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user_id = self
            .emails
            .get(&email)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredentials)?;

        let identity = {
            let account = self
                .accounts
                .get(&user_id)
                .ok_or(AuthError::InvalidCredentials)?;
            if hash_password(&account.salt, password) != account.password_hash {
                return Err(AuthError::InvalidCredentials);
            }
            account.identity.clone()
        };

        info!(user_id = %user_id, "Signed in");
        Ok(self.issue_token(identity))
    }

    async fn resolve(&self, token: &str) -> AuthResult<Identity> {
        let user_id = self
            .tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::Unauthenticated)?;
        self.accounts
            .get(&user_id)
            .map(|account| account.identity.clone())
            .ok_or(AuthError::Unauthenticated)
    }

    async fn sign_out(&self, token: &str) -> AuthResult<()> {
        self.tokens
            .remove(token)
            .map(|_| ())
            .ok_or(AuthError::Unauthenticated)
    }

    async fn update_profile(&self, user_id: &str, display_name: &str) -> AuthResult<Identity> {
        let mut account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))?;
        account.identity.display_name = display_name.trim().to_string();
        Ok(account.identity.clone())
    }
}
