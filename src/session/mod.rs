use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::AccountConfig;
use crate::error::LetterError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    #[default]
    Reader,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Reader => f.write_str("reader"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

pub type AuthListener = Box<dyn Fn(Option<&User>)>;

/// Authentication collaborator. Callers observe the current user and are
/// told whenever it changes.
pub trait IdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
    fn current_user(&self) -> Option<User>;
    fn on_auth_state_change(&self, listener: AuthListener);
}

/// Signs in against the `[[accounts]]` table of the config file.
pub struct LocalIdentityProvider {
    accounts: Vec<AccountConfig>,
    current: RefCell<Option<User>>,
    listeners: RefCell<Vec<AuthListener>>,
}

impl LocalIdentityProvider {
    pub fn new(accounts: Vec<AccountConfig>) -> Self {
        Self {
            accounts,
            current: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        }
    }

    fn set_current(&self, user: Option<User>) {
        self.current.replace(user.clone());
        for listener in self.listeners.borrow().iter() {
            listener(user.as_ref());
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim();
        let account = self
            .accounts
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .filter(|account| match account.password_hash.parse::<PasswordHash>() {
                Ok(hash) => hash.verify(password),
                Err(err) => {
                    tracing::warn!(email = %account.email, %err, "unusable password hash");
                    false
                }
            })
            .ok_or_else(|| {
                tracing::warn!(email, "sign-in rejected");
                AuthError::InvalidCredentials
            })?;

        let user = User {
            email: account.email.clone(),
            role: account.role,
        };
        tracing::info!(email = %user.email, role = %user.role, "signed in");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.current.borrow().as_ref() {
            tracing::info!(email = %user.email, "signed out");
        }
        self.set_current(None);
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn on_auth_state_change(&self, listener: AuthListener) {
        listener(self.current.borrow().as_ref());
        self.listeners.borrow_mut().push(listener);
    }
}

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordHashError {
    #[error("expected pbkdf2-sha256$<iterations>$<salt>$<hash>")]
    Malformed,
    #[error("unsupported password hash scheme {0:?}")]
    UnsupportedScheme(String),
}

/// Salted PBKDF2-HMAC-SHA256 digest, stored as
/// `pbkdf2-sha256$<iterations>$<base64 salt>$<base64 key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    iterations: u32,
    salt: Vec<u8>,
    key: [u8; KEY_LEN],
}

impl PasswordHash {
    /// Hashes with a fresh random salt.
    pub fn generate(password: &str, iterations: u32) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(password, &salt, iterations)
    }

    pub fn with_salt(password: &str, salt: &[u8], iterations: u32) -> Self {
        let iterations = iterations.max(1);
        Self {
            iterations,
            salt: salt.to_vec(),
            key: derive_key(password, salt, iterations),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn verify(&self, password: &str) -> bool {
        let candidate = derive_key(password, &self.salt, self.iterations);
        candidate
            .iter()
            .zip(self.key.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Display for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{HASH_SCHEME}${}${}${}",
            self.iterations,
            B64.encode(&self.salt),
            B64.encode(self.key)
        )
    }
}

impl FromStr for PasswordHash {
    type Err = PasswordHashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.trim().split('$').collect();
        let [scheme, iterations, salt, key] = parts.as_slice() else {
            return Err(PasswordHashError::Malformed);
        };
        if *scheme != HASH_SCHEME {
            return Err(PasswordHashError::UnsupportedScheme(scheme.to_string()));
        }
        let iterations = iterations
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(PasswordHashError::Malformed)?;
        let salt = B64.decode(salt).map_err(|_| PasswordHashError::Malformed)?;
        let key: [u8; KEY_LEN] = B64
            .decode(key)
            .map_err(|_| PasswordHashError::Malformed)?
            .try_into()
            .map_err(|_| PasswordHashError::Malformed)?;
        Ok(Self {
            iterations,
            salt,
            key,
        })
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn require_user<'a>(
    user: Option<&'a User>,
    action: &'static str,
) -> Result<&'a User, LetterError> {
    user.ok_or(LetterError::PermissionDenied(action))
}

pub fn require_admin<'a>(
    user: Option<&'a User>,
    action: &'static str,
) -> Result<&'a User, LetterError> {
    match user {
        Some(user) if user.is_admin() => Ok(user),
        _ => {
            tracing::warn!(action, "admin-only action refused");
            Err(LetterError::PermissionDenied(action))
        }
    }
}
