//! Account storage for the login flow.
//!
//! Passwords are stored as argon2 PHC strings. A store opened on a path
//! rewrites the whole TOML file after every new account; without a path it
//! lives only as long as the process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const MAX_NAME_LEN: usize = 16;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("user names are 1 to 16 visible characters")]
    InvalidName,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("e-mail address is longer than 254 characters")]
    InvalidEmail,
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file is not valid toml: {0}")]
    Decode(#[from] toml::de::Error),
    #[error("failed to encode credentials: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// The operations the login flow needs from an account backend.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, name: &str, password: &str) -> bool;
    fn user_exists(&self, name: &str) -> bool;
    fn create_user(&self, name: &str, password: &str, email: &str) -> Result<(), CredentialError>;
}

/// Argon2id cost parameters for new hashes. Existing hashes carry their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// The cheapest parameters argon2 accepts. Only for tests.
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn params(self) -> Result<Params, CredentialError> {
        ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .build()
            .map_err(|err| CredentialError::Hash(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    password_hash: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
}

pub struct CredentialStore {
    users: RwLock<BTreeMap<String, UserRecord>>,
    path: Option<PathBuf>,
    argon: Argon2<'static>,
}

impl CredentialStore {
    pub fn in_memory() -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
            path: None,
            argon: Argon2::default(),
        }
    }

    /// Load accounts from `path`, starting empty if the file does not exist
    /// yet. New accounts are written back to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        let file = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str::<CredentialFile>(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CredentialFile::default(),
            Err(source) => return Err(CredentialError::Io { path, source }),
        };
        info!(
            target: "mmorogue::auth",
            path = %path.display(),
            users = file.users.len(),
            "credential store opened"
        );
        Ok(Self {
            users: RwLock::new(file.users),
            path: Some(path),
            argon: Argon2::default(),
        })
    }

    pub fn with_cost(mut self, cost: HashCost) -> Result<Self, CredentialError> {
        self.argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, cost.params()?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| CredentialError::Hash(err.to_string()))
    }

    fn persist(&self, users: &BTreeMap<String, UserRecord>) -> Result<(), CredentialError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CredentialFile {
            users: users.clone(),
        };
        let text = toml::to_string_pretty(&file)?;
        let staging = path.with_extension("toml.tmp");
        let io_err = |source| CredentialError::Io {
            path: path.clone(),
            source,
        };
        std::fs::write(&staging, text).map_err(io_err)?;
        std::fs::rename(&staging, path).map_err(io_err)?;
        Ok(())
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && name.bytes().all(|b| b.is_ascii_graphic())
}

impl Authenticator for CredentialStore {
    fn authenticate(&self, name: &str, password: &str) -> bool {
        let Some(stored) = self
            .users
            .read()
            .get(name)
            .map(|record| record.password_hash.clone())
        else {
            return false;
        };
        let parsed = match PasswordHash::new(&stored) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(target: "mmorogue::auth", user = name, error = %err, "stored hash unreadable");
                return false;
            }
        };
        self.argon
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    fn user_exists(&self, name: &str) -> bool {
        self.users.read().contains_key(name)
    }

    fn create_user(&self, name: &str, password: &str, email: &str) -> Result<(), CredentialError> {
        if !valid_name(name) {
            return Err(CredentialError::InvalidName);
        }
        if password.is_empty() {
            return Err(CredentialError::EmptyPassword);
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(CredentialError::InvalidEmail);
        }
        if self.user_exists(name) {
            return Err(CredentialError::UserExists(name.to_string()));
        }

        let record = UserRecord {
            password_hash: self.hash(password)?,
            email: email.to_string(),
        };

        let mut users = self.users.write();
        if users.contains_key(name) {
            return Err(CredentialError::UserExists(name.to_string()));
        }
        users.insert(name.to_string(), record);
        if let Err(err) = self.persist(&users) {
            users.remove(name);
            return Err(err);
        }
        info!(target: "mmorogue::auth", user = name, "account created");
        Ok(())
    }
}
