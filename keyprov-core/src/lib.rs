use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdent {
    pub name: String,
    pub email: String,
}

/// Identity metadata parsed out of a private key blob. Derived purely from
/// the key material; never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyIdentity {
    /// Full 40-hex-char fingerprint of the primary key, uppercase.
    pub fingerprint: String,
    /// 16-hex-char key id, uppercase. This is the id of the dedicated
    /// encryption-capable subkey when the key has one, else the primary
    /// key id (a signing-only key has no encryption subkey to prefer).
    pub key_id: String,
    pub primary_uid: UserIdent,
    /// All user identities, in declaration order.
    pub user_ids: Vec<UserIdent>,
    pub created_at: DateTime<Utc>,
}

/// Settings written verbatim into gpg-agent.conf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub default_cache_ttl: u64,
    pub max_cache_ttl: u64,
    pub allow_preset_passphrase: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl: 7200,
            max_cache_ttl: 31_536_000,
            allow_preset_passphrase: true,
        }
    }
}

impl AgentConfig {
    pub fn render(&self) -> String {
        let mut out = format!(
            "default-cache-ttl {}\nmax-cache-ttl {}\n",
            self.default_cache_ttl, self.max_cache_ttl
        );
        if self.allow_preset_passphrase {
            out.push_str("allow-preset-passphrase\n");
        }
        out
    }
}

/// Owner-trust codes as gpg's interactive trust menu numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    Unknown,
    Never,
    Marginal,
    Full,
    Ultimate,
}

impl TrustLevel {
    pub fn as_menu_code(self) -> &'static str {
        match self {
            TrustLevel::Unknown => "1",
            TrustLevel::Never => "2",
            TrustLevel::Marginal => "3",
            TrustLevel::Full => "4",
            TrustLevel::Ultimate => "5",
        }
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "unknown" => Ok(TrustLevel::Unknown),
            "2" | "never" => Ok(TrustLevel::Never),
            "3" | "marginal" => Ok(TrustLevel::Marginal),
            "4" | "full" => Ok(TrustLevel::Full),
            "5" | "ultimate" => Ok(TrustLevel::Ultimate),
            other => Err(format!(
                "invalid trust level {other:?}; expected 1-5 or unknown/never/marginal/full/ultimate"
            )),
        }
    }
}

/// The one piece of state threaded from the setup phase to the later
/// cleanup invocation. Written once, read once, never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandoff {
    pub fingerprint: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStage {
    Secret,
    Public,
}

impl DeletionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionStage::Secret => "secret",
            DeletionStage::Public => "public",
        }
    }
}

#[derive(Debug)]
pub enum ProvisionError {
    MalformedKey(String),
    NoUserIdentity,
    Import { exit_code: i32, stderr: String },
    KeygripNotFound(String),
    AgentConfig(String),
    AgentProtocol(String),
    PresetPassphrase(String),
    TrustAdjust(String),
    KeyDeletion { stage: DeletionStage, stderr: String },
    Gpg(String),
    Io(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::MalformedKey(msg) => write!(f, "malformed key: {msg}"),
            ProvisionError::NoUserIdentity => write!(f, "key carries no user identity"),
            ProvisionError::Import { exit_code, stderr } => {
                write!(f, "import failed (exit {exit_code}): {stderr}")
            }
            ProvisionError::KeygripNotFound(fingerprint) => {
                write!(f, "no keygrip found for fingerprint {fingerprint}")
            }
            ProvisionError::AgentConfig(msg) => write!(f, "agent configuration failed: {msg}"),
            ProvisionError::AgentProtocol(msg) => write!(f, "agent protocol error: {msg}"),
            ProvisionError::PresetPassphrase(msg) => write!(f, "preset passphrase failed: {msg}"),
            ProvisionError::TrustAdjust(msg) => write!(f, "trust adjustment failed: {msg}"),
            ProvisionError::KeyDeletion { stage, stderr } => {
                write!(f, "{} key deletion failed: {stderr}", stage.as_str())
            }
            ProvisionError::Gpg(msg) => write!(f, "gpg error: {msg}"),
            ProvisionError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for ProvisionError {}
