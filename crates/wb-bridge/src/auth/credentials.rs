//! Private key lookup and host-key policy

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh_keys::key::KeyPair;
use wb_core::config::BridgeConfig;
use wb_core::BridgeError;

/// Key files tried when no explicit list is configured, in order
const DEFAULT_KEY_NAMES: &[&str] = &["id_rsa", "id_ed25519", "id_ecdsa"];

/// How the server's host key is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Reject keys that are unknown or differ from the known_hosts entry
    Strict { known_hosts: PathBuf },
    /// Accept any key
    InsecureAccept,
}

/// Material needed to authenticate, immutable once resolved
#[derive(Clone)]
pub struct Credentials {
    pub private_key_path: PathBuf,
    pub key: Arc<KeyPair>,
    pub host_key_policy: HostKeyPolicy,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key_path", &self.private_key_path)
            .field("host_key_policy", &self.host_key_policy)
            .finish_non_exhaustive()
    }
}

fn ssh_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
}

/// `~/.ssh/id_rsa`, `~/.ssh/id_ed25519`, `~/.ssh/id_ecdsa`
pub fn default_key_paths() -> Vec<PathBuf> {
    let dir = ssh_dir();
    DEFAULT_KEY_NAMES.iter().map(|name| dir.join(name)).collect()
}

/// `~/.ssh/known_hosts`
pub fn default_known_hosts_path() -> PathBuf {
    ssh_dir().join("known_hosts")
}

/// Fail when the key file is readable or writable by group or others
#[cfg(unix)]
pub fn check_key_permissions(path: &Path) -> Result<(), BridgeError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(BridgeError::KeyPermission {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

/// Permission bits are not meaningful here; always passes
#[cfg(not(unix))]
pub fn check_key_permissions(_path: &Path) -> Result<(), BridgeError> {
    Ok(())
}

/// Finds the private key and decides the host-key policy
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    key_paths: Vec<PathBuf>,
    known_hosts: PathBuf,
    insecure_host_key: bool,
}

impl CredentialResolver {
    pub fn new(key_paths: Vec<PathBuf>, known_hosts: PathBuf, insecure_host_key: bool) -> Self {
        Self {
            key_paths,
            known_hosts,
            insecure_host_key,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.key_paths.clone().unwrap_or_else(default_key_paths),
            config
                .known_hosts_path
                .clone()
                .unwrap_or_else(default_known_hosts_path),
            config.insecure_host_key,
        )
    }

    /// Paths searched, in order
    pub fn key_paths(&self) -> &[PathBuf] {
        &self.key_paths
    }

    /// First existing key file, after the permission check
    pub fn locate_key(&self) -> Result<PathBuf, BridgeError> {
        let found = self
            .key_paths
            .iter()
            .find(|path| path.is_file())
            .ok_or_else(|| BridgeError::NoKeyFound {
                searched: self.key_paths.clone(),
            })?;

        check_key_permissions(found)?;
        tracing::debug!("Using SSH key {:?}", found);
        Ok(found.clone())
    }

    /// Strict when a known_hosts file exists, unless overridden
    pub fn host_key_policy(&self) -> HostKeyPolicy {
        if self.insecure_host_key {
            tracing::warn!("Host key verification disabled by configuration");
            return HostKeyPolicy::InsecureAccept;
        }
        if self.known_hosts.is_file() {
            HostKeyPolicy::Strict {
                known_hosts: self.known_hosts.clone(),
            }
        } else {
            tracing::warn!(
                "No known_hosts file at {:?}; accepting any host key",
                self.known_hosts
            );
            HostKeyPolicy::InsecureAccept
        }
    }

    /// Locate, check and decode the key
    pub fn resolve(&self) -> Result<Credentials, BridgeError> {
        let path = self.locate_key()?;
        let key = russh_keys::load_secret_key(&path, None).map_err(|e| BridgeError::KeyLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(Credentials {
            private_key_path: path,
            key: Arc::new(key),
            host_key_policy: self.host_key_policy(),
        })
    }
}
