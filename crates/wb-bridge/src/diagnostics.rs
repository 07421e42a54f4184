//! Step-by-step connection diagnostics
//!
//! Runs the same stages a proxy bridge goes through, without launching
//! anything, and reports each one. Later stages are skipped when an
//! earlier stage they depend on failed; independent failures are all
//! reported.

use std::fmt;
use std::net::IpAddr;

use wb_core::config::BridgeConfig;
use wb_core::traits::RemoteShell;
use wb_core::ConnectionTarget;

use crate::auth::{check_key_permissions, CredentialResolver};
use crate::remote::BridgeProvisioner;
use crate::ssh::SshSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAILED",
            CheckStatus::Skipped => "skipped",
        })
    }
}

/// Outcome of one diagnostic stage
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl ToString) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            detail: detail.to_string(),
        }
    }

    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            detail: detail.into(),
        }
    }
}

/// Whether every stage passed
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.status == CheckStatus::Pass)
}

/// Hostname, key, key permissions, SSH dial, helper, control socket
pub async fn diagnose(target: &ConnectionTarget, config: &BridgeConfig) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(6);

    let resolved = check_hostname(target).await;
    let host_ok = resolved.status == CheckStatus::Pass;
    results.push(resolved);

    let resolver = CredentialResolver::from_config(config);
    let key_path = resolver
        .key_paths()
        .iter()
        .find(|path| path.is_file())
        .cloned();

    let mut key_ok = false;
    match &key_path {
        Some(path) => {
            results.push(CheckResult::pass("SSH key", path.display().to_string()));
            match check_key_permissions(path) {
                Ok(()) => {
                    key_ok = true;
                    results.push(CheckResult::pass("Key permissions", "private to owner"));
                }
                Err(e) => results.push(CheckResult::fail("Key permissions", e)),
            }
        }
        None => {
            let err = wb_core::BridgeError::NoKeyFound {
                searched: resolver.key_paths().to_vec(),
            };
            results.push(CheckResult::fail("SSH key", err));
            results.push(CheckResult::skipped("Key permissions", "no key file"));
        }
    }

    if !(host_ok && key_ok) {
        let reason = "needs a resolvable host and a usable key";
        results.push(CheckResult::skipped("SSH connection", reason));
        results.push(CheckResult::skipped("Bridging helper", reason));
        results.push(CheckResult::skipped("Control socket", reason));
        return results;
    }

    let session = match resolver.resolve() {
        Ok(credentials) => SshSession::dial(target, &credentials, config.connect_timeout).await,
        Err(e) => Err(e),
    };
    let session = match session {
        Ok(session) => {
            results.push(CheckResult::pass("SSH connection", target.to_string()));
            session
        }
        Err(e) => {
            results.push(CheckResult::fail("SSH connection", e));
            results.push(CheckResult::skipped("Bridging helper", "no SSH session"));
            results.push(CheckResult::skipped("Control socket", "no SSH session"));
            return results;
        }
    };

    let provisioner = BridgeProvisioner::new(&session, config);
    results.push(match provisioner.check_helper().await {
        Ok(()) => CheckResult::pass("Bridging helper", config.helper.clone()),
        Err(e) => CheckResult::fail("Bridging helper", e),
    });
    results.push(match provisioner.check_socket().await {
        Ok(()) => CheckResult::pass("Control socket", config.remote_socket.clone()),
        Err(e) => CheckResult::fail("Control socket", e),
    });

    if let Err(e) = session.disconnect().await {
        tracing::debug!("Disconnect after diagnostics: {}", e);
    }
    results
}

async fn check_hostname(target: &ConnectionTarget) -> CheckResult {
    const NAME: &str = "Hostname";
    if target.host.parse::<IpAddr>().is_ok() {
        return CheckResult::pass(NAME, format!("{} (IP address)", target.host));
    }
    match tokio::net::lookup_host((target.host.as_str(), target.port)).await {
        Ok(addrs) => {
            let addrs: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
            if addrs.is_empty() {
                CheckResult::fail(NAME, format!("{} resolved to no addresses", target.host))
            } else {
                CheckResult::pass(NAME, format!("{} -> {}", target.host, addrs.join(", ")))
            }
        }
        Err(e) => CheckResult::fail(
            NAME,
            wb_core::BridgeError::HostResolution {
                host: target.host.clone(),
                message: e.to_string(),
            },
        ),
    }
}
