//! Credential discovery for SSH public-key authentication

mod credentials;

pub use credentials::{
    check_key_permissions, default_key_paths, default_known_hosts_path, CredentialResolver,
    Credentials, HostKeyPolicy,
};
