// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use russh::client::{AuthResult, Handle};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};

use crate::app::services::credentials::Credentials;

use super::connection::ClientHandler;
use super::error::{AuthenticationFailure, NoIdentity};

/// Default identity files tried, in order, when local keys are allowed.
const LOCAL_KEY_FILES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

enum AuthDecision {
    Success,
    Failure,
}

fn auth_decision(result: AuthResult) -> AuthDecision {
    match result {
        AuthResult::Success => AuthDecision::Success,
        AuthResult::Failure { .. } => AuthDecision::Failure,
    }
}

fn local_key_paths(home: &Path) -> Vec<PathBuf> {
    let ssh_dir = home.join(".ssh");
    LOCAL_KEY_FILES
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Keys to offer: the credential's own key first, then the user's local
/// identities when the credentials allow it. Unreadable or encrypted local
/// keys are skipped.
fn identities(credentials: &Credentials) -> Result<Vec<(String, PrivateKey)>> {
    let mut keys = Vec::new();
    if credentials.key().is_some() {
        let pem = credentials.private_key_openssh()?;
        let key = russh::keys::decode_secret_key(&pem, None)?;
        keys.push(("credential key".to_string(), key));
    }
    if credentials.allow_local_key_fallback()
        && let Some(home) = dirs::home_dir()
    {
        for path in local_key_paths(&home) {
            match russh::keys::load_secret_key(&path, None) {
                Ok(key) => keys.push((path.display().to_string(), key)),
                Err(err) => log::debug!("skipping {}: {err}", path.display()),
            }
        }
    }
    Ok(keys)
}

pub(super) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    credentials: &Credentials,
) -> Result<()> {
    let keys = identities(credentials)?;
    if keys.is_empty() {
        return Err(NoIdentity {
            user: credentials.user().to_string(),
            host: credentials.host().to_string(),
        }
        .into());
    }
    // Prefer SHA-256 for RSA if applicable (ignored for non-RSA keys)
    let rsa_hash = handle.best_supported_rsa_hash().await?.flatten();
    for (label, key) in keys {
        let offered = PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash);
        let result = handle
            .authenticate_publickey(credentials.user(), offered)
            .await?;
        match auth_decision(result) {
            AuthDecision::Success => {
                log::debug!("authenticated {} with {label}", credentials.user());
                return Ok(());
            }
            AuthDecision::Failure => log::debug!("{label} rejected"),
        }
    }
    Err(AuthenticationFailure.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::credentials::KeyAlgorithm;
    use russh::{MethodKind, MethodSet};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn only_full_success_authenticates() {
        assert!(matches!(
            auth_decision(AuthResult::Success),
            AuthDecision::Success
        ));
        let methods = [MethodKind::KeyboardInteractive];
        let decision = auth_decision(AuthResult::Failure {
            remaining_methods: MethodSet::from(methods.as_slice()),
            partial_success: true,
        });
        assert!(matches!(decision, AuthDecision::Failure));
    }

    #[test]
    fn local_keys_follow_preference_order() {
        let home = TempDir::new().unwrap();
        let ssh_dir = home.path().join(".ssh");
        fs::create_dir(&ssh_dir).unwrap();
        fs::write(ssh_dir.join("id_rsa"), "x").unwrap();
        fs::write(ssh_dir.join("id_ed25519"), "x").unwrap();
        fs::write(ssh_dir.join("config"), "x").unwrap();
        let paths = local_key_paths(home.path());
        assert_eq!(
            paths,
            vec![ssh_dir.join("id_ed25519"), ssh_dir.join("id_rsa")]
        );
    }

    #[test]
    fn credential_key_is_offered_without_fallback() {
        let creds = Credentials::generate("login1", "alice", KeyAlgorithm::Ed25519)
            .unwrap()
            .with_local_key_fallback(false);
        let keys = identities(&creds).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "credential key");

        let bare = Credentials::new("login1", "alice").with_local_key_fallback(false);
        assert!(identities(&bare).unwrap().is_empty());
    }
}
