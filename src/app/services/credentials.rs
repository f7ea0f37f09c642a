// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! SSH identity used to reach the remote host: host, user and a key pair.
//!
//! Credentials are read-only once bound to a session. They can be generated,
//! persisted into a small JSON document (optionally with a passphrase
//! protecting the private key) and loaded back.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use ssh_key::private::{Ed25519Keypair, KeypairData, RsaKeypair};
use ssh_key::rand_core::OsRng;
use ssh_key::{HashAlg, LineEnding, PrivateKey};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_KEY_SUFFIX: &str = "@remote-task";
const MIN_RSA_BITS: usize = 2048;
const MAX_RSA_BITS: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Ed25519,
}

#[derive(Clone)]
pub struct Credentials {
    host: String,
    user: String,
    port: u16,
    allow_local_key_fallback: bool,
    key: Option<PrivateKey>,
}

/// On-disk form of the credentials file.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    host: String,
    user: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_fallback")]
    allow_local_key_fallback: bool,
    #[serde(default)]
    private_key: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_fallback() -> bool {
    true
}

impl Credentials {
    /// Credentials without key material; authentication relies on the user's
    /// own keys when `allow_local_key_fallback` is set.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            allow_local_key_fallback: true,
            key: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_local_key_fallback(mut self, allow: bool) -> Self {
        self.allow_local_key_fallback = allow;
        self
    }

    pub fn with_key(mut self, key: PrivateKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Generates a fresh key pair for `user@host`.
    pub fn generate(
        host: impl Into<String>,
        user: impl Into<String>,
        algorithm: KeyAlgorithm,
    ) -> AppResult<Self> {
        let host = host.into();
        let user = user.into();
        let comment = format!("{user}{DEFAULT_KEY_SUFFIX}");
        let keypair = match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
                    return Err(key_generation_error(format!(
                        "invalid RSA key length {bits}; expected {MIN_RSA_BITS}..={MAX_RSA_BITS} bits"
                    )));
                }
                let rsa = RsaKeypair::random(&mut OsRng, bits)
                    .map_err(|err| key_generation_error(format!("RSA key generation failed: {err}")))?;
                KeypairData::from(rsa)
            }
            KeyAlgorithm::Ed25519 => KeypairData::from(Ed25519Keypair::random(&mut OsRng)),
        };
        let key = PrivateKey::new(keypair, comment)
            .map_err(|err| key_generation_error(format!("failed to assemble key pair: {err}")))?;
        tracing::info!(
            "generated {} key for {user}@{host}",
            key.algorithm().as_str()
        );
        Ok(Self::new(host, user).with_key(key))
    }

    /// Loads a credentials file written by [`Credentials::persist`].
    pub fn load(path: &Path, passphrase: Option<&str>) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            credential_load_error(format!(
                "failed to read credentials file {}: {err}",
                path.display()
            ))
        })?;
        let file: CredentialsFile = serde_json::from_str(&raw).map_err(|err| {
            credential_load_error(format!(
                "corrupt credentials file {}: {err}",
                path.display()
            ))
        })?;
        let key = match file.private_key.as_deref() {
            Some(text) => Some(decode_private_key(text, passphrase)?),
            None => None,
        };
        Ok(Self {
            host: file.host,
            user: file.user,
            port: file.port,
            allow_local_key_fallback: file.allow_local_key_fallback,
            key,
        })
    }

    /// Replaces the key pair with one read from a standard OpenSSH key file.
    pub fn load_private_key_file(&mut self, path: &Path, passphrase: Option<&str>) -> AppResult<()> {
        let text = fs::read_to_string(path).map_err(|err| {
            credential_load_error(format!("failed to read key file {}: {err}", path.display()))
        })?;
        self.key = Some(decode_private_key(&text, passphrase)?);
        Ok(())
    }

    /// Writes the credentials file. The private key is included only when
    /// asked, encrypted if a passphrase is given; the file is then
    /// restricted to its owner.
    pub fn persist(
        &self,
        path: &Path,
        include_private: bool,
        passphrase: Option<&str>,
    ) -> AppResult<()> {
        let private_key = if include_private {
            match &self.key {
                Some(key) => Some(encode_private_key(key, passphrase)?),
                None => None,
            }
        } else {
            None
        };
        let has_private = private_key.is_some();
        let file = CredentialsFile {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
            allow_local_key_fallback: self.allow_local_key_fallback,
            private_key,
        };
        let body = serde_json::to_string_pretty(&file).map_err(|err| {
            AppError::local_io(format!("failed to encode credentials: {err}"))
        })?;
        write_file(path, body.as_bytes(), has_private)
    }

    /// Writes the private key alone in OpenSSH format, readable only by its owner.
    pub fn write_private_key(&self, path: &Path, passphrase: Option<&str>) -> AppResult<()> {
        let key = self.require_key()?;
        let text = encode_private_key(key, passphrase)?;
        write_file(path, text.as_bytes(), true)
    }

    pub fn write_public_key(&self, path: &Path) -> AppResult<()> {
        let line = self.public_key_line(DEFAULT_KEY_SUFFIX)?;
        write_file(path, line.as_bytes(), false)
    }

    /// `authorized_keys` line: algorithm, base64 blob and `<user><suffix>`.
    pub fn public_key_line(&self, suffix: &str) -> AppResult<String> {
        let key = self.require_key()?;
        let public = key.public_key().key_data();
        let encoded = ssh_key::PublicKey::new(public.clone(), format!("{}{suffix}", self.user))
            .to_openssh()
            .map_err(|err| AppError::invalid_argument(format!("failed to encode public key: {err}")))?;
        Ok(format!("{encoded}\n"))
    }

    /// Unencrypted OpenSSH text of the private key.
    pub fn private_key_openssh(&self) -> AppResult<String> {
        let key = self.require_key()?;
        encode_private_key(key, None)
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.key
            .as_ref()
            .map(|key| key.public_key().fingerprint(HashAlg::Sha256).to_string())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn allow_local_key_fallback(&self) -> bool {
        self.allow_local_key_fallback
    }

    pub fn key(&self) -> Option<&PrivateKey> {
        self.key.as_ref()
    }

    fn require_key(&self) -> AppResult<&PrivateKey> {
        self.key.as_ref().ok_or_else(|| {
            AppError::invalid_argument(format!(
                "credentials for {}@{} carry no key pair",
                self.user, self.host
            ))
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("allow_local_key_fallback", &self.allow_local_key_fallback)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn decode_private_key(text: &str, passphrase: Option<&str>) -> AppResult<PrivateKey> {
    let key = PrivateKey::from_openssh(text)
        .map_err(|err| credential_load_error(format!("invalid private key: {err}")))?;
    if !key.is_encrypted() {
        return Ok(key);
    }
    let Some(passphrase) = passphrase else {
        return Err(credential_load_error(
            "private key is encrypted and no passphrase was given",
        ));
    };
    key.decrypt(passphrase)
        .map_err(|_| credential_load_error("wrong passphrase for private key"))
}

fn encode_private_key(key: &PrivateKey, passphrase: Option<&str>) -> AppResult<String> {
    let key = match passphrase {
        Some(passphrase) => key
            .encrypt(&mut OsRng, passphrase)
            .map_err(|err| AppError::local_io(format!("failed to encrypt private key: {err}")))?,
        None => key.clone(),
    };
    let text = key
        .to_openssh(LineEnding::LF)
        .map_err(|err| AppError::local_io(format!("failed to encode private key: {err}")))?;
    Ok(text.to_string())
}

fn write_file(path: &Path, contents: &[u8], owner_only: bool) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::local_io(format!("failed to create {}: {err}", parent.display()))
        })?;
    }
    fs::write(path, contents)
        .map_err(|err| AppError::local_io(format!("failed to write {}: {err}", path.display())))?;
    if owner_only {
        restrict_to_owner(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|err| {
        AppError::local_io(format!(
            "failed to restrict permissions on {}: {err}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> AppResult<()> {
    Ok(())
}

fn key_generation_error(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::KeyGeneration,
        codes::KEY_GENERATION_ERROR,
        message,
    )
}

fn credential_load_error(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::CredentialLoad,
        codes::CREDENTIAL_LOAD_ERROR,
        message,
    )
}
