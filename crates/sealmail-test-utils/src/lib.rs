//! # sealmail-test-utils
//!
//! Deterministic OpenPGP stand-in shared by the sealmail test suites.
//!
//! Keys, messages and signatures are plain text inside real armor lines:
//!
//! - private key: `FAKEKEY:<id>:<passphrase>`
//! - public key: `FAKEPUB:<id>`
//! - message: armored block with `to=`, optional `signer=` / `created=`, and
//!   hex `data=` lines
//! - detached signature: armored block with `signer=` and hex `data=` lines

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use sealmail_crypto::{
    BackendError, BackendErrorKind, CipherText, Decrypted, OpenPgp, Passphrase, RawSignature,
};

/// Fake backend that counts decryption attempts.
#[derive(Debug, Default)]
pub struct FakePgp {
    decrypt_calls: AtomicUsize,
}

impl FakePgp {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `decrypt` calls so far.
    #[must_use]
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

/// Private key `id` locked with `passphrase`.
#[must_use]
pub fn private_key(id: &str, passphrase: &str) -> String {
    format!("FAKEKEY:{id}:{passphrase}")
}

/// Public half of key `id`.
#[must_use]
pub fn public_key(id: &str) -> String {
    format!("FAKEPUB:{id}")
}

/// Unsigned message for key `to`.
#[must_use]
pub fn encrypt(to: &str, data: &[u8]) -> CipherText {
    armor("MESSAGE", &[("to", to.to_string()), ("data", hex(data))])
}

/// Message for key `to`, signed by `signer` at unix time `created`.
#[must_use]
pub fn encrypt_signed(to: &str, signer: &str, created: i64, data: &[u8]) -> CipherText {
    armor(
        "MESSAGE",
        &[
            ("to", to.to_string()),
            ("signer", signer.to_string()),
            ("created", created.to_string()),
            ("data", hex(data)),
        ],
    )
}

/// Detached signature by `signer` over `data`.
#[must_use]
pub fn sign_detached(signer: &str, data: &[u8]) -> CipherText {
    armor(
        "SIGNATURE",
        &[("signer", signer.to_string()), ("data", hex(data))],
    )
}

/// Routes tracing output to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn armor(kind: &str, fields: &[(&str, String)]) -> CipherText {
    let mut text = format!("-----BEGIN PGP {kind}-----\n\n");
    for (name, value) in fields {
        let _ = writeln!(text, "{name}={value}");
    }
    let _ = writeln!(text, "-----END PGP {kind}-----");
    CipherText::new(text)
}

fn hex(data: &[u8]) -> String {
    data.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

fn field<'a>(armored: &'a str, name: &str) -> Option<&'a str> {
    armored
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
}

fn parse_private(armored: &str) -> Option<(&str, &str)> {
    let rest = armored.strip_prefix("FAKEKEY:")?;
    rest.split_once(':')
}

fn key_id(armored: &str) -> Option<&str> {
    parse_private(armored)
        .map(|(id, _)| id)
        .or_else(|| armored.strip_prefix("FAKEPUB:"))
}

fn signed_by_any(signer: &str, keys: &[String]) -> bool {
    keys.iter().any(|key| key_id(key) == Some(signer))
}

impl OpenPgp for FakePgp {
    fn check_passphrase(&self, private_key: &str, passphrase: &Passphrase) -> bool {
        parse_private(private_key)
            .is_some_and(|(_, expected)| expected.as_bytes() == passphrase.as_bytes())
    }

    fn decrypt(
        &self,
        message: &CipherText,
        private_key: &str,
        passphrase: &Passphrase,
        verification_keys: &[String],
    ) -> Result<Decrypted, BackendError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);

        let armored = message.as_str();
        if !armored.starts_with("-----BEGIN PGP MESSAGE-----") {
            return Err(BackendError::malformed("missing armor"));
        }
        let recipient =
            field(armored, "to").ok_or_else(|| BackendError::malformed("no recipient"))?;
        let data = field(armored, "data")
            .and_then(unhex)
            .ok_or_else(|| BackendError::malformed("bad data"))?;

        let (id, expected) = parse_private(private_key)
            .ok_or_else(|| BackendError::new(BackendErrorKind::Other, "bad key"))?;
        if expected.as_bytes() != passphrase.as_bytes() {
            return Err(BackendError::new(
                BackendErrorKind::Locked,
                "wrong passphrase",
            ));
        }
        if id != recipient {
            return Err(BackendError::new(
                BackendErrorKind::NoMatchingKey,
                "not a recipient",
            ));
        }

        let signature = match field(armored, "signer") {
            None => RawSignature::Absent,
            Some(_) if verification_keys.is_empty() => RawSignature::Unchecked,
            Some(signer) if signed_by_any(signer, verification_keys) => RawSignature::Verified {
                created: field(armored, "created")
                    .and_then(|secs| secs.parse().ok())
                    .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
            },
            Some(signer) => RawSignature::Mismatch(format!("unknown signer {signer}")),
        };

        Ok(Decrypted { data, signature })
    }

    fn verify_detached(
        &self,
        data: &[u8],
        signature: &CipherText,
        keys: &[String],
    ) -> Result<bool, BackendError> {
        let armored = signature.as_str();
        if !armored.starts_with("-----BEGIN PGP SIGNATURE-----") {
            return Err(BackendError::malformed("missing armor"));
        }
        let signer =
            field(armored, "signer").ok_or_else(|| BackendError::malformed("no signer"))?;
        let signed = field(armored, "data").and_then(unhex);
        Ok(signed.as_deref() == Some(data) && signed_by_any(signer, keys))
    }
}
