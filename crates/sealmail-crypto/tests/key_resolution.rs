//! Address key passphrase derivation and key ring resolution.

use sealmail_crypto::{
    AddressKey, AddressKeyRing, CipherText, Error, KeyCandidate, MemoryKeyStore, Passphrase,
    TokenSignaturePolicy, UserKey, check_passphrase, derive_address_passphrase,
};
use sealmail_test_utils::{FakePgp, encrypt, init_tracing, private_key, sign_detached};

const MAILBOX: &str = "mailbox-secret";
const TOKEN: &[u8] = b"3f9a1c7e5b2d4068";

fn user_key(id: &str, passphrase: &str, active: bool, priority: u32) -> UserKey {
    UserKey {
        id: id.to_string(),
        private_key: private_key(id, passphrase),
        active,
        priority,
    }
}

fn address_key(id: &str, token_to: Option<&str>, active: bool, priority: u32) -> AddressKey {
    let passphrase = if token_to.is_some() {
        String::from_utf8_lossy(TOKEN).into_owned()
    } else {
        MAILBOX.to_string()
    };
    AddressKey {
        id: id.to_string(),
        private_key: private_key(id, &passphrase),
        token: token_to.map(|user| encrypt(user, TOKEN)),
        signature: token_to.map(|user| sign_detached(user, TOKEN)),
        active,
        priority,
    }
}

#[test]
fn test_derive_passphrase_returns_token() {
    init_tracing();
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];
    let token = encrypt("u1", TOKEN);
    let signature = sign_detached("u1", TOKEN);

    let passphrase = derive_address_passphrase(
        &backend,
        &Passphrase::from(MAILBOX),
        &token,
        Some(&signature),
        &users,
        TokenSignaturePolicy::Require,
    )
    .unwrap();

    assert_eq!(passphrase.as_bytes(), TOKEN);
}

#[test]
fn test_malformed_token_yields_none() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];

    let result = derive_address_passphrase(
        &backend,
        &Passphrase::from(MAILBOX),
        &CipherText::new("definitely not armored"),
        None,
        &users,
        TokenSignaturePolicy::Tolerate,
    );
    assert!(result.is_none());
    assert_eq!(backend.decrypt_calls(), 0);
}

#[test]
fn test_wrong_mailbox_passphrase_yields_none() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];

    let result = derive_address_passphrase(
        &backend,
        &Passphrase::from("wrong"),
        &encrypt("u1", TOKEN),
        None,
        &users,
        TokenSignaturePolicy::Tolerate,
    );
    assert!(result.is_none());
}

#[test]
fn test_token_decrypted_by_inactive_user_key() {
    let backend = FakePgp::new();
    let users = [
        user_key("new", MAILBOX, true, 0),
        user_key("old", MAILBOX, false, 0),
    ];

    let passphrase = derive_address_passphrase(
        &backend,
        &Passphrase::from(MAILBOX),
        &encrypt("old", TOKEN),
        Some(&sign_detached("old", TOKEN)),
        &users,
        TokenSignaturePolicy::Require,
    );
    assert_eq!(passphrase.unwrap().as_bytes(), TOKEN);
    assert_eq!(backend.decrypt_calls(), 2);
}

#[test]
fn test_bad_token_signature_policy() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];
    let token = encrypt("u1", TOKEN);
    let forged = sign_detached("stranger", TOKEN);
    let mailbox = Passphrase::from(MAILBOX);

    let tolerated = derive_address_passphrase(
        &backend,
        &mailbox,
        &token,
        Some(&forged),
        &users,
        TokenSignaturePolicy::Tolerate,
    );
    assert_eq!(tolerated.unwrap().as_bytes(), TOKEN);

    let required = derive_address_passphrase(
        &backend,
        &mailbox,
        &token,
        Some(&forged),
        &users,
        TokenSignaturePolicy::Require,
    );
    assert!(required.is_none());

    let unsigned = derive_address_passphrase(
        &backend,
        &mailbox,
        &token,
        None,
        &users,
        TokenSignaturePolicy::Require,
    );
    assert!(unsigned.is_none());
}

#[test]
fn test_check_passphrase() {
    let backend = FakePgp::new();
    let key = private_key("k", "correct");
    assert!(check_passphrase(&backend, &key, &Passphrase::from("correct")));
    assert!(!check_passphrase(&backend, &key, &Passphrase::from("wrong")));
}

#[test]
fn test_resolve_orders_and_unlocks() {
    init_tracing();
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];
    let address_keys = vec![
        address_key("rotated", Some("u1"), false, 0),
        address_key("secondary", Some("u1"), true, 1),
        address_key("primary", Some("u1"), true, 0),
    ];

    let ring = AddressKeyRing::resolve(
        &backend,
        &Passphrase::from(MAILBOX),
        &users,
        address_keys,
        TokenSignaturePolicy::Require,
    )
    .unwrap();

    let ids: Vec<_> = ring
        .candidates()
        .iter()
        .map(|c| c.key().key_id.as_str())
        .collect();
    assert_eq!(ids, ["primary", "secondary", "rotated"]);
    assert!(matches!(ring.candidates()[2], KeyCandidate::Inactive(_)));
    assert_eq!(ring.candidates()[0].key().passphrase.as_bytes(), TOKEN);
}

#[test]
fn test_resolve_legacy_key_uses_mailbox_passphrase() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];

    let ring = AddressKeyRing::resolve(
        &backend,
        &Passphrase::from(MAILBOX),
        &users,
        vec![address_key("legacy", None, true, 0)],
        TokenSignaturePolicy::default(),
    )
    .unwrap();

    assert_eq!(ring.len(), 1);
    assert_eq!(
        ring.candidates()[0].key().passphrase.as_bytes(),
        MAILBOX.as_bytes()
    );
}

#[test]
fn test_resolve_skips_unusable_keys() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];
    let address_keys = vec![
        address_key("foreign", Some("someone-else"), true, 0),
        address_key("usable", Some("u1"), false, 0),
    ];

    let ring = AddressKeyRing::resolve(
        &backend,
        &Passphrase::from(MAILBOX),
        &users,
        address_keys,
        TokenSignaturePolicy::Tolerate,
    )
    .unwrap();
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.candidates()[0].key().key_id, "usable");
}

#[test]
fn test_resolve_errors() {
    let backend = FakePgp::new();
    let users = [user_key("u1", MAILBOX, true, 0)];
    let mailbox = Passphrase::from(MAILBOX);

    let empty = AddressKeyRing::resolve(&backend, &mailbox, &users, Vec::new(), TokenSignaturePolicy::Tolerate);
    assert!(matches!(empty, Err(Error::NoKeys(_))));

    let locked = AddressKeyRing::resolve(
        &backend,
        &mailbox,
        &users,
        vec![address_key("foreign", Some("someone-else"), true, 0)],
        TokenSignaturePolicy::Tolerate,
    );
    assert!(matches!(
        locked,
        Err(Error::PassphraseDerivationFailed { key_id }) if key_id == "foreign"
    ));
}

#[test]
fn test_resolve_from_store() {
    let backend = FakePgp::new();
    let store = MemoryKeyStore::new()
        .with_user_key(user_key("u1", MAILBOX, true, 0))
        .with_address_key("addr-1", address_key("a1", Some("u1"), true, 0));
    let mailbox = Passphrase::from(MAILBOX);

    let ring = AddressKeyRing::from_store(
        &backend,
        &store,
        "addr-1",
        &mailbox,
        TokenSignaturePolicy::Require,
    )
    .unwrap();
    assert_eq!(ring.len(), 1);

    let missing = AddressKeyRing::from_store(
        &backend,
        &store,
        "addr-2",
        &mailbox,
        TokenSignaturePolicy::Require,
    );
    assert!(matches!(missing, Err(Error::NoKeys(id)) if id == "addr-2"));
}
