#![cfg(feature = "inmem-store")]

use rbb::auth::{create_jwt, hash_password, resolve_identifier, verify_password, Credential};
use rbb::repo::inmem::InMemRepo;
use rbb::repo::UserRepo;
use serial_test::serial;

fn repo() -> InMemRepo {
    std::env::set_var("RBB_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

async fn add_user(repo: &InMemRepo, username: &str, email: &str, password: &str) -> Credential {
    repo.create_user(Credential {
        id: 0,
        username: username.into(),
        email: email.into(),
        password_digest: hash_password("pepper", password),
    })
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn identifier_resolves_by_username_then_email() {
    let r = repo();
    let alice = add_user(&r, "alice", "alice@mail.com", "pw-a").await;

    let by_name = resolve_identifier(&r, "alice").await.unwrap().unwrap();
    assert_eq!(by_name.id, alice.id);
    let by_email = resolve_identifier(&r, "alice@mail.com").await.unwrap().unwrap();
    assert_eq!(by_email.id, alice.id);

    assert!(resolve_identifier(&r, "nobody").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn identifier_matching_is_case_insensitive() {
    let r = repo();
    let alice = add_user(&r, "Alice", "Alice@Mail.com", "pw-a").await;

    for ident in ["alice", "ALICE", "alice@mail.com", "ALICE@MAIL.COM"] {
        let found = resolve_identifier(&r, ident).await.unwrap().unwrap();
        assert_eq!(found.id, alice.id, "identifier {ident:?}");
    }
}

#[tokio::test]
#[serial]
async fn username_step_wins_over_email_step() {
    let r = repo();
    // bob's username collides with carol's email local form
    let bob = add_user(&r, "carol@mail.com", "bob@mail.com", "pw-b").await;
    let carol = add_user(&r, "carol", "carol@mail.com", "pw-c").await;

    // the username index is consulted first
    let found = resolve_identifier(&r, "carol@mail.com").await.unwrap().unwrap();
    assert_eq!(found.id, bob.id);

    let found = resolve_identifier(&r, "carol").await.unwrap().unwrap();
    assert_eq!(found.id, carol.id);
}

#[tokio::test]
#[serial]
async fn password_verification_gates_token_creation() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let r = repo();
    let alice = add_user(&r, "alice", "alice@mail.com", "pw-a").await;

    assert!(verify_password(&alice.password_digest, "pw-a"));
    assert!(!verify_password(&alice.password_digest, "wrong"));

    let token = create_jwt(&alice).unwrap();
    assert_eq!(token.split('.').count(), 3);
}
