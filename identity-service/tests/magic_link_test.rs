//! Magic link round trips: purpose preservation, single use, expiry.

mod common;

use chrono::{Duration, Utc};
use common::{TestApp, TEST_PASSWORD};
use identity_service::models::{MagicLink, MagicLinkPurpose};
use identity_service::utils;

#[tokio::test]
async fn round_trip_preserves_purpose() {
    let app = TestApp::new();
    app.seed_user("linked@example.com").await;

    let (_, raw_token) = app
        .state
        .credentials
        .create_magic_link("linked@example.com", MagicLinkPurpose::Login)
        .await
        .unwrap();

    let redeemed = app
        .state
        .credentials
        .verify_magic_link("linked@example.com", &raw_token)
        .await
        .unwrap()
        .expect("link should redeem");
    assert_eq!(redeemed.purpose_code, MagicLinkPurpose::Login.as_str());
    assert!(redeemed.consumed_utc.is_some());
}

#[tokio::test]
async fn second_redemption_of_the_same_token_fails() {
    let app = TestApp::new();

    let (_, raw_token) = app
        .state
        .credentials
        .create_magic_link("once@example.com", MagicLinkPurpose::Login)
        .await
        .unwrap();

    assert!(app
        .state
        .credentials
        .verify_magic_link("once@example.com", &raw_token)
        .await
        .unwrap()
        .is_some());
    assert!(app
        .state
        .credentials
        .verify_magic_link("once@example.com", &raw_token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn email_lookup_is_case_insensitive_but_token_bound() {
    let app = TestApp::new();

    let (_, raw_token) = app
        .state
        .credentials
        .create_magic_link("Mixed@Example.Com", MagicLinkPurpose::Login)
        .await
        .unwrap();

    // Wrong email cannot redeem someone else's token
    assert!(app
        .state
        .credentials
        .verify_magic_link("other@example.com", &raw_token)
        .await
        .unwrap()
        .is_none());

    assert!(app
        .state
        .credentials
        .verify_magic_link("mixed@example.com", &raw_token)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn expired_links_do_not_redeem_and_are_not_consumed() {
    let app = TestApp::new();

    let raw_token = utils::generate_token();
    let mut link = MagicLink::new(
        "late@example.com".to_string(),
        utils::hash_token(&raw_token),
        MagicLinkPurpose::Login,
        24,
    );
    link.expiry_utc = Utc::now() - Duration::hours(1);
    app.store().insert_magic_link(&link).await.unwrap();

    assert!(app
        .state
        .credentials
        .verify_magic_link("late@example.com", &raw_token)
        .await
        .unwrap()
        .is_none());

    // A failed redemption never consumes the link
    let stored = app
        .store()
        .find_magic_link("late@example.com", &link.token_hash)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.consumed_utc.is_none());
}

#[tokio::test]
async fn password_verification_respects_missing_hashes() {
    let app = TestApp::new();
    let with_password = app.seed_user_with_password("pw@example.com").await;
    let magic_only = app.seed_user("magic-only@example.com").await;

    assert!(app
        .state
        .credentials
        .verify_password(&with_password, TEST_PASSWORD));
    assert!(!app
        .state
        .credentials
        .verify_password(&with_password, "wrong password"));

    // Magic-link-only accounts always fail password auth
    assert!(!app
        .state
        .credentials
        .verify_password(&magic_only, TEST_PASSWORD));
}
