// Shared fixtures for service-level and transport tests

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{
    catalog::RoleCatalog,
    models::{Account, RegisterRequest},
    password::fast_password_service,
    repository::{InMemoryStore, Repositories},
    service::AuthService,
};
use crate::clock::ManualClock;
use crate::config::{AuthConfig, JwtSettings};

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes";
pub const VALID_PASSWORD: &str = "Str0ng!Pass";

pub fn test_config() -> AuthConfig {
    AuthConfig::new(JwtSettings::with_secret(TEST_SECRET))
}

/// Service over a seeded in-memory store on a frozen clock
pub async fn test_service() -> (Arc<AuthService>, Arc<InMemoryStore>, Arc<ManualClock>) {
    test_service_with(test_config()).await
}

pub async fn test_service_with(
    config: AuthConfig,
) -> (Arc<AuthService>, Arc<InMemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(
        InMemoryStore::with_catalog(&RoleCatalog::default_catalog())
            .await
            .unwrap(),
    );
    let service = AuthService::new(
        Repositories::from_store(store.clone()),
        Arc::new(fast_password_service()),
        clock.clone(),
        &config,
    )
    .unwrap();

    (Arc::new(service), store, clock)
}

pub fn sample_account(username: &str, email: &str) -> Account {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    Account {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: String::new(),
        first_name: "Alice".to_string(),
        last_name: "Liddell".to_string(),
        phone_number: None,
        is_active: true,
        is_email_confirmed: false,
        last_login_at: None,
        failed_login_attempts: 0,
        locked_out_until: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn register_request(username: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: VALID_PASSWORD.to_string(),
        confirm_password: VALID_PASSWORD.to_string(),
        first_name: "Alice".to_string(),
        last_name: "Liddell".to_string(),
        phone_number: Some("+15551234567".to_string()),
    }
}
