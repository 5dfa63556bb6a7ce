// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use cassa::application::LedgerService;
use cassa::auth::Sha256Credentials;
use cassa::domain::{ADMIN_USERNAME, Cents, LedgerPolicy};
use cassa::storage::Repository;
use tempfile::TempDir;

pub const ADMIN_SECRET: &str = "admin-secret";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test service with a non-default policy
pub async fn test_service_with_policy(policy: LedgerPolicy) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_str().unwrap());
    let repo = Repository::init(&db_url).await?;
    let service = LedgerService::new(repo, policy, Box::new(Sha256Credentials));
    Ok((service, temp_dir))
}

/// Test service with the admin pool already registered
pub async fn provisioned_service() -> Result<(LedgerService, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    service.register(ADMIN_USERNAME, ADMIN_SECRET).await?;
    Ok((service, temp_dir))
}

/// Register an account and give it starting funds (in cents) via an admin
/// deposit.
pub async fn register_funded(
    service: &LedgerService,
    username: &str,
    secret: &str,
    funds: Cents,
) -> Result<()> {
    service.register(username, secret).await?;
    if funds > 0 {
        service.deposit(username, ADMIN_SECRET, funds).await?;
    }
    Ok(())
}

/// Funds currently held by an account, read back through the service.
pub async fn funds_of(service: &LedgerService, username: &str, secret: &str) -> Result<Cents> {
    Ok(service.balance(username, secret).await?.funds)
}
