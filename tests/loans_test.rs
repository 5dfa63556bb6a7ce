mod common;

use anyhow::Result;
use cassa::application::LedgerError;
use cassa::domain::{ADMIN_USERNAME, LedgerPolicy, OperationKind};
use common::{provisioned_service, register_funded, test_service_with_policy, ADMIN_SECRET};

/// Provision the admin pool with loan capital.
async fn capitalize(service: &cassa::application::LedgerService, amount: i64) -> Result<()> {
    service.deposit(ADMIN_USERNAME, ADMIN_SECRET, amount).await?;
    Ok(())
}

#[tokio::test]
async fn test_issue_loan_adds_interest_to_debt_immediately() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    service.register("alice", "pw").await?;

    service.issue_loan("alice", ADMIN_SECRET, 10_000).await?;

    let alice = service.balance("alice", "pw").await?;
    assert_eq!(alice.funds, 10_000);
    assert_eq!(alice.debt, 11_000);

    // Principal left the pool
    let admin = service.balance(ADMIN_USERNAME, ADMIN_SECRET).await?;
    assert_eq!(admin.funds, 90_000);
    Ok(())
}

#[tokio::test]
async fn test_issue_loan_interest_truncates() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    service.register("alice", "pw").await?;

    // 10% of 99 cents is 9.9 cents, truncated to 9
    service.issue_loan("alice", ADMIN_SECRET, 99).await?;

    let alice = service.balance("alice", "pw").await?;
    assert_eq!(alice.debt, 99 + 9);
    Ok(())
}

#[tokio::test]
async fn test_issue_loan_requires_admin_secret() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    service.register("alice", "pw").await?;

    let result = service.issue_loan("alice", "pw", 10_000).await;
    assert!(matches!(result, Err(LedgerError::AuthFailed)));
    assert_eq!(service.balance("alice", "pw").await?.debt, 0);
    Ok(())
}

#[tokio::test]
async fn test_issue_loan_beyond_pool_capital() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 5_000).await?;
    service.register("alice", "pw").await?;

    let result = service.issue_loan("alice", ADMIN_SECRET, 10_000).await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientFunds { .. })
    ));

    // Neither side moved
    let alice = service.balance("alice", "pw").await?;
    assert_eq!(alice.funds, 0);
    assert_eq!(alice.debt, 0);
    assert_eq!(
        service.balance(ADMIN_USERNAME, ADMIN_SECRET).await?.funds,
        5_000
    );
    Ok(())
}

#[tokio::test]
async fn test_pay_loan_reduces_debt_and_funds() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    register_funded(&service, "alice", "pw", 20_000).await?;
    service.issue_loan("alice", ADMIN_SECRET, 10_000).await?;

    let outcome = service.pay_loan("alice", "pw", 4_000).await?;
    assert_eq!(outcome.applied, 4_000);
    assert!(!outcome.clamped);

    let alice = service.balance("alice", "pw").await?;
    assert_eq!(alice.debt, 11_000 - 4_000);
    assert_eq!(alice.funds, 20_000 + 10_000 - 4_000);
    Ok(())
}

#[tokio::test]
async fn test_pay_loan_clamps_overpayment_to_outstanding_debt() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    register_funded(&service, "alice", "pw", 20_000).await?;

    // Principal 455 at 10% -> debt exactly 500 cents; pay 800: only 500
    // is charged
    service.issue_loan("alice", ADMIN_SECRET, 455).await?;
    assert_eq!(service.balance("alice", "pw").await?.debt, 500);

    let pool_before = service.balance(ADMIN_USERNAME, ADMIN_SECRET).await?.funds;
    let funds_before = service.balance("alice", "pw").await?.funds;

    let outcome = service.pay_loan("alice", "pw", 800).await?;
    assert!(outcome.clamped);
    assert_eq!(outcome.applied, 500);

    let alice = service.balance("alice", "pw").await?;
    assert_eq!(alice.debt, 0);
    assert_eq!(alice.funds, funds_before - 500);
    assert_eq!(
        service.balance(ADMIN_USERNAME, ADMIN_SECRET).await?.funds,
        pool_before + 500
    );
    Ok(())
}

#[tokio::test]
async fn test_pay_loan_insufficient_funds_checks_requested_amount() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    register_funded(&service, "alice", "pw", 1_000).await?;
    service.issue_loan("alice", ADMIN_SECRET, 10_000).await?;

    // Funds are 11_000; requesting 20_000 fails even though debt is 11_000
    let result = service.pay_loan("alice", "pw", 20_000).await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientFunds { required: 20_000, .. })
    ));
    assert_eq!(service.balance("alice", "pw").await?.debt, 11_000);
    Ok(())
}

#[tokio::test]
async fn test_pay_loan_with_no_debt_is_a_clamped_no_op() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    register_funded(&service, "alice", "pw", 10_000).await?;

    let outcome = service.pay_loan("alice", "pw", 3_000).await?;
    assert!(outcome.clamped);
    assert_eq!(outcome.applied, 0);
    assert_eq!(service.balance("alice", "pw").await?.funds, 10_000);
    Ok(())
}

#[tokio::test]
async fn test_loan_payment_logged_on_both_accounts() -> Result<()> {
    let (service, _temp) = provisioned_service().await?;
    capitalize(&service, 100_000).await?;
    register_funded(&service, "alice", "pw", 20_000).await?;
    service.issue_loan("alice", ADMIN_SECRET, 10_000).await?;
    service.pay_loan("alice", "pw", 4_000).await?;

    let alice_log = service.movements("alice", "pw").await?;
    let last = alice_log.last().unwrap();
    assert_eq!(last.kind, OperationKind::LoanPayment);
    assert_eq!(last.amount, -4_000);

    // Borrower got a LoanIssue entry; the pool's outflow is not logged
    assert!(alice_log
        .iter()
        .any(|op| op.kind == OperationKind::LoanIssue && op.amount == 10_000));
    let admin_log = service.movements(ADMIN_USERNAME, ADMIN_SECRET).await?;
    assert!(!admin_log.iter().any(|op| op.kind == OperationKind::LoanIssue));
    assert!(admin_log
        .iter()
        .any(|op| op.kind == OperationKind::LoanPayment && op.amount == 4_000));
    Ok(())
}

#[tokio::test]
async fn test_custom_interest_rate_policy() -> Result<()> {
    let policy = LedgerPolicy {
        interest_rate_bps: 2_500,
        ..Default::default()
    };
    let (service, _temp) = test_service_with_policy(policy).await?;
    service.register(ADMIN_USERNAME, ADMIN_SECRET).await?;
    capitalize(&service, 100_000).await?;
    service.register("alice", "pw").await?;

    service.issue_loan("alice", ADMIN_SECRET, 10_000).await?;

    // 25% interest
    assert_eq!(service.balance("alice", "pw").await?.debt, 12_500);
    Ok(())
}
