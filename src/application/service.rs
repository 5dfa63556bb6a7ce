use log::{debug, warn};

use crate::auth::{CredentialScheme, Sha256Credentials};
use crate::domain::{Account, ADMIN_USERNAME, Cents, LedgerPolicy, Operation, OperationKind};
use crate::storage::{AccountUpdate, CommitOutcome, Repository, StoredAccount};

use super::LedgerError;

/// Bounded optimistic retries before an operation gives up with
/// `TransientStorage`. Each attempt re-reads every involved account, so a
/// retry never works from stale balances.
const MAX_COMMIT_ATTEMPTS: u32 = 8;

/// Application service exposing the ledger operations. This is the primary
/// interface for any client (CLI, API, tests).
///
/// Every operation that derives new balances from current ones runs as an
/// optimistic transaction: read versioned snapshots, validate, commit all
/// row updates and log appends atomically, retry on conflict. No failure
/// path leaves a partial mutation behind.
pub struct LedgerService {
    repo: Repository,
    policy: LedgerPolicy,
    credentials: Box<dyn CredentialScheme>,
}

/// Funds and debt of one account, read from a single snapshot.
#[derive(Debug, Clone, Copy)]
pub struct BalanceSummary {
    pub funds: Cents,
    pub debt: Cents,
}

/// Result of a loan payment. `clamped` is set when the requested amount
/// exceeded the outstanding debt and only `applied` was charged.
#[derive(Debug, Clone, Copy)]
pub struct PaymentOutcome {
    pub applied: Cents,
    pub clamped: bool,
}

/// Balance line for the admin-gated listing (CSV export).
#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub username: String,
    pub funds: Cents,
    pub debt: Cents,
}

/// Accumulates per-account balance deltas and log entries for one operation.
/// Deltas for the same account merge, so overlapping participants
/// (self-transfer, admin as source or target) produce exactly one guarded
/// update per row.
struct Mutation {
    staged: Vec<(StoredAccount, Cents, Cents)>,
    entries: Vec<Operation>,
}

impl Mutation {
    fn new() -> Self {
        Self {
            staged: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn stage(&mut self, stored: &StoredAccount, funds_delta: Cents, debt_delta: Cents) {
        if let Some((_, funds, debt)) = self
            .staged
            .iter_mut()
            .find(|(s, _, _)| s.account.username == stored.account.username)
        {
            *funds += funds_delta;
            *debt += debt_delta;
        } else {
            self.staged.push((stored.clone(), funds_delta, debt_delta));
        }
    }

    fn log(&mut self, entry: Operation) {
        self.entries.push(entry);
    }

    /// Resolve deltas into guarded updates. A computed negative balance
    /// means validation missed something; the operation aborts before any
    /// commit is attempted.
    fn into_parts(self) -> Result<(Vec<AccountUpdate>, Vec<Operation>), LedgerError> {
        let mut updates = Vec::with_capacity(self.staged.len());
        for (stored, funds_delta, debt_delta) in self.staged {
            let funds = stored.account.funds + funds_delta;
            let debt = stored.account.debt + debt_delta;
            if funds < 0 || debt < 0 {
                return Err(LedgerError::InvariantViolation(format!(
                    "account {} would reach funds {} and debt {}",
                    stored.account.username, funds, debt
                )));
            }
            updates.push(AccountUpdate {
                username: stored.account.username,
                expected_version: stored.version,
                funds,
                debt,
            });
        }
        Ok((updates, self.entries))
    }
}

impl LedgerService {
    /// Create a service over the given repository with explicit policy and
    /// credential scheme.
    pub fn new(repo: Repository, policy: LedgerPolicy, credentials: Box<dyn CredentialScheme>) -> Self {
        Self {
            repo,
            policy,
            credentials,
        }
    }

    /// Initialize a new database at the given path, with default policy and
    /// the SHA-256 credential scheme.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(
            repo,
            LedgerPolicy::default(),
            Box::new(Sha256Credentials),
        ))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(
            repo,
            LedgerPolicy::default(),
            Box::new(Sha256Credentials),
        ))
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // ========================
    // Account lifecycle
    // ========================

    /// Register a new account with funds 0 and debt 0. Exactly one of two
    /// concurrent registrations for the same username succeeds; the other
    /// observes `DuplicateAccount`.
    pub async fn register(&self, username: &str, secret: &str) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;

        let account = Account::new(username.to_string(), self.credentials.derive(secret));
        let init = Operation::new(username, OperationKind::Init, 0);

        if self.repo.create_account(&account, &init).await? {
            debug!("registered account {}", username);
            Ok(())
        } else {
            Err(LedgerError::DuplicateAccount(username.to_string()))
        }
    }

    /// Remove an account record (admin-gated). Log entries are retained.
    /// The admin pool itself cannot be deleted. With `settle_before_delete`
    /// set, accounts still holding funds or debt are refused.
    pub async fn delete_account(
        &self,
        username: &str,
        admin_secret: &str,
    ) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("admin secret", admin_secret)?;

        if username == ADMIN_USERNAME {
            return Err(LedgerError::SystemNotProvisioned);
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let target = self.fetch(username).await?;
            let admin = self.fetch_admin().await?;
            self.authenticate(&admin, admin_secret)?;

            if self.policy.settle_before_delete && !target.account.is_settled() {
                return Err(LedgerError::AccountNotSettled {
                    username: username.to_string(),
                    funds: target.account.funds,
                    debt: target.account.debt,
                });
            }

            // Version-guarded so the settlement check cannot race a
            // concurrent credit to the same account.
            if self
                .repo
                .delete_account_versioned(username, target.version)
                .await?
            {
                debug!("deleted account {}", username);
                return Ok(());
            }
            debug!(
                "delete of {} conflicted, retrying (attempt {})",
                username, attempt
            );
        }

        warn!(
            "delete of {} exhausted {} attempts",
            username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    // ========================
    // Reads
    // ========================

    /// Current funds and debt, from one consistent snapshot. No mutation,
    /// no log entry.
    pub async fn balance(&self, username: &str, secret: &str) -> Result<BalanceSummary, LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;

        let stored = self.fetch(username).await?;
        self.authenticate(&stored, secret)?;

        Ok(BalanceSummary {
            funds: stored.account.funds,
            debt: stored.account.debt,
        })
    }

    /// The account's operation log, oldest first.
    pub async fn movements(&self, username: &str, secret: &str) -> Result<Vec<Operation>, LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;

        let stored = self.fetch(username).await?;
        self.authenticate(&stored, secret)?;

        Ok(self.repo.list_operations(username).await?)
    }

    /// Balances of every account (admin-gated), for reporting/export.
    pub async fn list_balances(&self, admin_secret: &str) -> Result<Vec<AccountBalance>, LedgerError> {
        Self::require("admin secret", admin_secret)?;

        let admin = self.fetch_admin().await?;
        self.authenticate(&admin, admin_secret)?;

        let accounts = self.repo.list_accounts().await?;
        Ok(accounts
            .into_iter()
            .map(|s| AccountBalance {
                username: s.account.username,
                funds: s.account.funds,
                debt: s.account.debt,
            })
            .collect())
    }

    // ========================
    // Money movements
    // ========================

    /// Credit `amount` to the target account (admin-gated).
    pub async fn deposit(
        &self,
        username: &str,
        admin_secret: &str,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("admin secret", admin_secret)?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let target = self.fetch(username).await?;
            let admin = self.fetch_admin().await?;
            self.authenticate(&admin, admin_secret)?;
            Self::require_positive(amount)?;

            let mut mutation = Mutation::new();
            mutation.stage(&target, amount, 0);
            mutation.log(Operation::new(username, OperationKind::Deposit, amount));

            if self.try_commit(mutation).await? {
                debug!("deposited {} to {}", amount, username);
                return Ok(());
            }
            debug!(
                "deposit to {} conflicted, retrying (attempt {})",
                username, attempt
            );
        }

        warn!(
            "deposit to {} exhausted {} attempts",
            username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    /// Debit `amount` plus the transaction fee from the account; the fee is
    /// credited to the admin pool. All-or-nothing across both accounts.
    pub async fn withdraw(
        &self,
        username: &str,
        secret: &str,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;

        let fee = self.policy.transaction_fee;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let account = self.fetch(username).await?;
            self.authenticate(&account, secret)?;
            Self::require_positive(amount)?;
            let admin = self.fetch_admin().await?;

            let total_debit = amount + fee;
            if !account.account.can_debit(total_debit) {
                return Err(LedgerError::InsufficientFunds {
                    username: username.to_string(),
                    funds: account.account.funds,
                    required: total_debit,
                });
            }

            let mut mutation = Mutation::new();
            mutation.stage(&account, -total_debit, 0);
            mutation.stage(&admin, fee, 0);
            mutation.log(Operation::new(
                username,
                OperationKind::Withdrawal,
                -total_debit,
            ));
            mutation.log(Operation::new(ADMIN_USERNAME, OperationKind::TransFee, fee));

            if self.try_commit(mutation).await? {
                debug!("withdrew {} (+fee {}) from {}", amount, fee, username);
                return Ok(());
            }
            debug!(
                "withdrawal from {} conflicted, retrying (attempt {})",
                username, attempt
            );
        }

        warn!(
            "withdrawal from {} exhausted {} attempts",
            username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    /// Move `amount` from source to target; the transaction fee goes to the
    /// admin pool. Atomic across all three accounts.
    pub async fn transfer(
        &self,
        username: &str,
        secret: &str,
        target_username: &str,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;
        Self::require("target username", target_username)?;

        if username == target_username && !self.policy.allow_self_transfer {
            return Err(LedgerError::InvalidAmount(
                "self transfer is not permitted".to_string(),
            ));
        }

        let fee = self.policy.transaction_fee;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let source = self.fetch(username).await?;
            let target = self.fetch(target_username).await?;
            self.authenticate(&source, secret)?;
            Self::require_positive(amount)?;
            let admin = self.fetch_admin().await?;

            let total_debit = amount + fee;
            if !source.account.can_debit(total_debit) {
                return Err(LedgerError::InsufficientFunds {
                    username: username.to_string(),
                    funds: source.account.funds,
                    required: total_debit,
                });
            }

            let mut mutation = Mutation::new();
            mutation.stage(&source, -total_debit, 0);
            mutation.stage(&admin, fee, 0);
            mutation.stage(&target, amount, 0);
            mutation.log(Operation::new(
                username,
                OperationKind::Transfer,
                -total_debit,
            ));
            mutation.log(Operation::new(ADMIN_USERNAME, OperationKind::TransFee, fee));
            mutation.log(Operation::new(
                target_username,
                OperationKind::Transfer,
                amount,
            ));

            if self.try_commit(mutation).await? {
                debug!(
                    "transferred {} from {} to {} (fee {})",
                    amount, username, target_username, fee
                );
                return Ok(());
            }
            debug!(
                "transfer {} -> {} conflicted, retrying (attempt {})",
                username, target_username, attempt
            );
        }

        warn!(
            "transfer {} -> {} exhausted {} attempts",
            username, target_username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    // ========================
    // Loans
    // ========================

    /// Issue a loan from the admin pool (admin-gated). The interest
    /// surcharge lands on the borrower's debt immediately; there is no
    /// accrual over time. The pool must cover the principal.
    pub async fn issue_loan(
        &self,
        username: &str,
        admin_secret: &str,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        Self::require("username", username)?;
        Self::require("admin secret", admin_secret)?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let target = self.fetch(username).await?;
            let admin = self.fetch_admin().await?;
            self.authenticate(&admin, admin_secret)?;
            Self::require_positive(amount)?;

            if !admin.account.can_debit(amount) {
                return Err(LedgerError::InsufficientFunds {
                    username: ADMIN_USERNAME.to_string(),
                    funds: admin.account.funds,
                    required: amount,
                });
            }

            let surcharge = self.policy.interest_on(amount);

            let mut mutation = Mutation::new();
            mutation.stage(&target, amount, amount + surcharge);
            mutation.stage(&admin, -amount, 0);
            // Only the borrower's side is logged; the pool's capital
            // outflow stays implicit.
            mutation.log(Operation::new(username, OperationKind::LoanIssue, amount));

            if self.try_commit(mutation).await? {
                debug!(
                    "issued loan of {} to {} (surcharge {})",
                    amount, username, surcharge
                );
                return Ok(());
            }
            debug!(
                "loan issue to {} conflicted, retrying (attempt {})",
                username, attempt
            );
        }

        warn!(
            "loan issue to {} exhausted {} attempts",
            username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    /// Pay down the account's debt. A payment exceeding the outstanding
    /// debt is clamped to it; the outcome reports the clamp so callers can
    /// tell the full requested amount was not charged.
    pub async fn pay_loan(
        &self,
        username: &str,
        secret: &str,
        amount: Cents,
    ) -> Result<PaymentOutcome, LedgerError> {
        Self::require("username", username)?;
        Self::require("secret", secret)?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let account = self.fetch(username).await?;
            self.authenticate(&account, secret)?;
            Self::require_positive(amount)?;

            if !account.account.can_debit(amount) {
                return Err(LedgerError::InsufficientFunds {
                    username: username.to_string(),
                    funds: account.account.funds,
                    required: amount,
                });
            }

            let admin = self.fetch_admin().await?;

            let applied = amount.min(account.account.debt);
            let clamped = applied < amount;

            let mut mutation = Mutation::new();
            mutation.stage(&account, -applied, -applied);
            mutation.stage(&admin, applied, 0);
            mutation.log(Operation::new(
                username,
                OperationKind::LoanPayment,
                -applied,
            ));
            mutation.log(Operation::new(
                ADMIN_USERNAME,
                OperationKind::LoanPayment,
                applied,
            ));

            if self.try_commit(mutation).await? {
                debug!(
                    "loan payment of {} by {} (clamped: {})",
                    applied, username, clamped
                );
                return Ok(PaymentOutcome { applied, clamped });
            }
            debug!(
                "loan payment by {} conflicted, retrying (attempt {})",
                username, attempt
            );
        }

        warn!(
            "loan payment by {} exhausted {} attempts",
            username, MAX_COMMIT_ATTEMPTS
        );
        Err(LedgerError::TransientStorage)
    }

    // ========================
    // Internals
    // ========================

    async fn try_commit(&self, mutation: Mutation) -> Result<bool, LedgerError> {
        let (updates, entries) = mutation.into_parts()?;
        match self.repo.commit_mutation(&updates, &entries).await? {
            CommitOutcome::Applied => Ok(true),
            CommitOutcome::Conflict => Ok(false),
        }
    }

    async fn fetch(&self, username: &str) -> Result<StoredAccount, LedgerError> {
        self.repo
            .get_account(username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    /// The admin pool must exist before any fee-bearing or loan operation.
    async fn fetch_admin(&self) -> Result<StoredAccount, LedgerError> {
        self.repo
            .get_account(ADMIN_USERNAME)
            .await?
            .ok_or(LedgerError::SystemNotProvisioned)
    }

    fn authenticate(&self, stored: &StoredAccount, secret: &str) -> Result<(), LedgerError> {
        if self
            .credentials
            .verify(secret, &stored.account.credential_hash)
        {
            Ok(())
        } else {
            Err(LedgerError::AuthFailed)
        }
    }

    fn require(field: &'static str, value: &str) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            Err(LedgerError::MissingField(field))
        } else {
            Ok(())
        }
    }

    fn require_positive(amount: Cents) -> Result<(), LedgerError> {
        if amount <= 0 {
            Err(LedgerError::InvalidAmount(format!("{} cents", amount)))
        } else {
            Ok(())
        }
    }
}
