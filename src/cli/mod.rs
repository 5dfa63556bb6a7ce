use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{LedgerError, LedgerService};
use crate::domain::{format_cents, parse_cents, ADMIN_USERNAME, Cents};
use crate::io::Exporter;

/// Cassa - Banking Ledger
#[derive(Parser)]
#[command(name = "cassa")]
#[command(about = "A concurrency-safe banking ledger for accounts, fees and loans")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "cassa.db")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and provision the admin pool account
    Init {
        /// Secret for the admin pool account
        #[arg(long)]
        admin_secret: String,
    },

    /// Register a new account
    Register {
        /// Account username
        username: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Deposit funds into an account (admin only)
    Deposit {
        /// Target account username
        username: String,

        /// Amount in major units (e.g., "50.00" or "50")
        amount: String,

        /// Admin pool secret
        #[arg(long)]
        admin_secret: String,
    },

    /// Withdraw funds (a transaction fee applies)
    Withdraw {
        /// Account username
        username: String,

        /// Amount in major units
        amount: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Transfer funds to another account (a transaction fee applies)
    Transfer {
        /// Source account username
        username: String,

        /// Amount in major units
        amount: String,

        /// Destination account username
        #[arg(long)]
        to: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Show an account's funds and debt
    Balance {
        /// Account username
        username: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Issue a loan from the admin pool (admin only)
    IssueLoan {
        /// Borrower account username
        username: String,

        /// Loan amount in major units
        amount: String,

        /// Admin pool secret
        #[arg(long)]
        admin_secret: String,
    },

    /// Pay down an account's loan debt
    PayLoan {
        /// Account username
        username: String,

        /// Payment amount in major units
        amount: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Delete an account (admin only)
    Delete {
        /// Target account username
        username: String,

        /// Admin pool secret
        #[arg(long)]
        admin_secret: String,
    },

    /// List an account's movements, oldest first
    Movements {
        /// Account username
        username: String,

        /// Account secret
        #[arg(long)]
        secret: String,
    },

    /// Export data to CSV
    Export {
        /// What to export: movements, balances
        export_type: String,

        /// Account username (movements export)
        #[arg(long)]
        username: Option<String>,

        /// Account secret (movements) or admin secret (balances)
        #[arg(long)]
        secret: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init { admin_secret } => {
                let service = LedgerService::init(&self.database).await?;
                match service.register(ADMIN_USERNAME, &admin_secret).await {
                    Ok(()) => println!(
                        "Initialized ledger at {} and provisioned the admin pool",
                        self.database
                    ),
                    Err(LedgerError::DuplicateAccount(_)) => {
                        println!("Ledger at {} already provisioned", self.database)
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Commands::Register { username, secret } => {
                let service = LedgerService::connect(&self.database).await?;
                service.register(&username, &secret).await?;
                println!("Registered account {}", username);
            }

            Commands::Deposit {
                username,
                amount,
                admin_secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let cents = parse_amount(&amount)?;
                service.deposit(&username, &admin_secret, cents).await?;
                println!("Deposited {} into {}", format_cents(cents), username);
            }

            Commands::Withdraw {
                username,
                amount,
                secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let cents = parse_amount(&amount)?;
                service.withdraw(&username, &secret, cents).await?;
                println!(
                    "Withdrew {} from {} (fee {})",
                    format_cents(cents),
                    username,
                    format_cents(service.policy().transaction_fee)
                );
            }

            Commands::Transfer {
                username,
                amount,
                to,
                secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let cents = parse_amount(&amount)?;
                service.transfer(&username, &secret, &to, cents).await?;
                println!(
                    "Transferred {} from {} to {} (fee {})",
                    format_cents(cents),
                    username,
                    to,
                    format_cents(service.policy().transaction_fee)
                );
            }

            Commands::Balance { username, secret } => {
                let service = LedgerService::connect(&self.database).await?;
                let summary = service.balance(&username, &secret).await?;
                println!("Account:  {}", username);
                println!("Funds:    {}", format_cents(summary.funds));
                println!("Debt:     {}", format_cents(summary.debt));
            }

            Commands::IssueLoan {
                username,
                amount,
                admin_secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let cents = parse_amount(&amount)?;
                service.issue_loan(&username, &admin_secret, cents).await?;
                let surcharge = service.policy().interest_on(cents);
                println!(
                    "Issued loan of {} to {} (debt incl. interest: {})",
                    format_cents(cents),
                    username,
                    format_cents(cents + surcharge)
                );
            }

            Commands::PayLoan {
                username,
                amount,
                secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let cents = parse_amount(&amount)?;
                let outcome = service.pay_loan(&username, &secret, cents).await?;
                if outcome.clamped {
                    println!(
                        "Requested {} exceeded the outstanding debt; only {} was charged",
                        format_cents(cents),
                        format_cents(outcome.applied)
                    );
                } else {
                    println!("Paid {} toward the loan", format_cents(outcome.applied));
                }
            }

            Commands::Delete {
                username,
                admin_secret,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                service.delete_account(&username, &admin_secret).await?;
                println!("Deleted account {}", username);
            }

            Commands::Movements { username, secret } => {
                let service = LedgerService::connect(&self.database).await?;
                let movements = service.movements(&username, &secret).await?;
                if movements.is_empty() {
                    println!("No movements for {}", username);
                } else {
                    for entry in movements {
                        println!(
                            "{}  {:<12} {:>12}",
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.kind.to_string(),
                            format_cents(entry.amount)
                        );
                    }
                }
            }

            Commands::Export {
                export_type,
                username,
                secret,
                output,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let exporter = Exporter::new(&service);

                let mut buffer: Vec<u8> = Vec::new();
                let count = match export_type.as_str() {
                    "movements" => {
                        let username = username
                            .context("--username is required for a movements export")?;
                        exporter
                            .export_movements_csv(&username, &secret, &mut buffer)
                            .await?
                    }
                    "balances" => exporter.export_balances_csv(&secret, &mut buffer).await?,
                    other => anyhow::bail!("Unknown export type: {}", other),
                };

                match output {
                    Some(path) => {
                        let mut file = File::create(&path)
                            .with_context(|| format!("Failed to create {}", path))?;
                        file.write_all(&buffer)?;
                        println!("Exported {} records to {}", count, path);
                    }
                    None => {
                        std::io::stdout().write_all(&buffer)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input).with_context(|| format!("Invalid amount: {}", input))
}
