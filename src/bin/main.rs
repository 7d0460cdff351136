// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Credit Engine Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use credit_engine_rs::{
    CreditEngine, EngineConfig, LedgerError, TaskId, TenantId, TransactionKind,
};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Credit Engine - Replay billing operation CSV files
///
/// Reads credit operations from a CSV file, replays them through the
/// engine, and outputs wallet states to stdout. Supports purchases,
/// bonuses, consumption, and refunds.
#[derive(Parser, Debug)]
#[command(name = "credit-engine-rs")]
#[command(about = "Replays a billing operations CSV through the credit engine", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,tenant,amount,reference,description
    /// Example: cargo run -- operations.csv > wallets.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Optional TOML engine configuration (signup bonus, limits, tiers)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the ordered audit journal to this CSV file
    #[arg(long, value_name = "FILE")]
    audit: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = CreditEngine::new(config);
    if let Err(e) = replay_operations(BufReader::new(file), &engine) {
        eprintln!("Error replaying operations: {}", e);
        process::exit(1);
    }

    if let Some(path) = &args.audit {
        let out = match File::create(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error creating audit file '{}': {}", path.display(), e);
                process::exit(1);
            }
        };
        if let Err(e) = write_audit_log(&engine, out) {
            eprintln!("Error writing audit log: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = write_wallets(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, tenant, amount, reference, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    tenant: u64,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option")]
    reference: Option<u64>,
    description: Option<String>,
}

/// One replayable billing operation.
#[derive(Debug)]
enum Operation {
    Purchase {
        tenant: TenantId,
        amount: Decimal,
        description: String,
    },
    Bonus {
        tenant: TenantId,
        amount: Decimal,
        description: String,
    },
    Consume {
        tenant: TenantId,
        credits: Decimal,
        task: TaskId,
        description: String,
    },
    Refund {
        tenant: TenantId,
        credits: Decimal,
        task: TaskId,
        reason: String,
    },
}

impl CsvRecord {
    /// Converts a CSV record into an operation.
    ///
    /// Returns `None` for unknown op names or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let tenant = TenantId(self.tenant);
        let description = self.description.unwrap_or_default();

        match self.op.to_lowercase().as_str() {
            "purchase" => Some(Operation::Purchase {
                tenant,
                amount: self.amount?,
                description,
            }),
            "bonus" => Some(Operation::Bonus {
                tenant,
                amount: self.amount?,
                description,
            }),
            "consume" => Some(Operation::Consume {
                tenant,
                credits: self.amount?,
                task: TaskId(self.reference?),
                description,
            }),
            "refund" => Some(Operation::Refund {
                tenant,
                credits: self.amount?,
                task: TaskId(self.reference?),
                reason: description,
            }),
            _ => None,
        }
    }
}

fn apply(engine: &CreditEngine, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::Purchase {
            tenant,
            amount,
            description,
        } => {
            engine.add_credits(tenant, amount, TransactionKind::Purchase, &description, None)?;
        }
        Operation::Bonus {
            tenant,
            amount,
            description,
        } => {
            engine.add_credits(tenant, amount, TransactionKind::Bonus, &description, None)?;
        }
        Operation::Consume {
            tenant,
            credits,
            task,
            description,
        } => {
            engine.get_or_create_wallet(tenant);
            engine.ensure_within_budget(tenant, credits)?;
            engine.consume(tenant, credits, task, &description)?;
            engine.record_usage(tenant, credits, false);
        }
        Operation::Refund {
            tenant,
            credits,
            task,
            reason,
        } => {
            engine.refund(tenant, credits, task, &reason)?;
        }
    }
    Ok(())
}

/// Replays operations from a CSV reader through the engine.
///
/// Streaming parse, so arbitrarily large files never load fully into
/// memory. Malformed rows and rejected operations (insufficient credits,
/// exceeded budgets) are skipped; the remaining rows still apply.
///
/// # CSV Format
///
/// Expected columns: `op, tenant, amount, reference, description`
/// - `op`: Operation (purchase, bonus, consume, refund)
/// - `tenant`: Tenant ID (u64)
/// - `amount`: Decimal credit amount
/// - `reference`: Task ID for consume/refund, empty otherwise
/// - `description`: Free-text description
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is
/// invalid. Individual operation errors don't stop processing.
pub fn replay_operations<R: Read>(reader: R, engine: &CreditEngine) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(operation) = record.into_operation() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid operation record");
                    continue;
                };

                if let Err(e) = apply(engine, operation) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping operation: {}", e);
                }
            }
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Writes all wallet states as CSV, sorted by tenant id.
///
/// Columns: `tenant, balance, total_purchased, total_bonus, total_consumed`
pub fn write_wallets<W: Write>(engine: &CreditEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for snapshot in engine.wallet_snapshots() {
        wtr.serialize(&snapshot)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Flat audit row; the journal's nested reference and metadata don't fit a
/// CSV cell.
#[derive(Serialize)]
struct AuditRow {
    id: u64,
    tenant: u64,
    kind: String,
    amount: Decimal,
    balance_after: Decimal,
    description: String,
    created_at: String,
}

/// Drains the journal and writes it in global append order.
pub fn write_audit_log<W: Write>(engine: &CreditEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for tx in engine.drain_audit_log() {
        wtr.serialize(AuditRow {
            id: tx.id.0,
            tenant: tx.tenant_id.0,
            kind: tx.kind.to_string(),
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            created_at: tx.created_at.to_rfc3339(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn replay(csv: &str) -> CreditEngine {
        let engine = CreditEngine::default();
        replay_operations(Cursor::new(csv), &engine).unwrap();
        engine
    }

    #[test]
    fn parse_purchase_and_consume() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             purchase,1,500,,credit pack\n\
             consume,1,200,7,summarize inbox\n",
        );

        let wallet = engine.wallet(TenantId(1)).unwrap();
        // Signup bonus (1000) + 500 - 200.
        assert_eq!(wallet.balance, dec!(1300));
        assert_eq!(wallet.total_purchased, dec!(500));
        assert_eq!(wallet.total_consumed, dec!(200));
    }

    #[test]
    fn consume_creates_wallet_with_bonus() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             consume,3,100,1,first task\n",
        );

        let wallet = engine.wallet(TenantId(3)).unwrap();
        assert_eq!(wallet.balance, dec!(900));
    }

    #[test]
    fn overdraw_is_skipped() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             consume,1,5000,1,too big\n",
        );

        let wallet = engine.wallet(TenantId(1)).unwrap();
        assert_eq!(wallet.balance, dec!(1000));
        assert_eq!(wallet.total_consumed, Decimal::ZERO);
    }

    #[test]
    fn refund_restores_credits() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             consume,1,300,9,task\n\
             refund,1,300,9,task crashed\n",
        );

        let wallet = engine.wallet(TenantId(1)).unwrap();
        assert_eq!(wallet.balance, dec!(1000));
    }

    #[test]
    fn parse_with_whitespace() {
        let engine = replay(
            "op,tenant,amount,reference,description\n purchase , 1 , 250 , , pack \n",
        );
        assert_eq!(engine.wallet(TenantId(1)).unwrap().total_purchased, dec!(250));
    }

    #[test]
    fn skip_malformed_rows() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             purchase,1,100,,pack\n\
             invalid,row,data,here,\n\
             bonus,2,50,,promo\n",
        );

        assert_eq!(engine.wallet_snapshots().len(), 2);
        assert_eq!(engine.wallet(TenantId(2)).unwrap().total_bonus, dec!(1050));
    }

    #[test]
    fn write_wallets_to_csv() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             purchase,2,100,,pack\n\
             purchase,1,200,,pack\n",
        );

        let mut output = Vec::new();
        write_wallets(&engine, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("tenant,balance,total_purchased,total_bonus,total_consumed"));
        // Sorted by tenant id.
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
    }

    #[test]
    fn audit_log_preserves_order() {
        let engine = replay(
            "op,tenant,amount,reference,description\n\
             purchase,1,100,,pack\n\
             consume,1,40,5,task\n",
        );

        let mut output = Vec::new();
        write_audit_log(&engine, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].starts_with("id,tenant,kind"));
        assert!(lines[1].contains("purchase"));
        assert!(lines[2].contains("consumption"));
    }
}
