//! # CLI - RiptideKV Interactive Shell
//!
//! A REPL-style command-line interface for the RiptideKV storage engine.
//! Reads commands from stdin, executes them against a [`Db`], and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value        Insert or update a key-value pair
//! GET key              Look up a key (prints value or "(nil)")
//! DEL key              Delete a key (writes a tombstone)
//! SCAN [start] [end]   Range scan (inclusive start, exclusive end)
//! BEGIN [iso_level]    Open an explicit transaction (RU|RC|RR, default RC)
//! COMMIT               Commit the open transaction
//! ROLLBACK             Roll back the open transaction
//! STATS                Print engine debug info
//! EXIT / QUIT          Shut down gracefully
//! ```
//!
//! With no open transaction, SET/GET/DEL/SCAN each run in their own
//! implicitly committed transaction (mirroring [`Db::put`]/[`Db::get`]).
//! Background freeze/collect/flush/compact workers run continuously; there
//! is no manual FLUSH or COMPACT command.
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables, see
//! [`config::Config::from_env`]:
//!
//! ```text
//! RIPTIDE_WORK_DIR              work directory              (default: ".")
//! RIPTIDE_MEMTABLE_SIZE_BYTES   memtable flush threshold     (default: 1 MiB)
//! RIPTIDE_LEVELS                number of SST levels         (default: 7)
//! RIPTIDE_AMPLIFICATION_RATIO   per-level size multiplier    (default: 8)
//! RIPTIDE_BLOCK_SIZE            SST data block size          (default: 4096)
//! RIPTIDE_BLOOM_K               bloom filter hash count      (default: 4)
//! RIPTIDE_BLOOM_FPR             bloom filter target FPR      (default: 0.01)
//! RIPTIDE_WAL_SYNC              fsync every WAL append       (default: true)
//! RIPTIDE_TRX_TIMEOUT_SECONDS   transaction wait timeout     (default: 15)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! RiptideKV started (work_dir=., memtable_size=1048576B, levels=7)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```
use anyhow::{Context, Result};
use config::Config;
use engine::{Db, IsoLevel, Transaction, TransactionOptions};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Upper bound on how many rows an interactive SCAN ever prints.
const SCAN_LIMIT: usize = 10_000;

fn parse_iso_level(s: &str) -> Option<IsoLevel> {
    match s.to_uppercase().as_str() {
        "RU" | "READ_UNCOMMITTED" => Some(IsoLevel::ReadUncommitted),
        "RC" | "READ_COMMITTED" => Some(IsoLevel::ReadCommitted),
        "RR" | "REPEATABLE_READ" => Some(IsoLevel::RepeatableRead),
        _ => None,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = Config::from_env().context("invalid configuration")?;
    let db = Db::open(config.clone()).context("failed to open database")?;

    println!(
        "RiptideKV started (work_dir={}, memtable_size={}B, levels={})",
        config.work_dir.display(),
        config.memtable_size_bytes,
        config.levels
    );
    println!("Commands: SET key value | GET key | DEL key | SCAN [start] [end]");
    println!("          BEGIN [iso_level] | COMMIT | ROLLBACK | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let mut active_trx: Option<Arc<Transaction>> = None;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            let result = match &active_trx {
                                Some(trx) => trx.put(k.as_bytes(), v.as_bytes()),
                                None => db.put(k.as_bytes(), v.as_bytes()),
                            };
                            match result {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        let result = match &active_trx {
                            Some(trx) => trx.get(k.as_bytes()),
                            None => db.get(k.as_bytes()),
                        };
                        match result {
                            Ok(Some(elem)) => println!("{}", String::from_utf8_lossy(&elem.value)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        let result = match &active_trx {
                            Some(trx) => trx.delete(k.as_bytes()),
                            None => db.delete(k.as_bytes()),
                        };
                        match result {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().unwrap_or("").as_bytes();
                    let end: &[u8] = match parts.next() {
                        Some(e) => e.as_bytes(),
                        None => &[0xff; 256],
                    };
                    let result = match &active_trx {
                        Some(trx) => trx.range(start, end, SCAN_LIMIT, 0),
                        None => db.range(start, end, SCAN_LIMIT, 0),
                    };
                    match result {
                        Ok(results) => {
                            if results.is_empty() {
                                println!("(empty)");
                            } else {
                                for elem in &results {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(&elem.key.content),
                                        String::from_utf8_lossy(&elem.value)
                                    );
                                }
                                println!("({} entries)", results.len());
                            }
                        }
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "BEGIN" => {
                    if active_trx.is_some() {
                        println!("ERR transaction already in progress, COMMIT or ROLLBACK first");
                    } else {
                        let options = match parts.next().and_then(parse_iso_level) {
                            Some(level) => TransactionOptions::with_isolation_level(level),
                            None => TransactionOptions::default(),
                        };
                        let trx = db.start_transaction(options);
                        println!("OK (trx={})", trx.id());
                        active_trx = Some(trx);
                    }
                }
                "COMMIT" => match active_trx.take() {
                    Some(trx) => match db.commit_transaction(&trx) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR commit failed: {}", e),
                    },
                    None => println!("ERR no transaction in progress"),
                },
                "ROLLBACK" => match active_trx.take() {
                    Some(trx) => match db.rollback_transaction(&trx) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR rollback failed: {}", e),
                    },
                    None => println!("ERR no transaction in progress"),
                },
                "STATS" => {
                    println!("{:?}", db);
                }
                "EXIT" | "QUIT" => {
                    if let Some(trx) = active_trx.take() {
                        let _ = db.rollback_transaction(&trx);
                    }
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
