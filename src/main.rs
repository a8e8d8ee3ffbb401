//! credvault - Main entry point.
//!
//! Usage: credvault [--config FILE] COMMAND
//!
//! Commands:
//!   status             Show key file and store state
//!   unlock             Set up or verify the master password
//!   reset              Replace the master password
//!   migrate [FILE]     Encrypt plaintext passwords in the store
//!   encrypt VALUE      Print VALUE encrypted
//!   decrypt VALUE      Print VALUE decrypted
//!
//! Options:
//!   --config FILE      Use FILE instead of ~/.credvault/config
//!   --version, -v      Show version

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use credvault::config::Config;
use credvault::logging;
use credvault::migration;
use credvault::store::CredentialStore;
use credvault::vault::{KeyStore, TerminalPrompt, UnlockOutcome, Vault, is_encrypted};

/// Unlock attempts before giving up on a wrong password.
const MAX_UNLOCK_ATTEMPTS: usize = 3;

/// Exit code after a cancelled prompt.
const EXIT_CANCELLED: i32 = 2;

const USAGE: &str = "Usage: credvault [--config FILE] <status|unlock|reset|migrate [FILE]|encrypt VALUE|decrypt VALUE>";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("credvault v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = take_option(&mut args, "--config").map(PathBuf::from);
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config.log_config) {
        eprintln!("Logging disabled: {}", e);
    }

    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        process::exit(1);
    };
    let operand = args.get(1).cloned();

    let keystore = KeyStore::from_config(&config);

    match command.as_str() {
        "status" => status(&config, &keystore)?,
        "unlock" => {
            unlock(&keystore)?;
            println!("Vault unlocked.");
        }
        "reset" => reset(&keystore)?,
        "migrate" => {
            let vault = unlock(&keystore)?;
            let path = operand.map_or_else(|| config.store_file.clone(), PathBuf::from);
            let result = migration::migrate_file(&path, &vault, &config.backup_suffix)?;
            let report = result.report;
            println!(
                "Encrypted {}, already encrypted {}, empty {}, failed {}.",
                report.encrypted, report.already_encrypted, report.empty, report.failed
            );
            if let Some(backup) = result.backup {
                println!("Backup: {}", backup.display());
            }
        }
        "encrypt" | "decrypt" => {
            let Some(value) = operand else {
                eprintln!("{}", USAGE);
                process::exit(1);
            };
            let vault = unlock(&keystore)?;
            let output = if command == "encrypt" {
                vault.encrypt(&value)?
            } else {
                vault.decrypt(&value)?
            };
            println!("{}", output);
        }
        _ => {
            eprintln!("Unknown command: {}\n{}", command, USAGE);
            process::exit(1);
        }
    }

    Ok(())
}

/// Removes `--name VALUE` from `args` and returns VALUE.
fn take_option(args: &mut Vec<String>, name: &str) -> Option<String> {
    let index = args.iter().position(|a| a == name)?;
    args.remove(index);
    if index < args.len() {
        Some(args.remove(index))
    } else {
        None
    }
}

fn status(config: &Config, keystore: &KeyStore) -> Result<(), Box<dyn std::error::Error>> {
    println!("Key file:   {}", keystore.key_path().display());
    println!(
        "Set up:     {}",
        if keystore.is_set_up() { "yes" } else { "no (first unlock runs setup)" }
    );
    println!("Policy:     {}", keystore.policy().as_str());

    let store = CredentialStore::load(&config.store_file)?;
    let with_password: Vec<_> = store.records().filter(|r| r.has_password()).collect();
    let encrypted = with_password
        .iter()
        .filter(|r| is_encrypted(&r.password))
        .count();
    println!("Store:      {}", config.store_file.display());
    println!(
        "Records:    {} ({} with password, {} encrypted, {} plaintext)",
        store.len(),
        with_password.len(),
        encrypted,
        with_password.len() - encrypted
    );
    Ok(())
}

/// Unlocks the vault, retrying a wrong password a few times.
///
/// Cancellation ends the process: no credential work is possible without a key.
fn unlock(keystore: &KeyStore) -> Result<Arc<Vault>, Box<dyn std::error::Error>> {
    let mut prompt = TerminalPrompt::new();

    for _ in 0..MAX_UNLOCK_ATTEMPTS {
        match keystore.unlock(&mut prompt)? {
            UnlockOutcome::Created(vault) => {
                println!("Master password set up.");
                return Ok(vault);
            }
            UnlockOutcome::Unlocked(vault) => return Ok(vault),
            UnlockOutcome::WrongPassword => eprintln!("Wrong master password."),
            UnlockOutcome::SetupCancelled | UnlockOutcome::Cancelled => {
                eprintln!("Cancelled; stored credentials stay locked.");
                process::exit(EXIT_CANCELLED);
            }
        }
    }

    Err("too many wrong master password attempts".into())
}

fn reset(keystore: &KeyStore) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Resetting the master password makes every stored encrypted password unreadable.");
    match keystore.reset(&mut TerminalPrompt::new())? {
        UnlockOutcome::Created(_) => {
            println!("Master password replaced.");
            Ok(())
        }
        _ => {
            eprintln!("Cancelled.");
            process::exit(EXIT_CANCELLED);
        }
    }
}
