//! Key management commands

use anyhow::{Context, Result};
use std::io::Read;
use tracing::info;

use dca_core::vault::{generate_key, Vault, CREDENTIAL_SEPARATOR};

use super::describe;

pub fn keygen() -> Result<()> {
    println!("{}", generate_key());
    info!("Generated new encryption key");
    Ok(())
}

pub fn list() -> Result<()> {
    let vault = Vault::from_env().map_err(describe)?;
    let keyring = vault.keyring();

    for key_id in keyring.ids() {
        let marker = if key_id == keyring.primary_id() { "*" } else { " " };
        let fingerprint = keyring.fingerprint(key_id).unwrap_or_default();
        println!("{} {:<16} {}", marker, key_id, fingerprint);
    }
    info!("{} key(s), primary: {}", keyring.len(), keyring.primary_id());
    Ok(())
}

pub fn seal(value: Option<String>) -> Result<()> {
    let value = match value {
        Some(value) => value,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read value from stdin")?;
            buffer.trim_end_matches(&['\r', '\n'][..]).to_string()
        }
    };

    let vault = Vault::from_env().map_err(describe)?;
    let sealed = vault.encrypt(&value).map_err(describe)?;
    println!("{}", sealed);
    Ok(())
}

pub fn open(token: String, reveal: bool) -> Result<()> {
    let vault = Vault::from_env().map_err(describe)?;
    let opened = vault.open_credential(token.trim()).map_err(describe)?;

    if reveal {
        println!("{}", opened.plaintext.expose());
    } else {
        let plaintext = opened.plaintext.expose();
        let key_id = plaintext
            .split_once(CREDENTIAL_SEPARATOR)
            .map(|(key_id, _)| key_id)
            .unwrap_or("<no key id>");
        println!("Decrypted {} bytes, key id: {}", plaintext.len(), key_id);
    }

    if let Some(rotated) = opened.rotated {
        eprintln!("Token is not under the primary key. Rotated token: {}", rotated);
    }
    Ok(())
}

pub fn rotate(token: String) -> Result<()> {
    let vault = Vault::from_env().map_err(describe)?;
    let opened = vault.open_credential(token.trim()).map_err(describe)?;

    match opened.rotated {
        Some(rotated) => {
            info!(
                to_key = rotated.key_id().unwrap_or_default(),
                "Token rotated"
            );
            println!("{}", rotated);
        }
        None => {
            info!("Token already under the primary key");
            println!("{}", token.trim());
        }
    }
    Ok(())
}
