use std::collections::BTreeMap;

use anyhow::{Context, Result};
use calmerge_core::Settings;
use calmerge_core::fetch::DomainConfig;
use calmerge_core::fetch::domain_config::{decode_key, encrypt_domain_config};
use owo_colors::OwoColorize;

pub struct EncryptArgs {
    pub domain: String,
    pub user_agent: Option<String>,
    pub accept: Option<String>,
    pub headers: Vec<String>,
    pub notes: Option<String>,
}

pub fn generate_key() -> Result<()> {
    println!("{}", calmerge_core::fetch::domain_config::generate_key());
    Ok(())
}

/// Encrypt an override with the key from the configured environment variable.
/// The blob goes to stdout, ready to paste into `domain_configs.encrypted`.
pub fn encrypt(settings: &Settings, args: EncryptArgs) -> Result<()> {
    let key_env = &settings.domain_configs.key_env;
    let key = std::env::var(key_env).with_context(|| {
        format!("{key_env} is not set. Generate a key with:\n  calmerge domain-config generate-key")
    })?;
    let key = decode_key(&key)?;

    let config = DomainConfig {
        domain: args.domain.trim().to_ascii_lowercase(),
        user_agent: args.user_agent,
        accept: args.accept,
        additional_headers: parse_headers(&args.headers)?,
        notes: args.notes,
    };
    if config.domain.is_empty() {
        anyhow::bail!("Domain must not be empty");
    }

    let blob = encrypt_domain_config(&key, &config)?;
    eprintln!("{} Encrypted override for {}", "✓".green(), config.domain);
    println!("{blob}");
    Ok(())
}

fn parse_headers(headers: &[String]) -> Result<BTreeMap<String, String>> {
    headers
        .iter()
        .map(|header| match header.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => anyhow::bail!("Invalid header '{header}', expected NAME=VALUE"),
        })
        .collect()
}
