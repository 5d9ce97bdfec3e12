use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mailprobe_lib::{BatchRequest, TlsPolicy, VerifierConfig};

#[derive(Parser)]
#[command(name = "mailprobe-cli", version)]
pub struct Cli {
    /// adresses à vérifier
    pub emails: Vec<String>,

    /// liste d'adresses séparées par des virgules
    #[arg(long)]
    pub list: Option<String>,

    /// lit des adresses depuis stdin (une par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// fichier de configuration TOML
    #[arg(long, env = "MAILPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// expéditeur annoncé dans MAIL FROM
    #[arg(long = "from")]
    pub sender: Option<String>,

    /// nom annoncé dans EHLO/HELO
    #[arg(long)]
    pub helo: Option<String>,

    /// port SMTP (25 par défaut)
    #[arg(long)]
    pub port: Option<u16>,

    /// délai max de la requête MX (ms)
    #[arg(long)]
    pub dns_timeout_ms: Option<u64>,

    /// délai max de connexion + bannière (ms)
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// délai max par commande SMTP (ms)
    #[arg(long)]
    pub command_timeout_ms: Option<u64>,

    /// n'essaie jamais STARTTLS
    #[arg(long)]
    pub no_starttls: bool,

    /// vérifie le certificat du serveur MX après STARTTLS
    #[arg(long)]
    pub tls_verify: bool,

    /// nombre max de vérifications simultanées
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// identité de l'appelant pour le quota
    #[arg(long, default_value = "cli")]
    pub caller: String,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// niveau de logs (sinon RUST_LOG, défaut: warn)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Defaults, then the config file, then flags.
    pub fn verifier_config(&self) -> Result<VerifierConfig> {
        let mut config = match &self.config {
            Some(path) => VerifierConfig::load(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => VerifierConfig::default(),
        };

        if let Some(sender) = &self.sender {
            config.sender = sender.clone();
        }
        if let Some(helo) = &self.helo {
            config.helo_domain = helo.clone();
        }
        if let Some(port) = self.port {
            config.smtp_port = port;
        }
        if let Some(ms) = self.dns_timeout_ms {
            config.dns_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.command_timeout_ms {
            config.command_timeout = Duration::from_millis(ms);
        }
        if self.no_starttls {
            config.tls_policy = TlsPolicy::Disabled;
        }
        if self.tls_verify {
            config.tls_verify = true;
        }
        if self.max_concurrency.is_some() {
            config.max_concurrency = self.max_concurrency;
        }

        config.validate().context("invalid settings")?;
        Ok(config)
    }

    /// Positional addresses, then `--list`, then stdin. Blank entries are skipped.
    pub fn request(&self) -> Result<BatchRequest> {
        let mut emails: Vec<String> = self
            .emails
            .iter()
            .map(|email| email.trim())
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect();

        if let Some(list) = &self.list {
            emails.extend(BatchRequest::from_form(list).emails);
        }

        if self.stdin {
            for line in io::stdin().lock().lines() {
                let line = line.context("read stdin")?;
                let email = line.trim();
                if !email.is_empty() {
                    emails.push(email.to_string());
                }
            }
        }
        Ok(BatchRequest::new(emails))
    }
}
