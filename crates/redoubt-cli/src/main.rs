//! redoubt: encrypted, authenticated store for secrets and small
//! documents.
//!
//! Usage:
//!   redoubt [--config ~/.config/redoubt.toml] <command>
//!
//! This front-end drives passphrase-only (NOAUTH) vaults and recovery
//! bundles; server-bound vaults additionally need the escrow transport
//! deployed alongside it.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use redoubt_core::config::RedoubtConfig;
use redoubt_core::VaultFlags;
use redoubt_vault::{AuthSetup, InitParams, OpenParams, Vault};
use secrecy::SecretString;
use tracing::info;

/// Environment variable for non-interactive passphrase entry.
const PASSPHRASE_ENV: &str = "REDOUBT_PASSPHRASE";

#[derive(Parser, Debug)]
#[command(name = "redoubt", version, about = "encrypted secret and document store")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short = 'c', env = "REDOUBT_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REDOUBT_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "REDOUBT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new vault in a directory
    Init {
        /// Vault directory (must exist)
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Client UID: a UUID in hex representation
        #[arg(long)]
        uid: String,
        /// Cipher: aes256-cbc, chacha20, aes256-gcm, chacha20-poly1305
        #[arg(long)]
        cipher: Option<String>,
        /// Passphrase-only vault: skip escrow server registration
        #[arg(long)]
        noauth: bool,
        /// Escrow server URL
        #[arg(long, short = 's', env = "REDOUBT_SERVER")]
        server: Option<String>,
    },
    /// Open a vault, verify it and report its parameters
    Check {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Open with a recovery bundle instead of a passphrase
        #[arg(long)]
        recovery: Option<PathBuf>,
    },
    /// Encrypt a file (or stdin) into the vault
    Put {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Name inside the vault
        name: String,
        /// Source file; stdin when omitted
        input: Option<PathBuf>,
    },
    /// Decrypt a vault entry to a file (or stdout)
    Get {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Name inside the vault
        name: String,
        /// Destination file; stdout when omitted
        output: Option<PathBuf>,
    },
    /// List vault entries
    Ls {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Write the recovery bundle (metadata + effective key, cleartext)
    Export {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Destination file; stdout when omitted
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Init {
            path,
            uid,
            cipher,
            noauth,
            server,
        } => cmd_init(&config, &path, &uid, cipher.as_deref(), noauth, server),
        Command::Check { path, recovery } => cmd_check(&path, recovery.as_deref()),
        Command::Put { path, name, input } => cmd_put(&path, &name, input.as_deref()),
        Command::Get { path, name, output } => cmd_get(&path, &name, output.as_deref()),
        Command::Ls { path } => cmd_ls(&path),
        Command::Export { path, output } => cmd_export(&path, output.as_deref()),
    }
}

fn cmd_init(
    config: &RedoubtConfig,
    path: &std::path::Path,
    uid: &str,
    cipher: Option<&str>,
    noauth: bool,
    server: Option<String>,
) -> Result<()> {
    if !noauth && server.or_else(|| config.server_url()).is_some() {
        bail!(
            "server-bound vaults need the escrow transport deployed; \
             this front-end manages passphrase-only vaults (--noauth)"
        );
    }
    if !noauth {
        bail!("no server URL specified; pass --noauth for a passphrase-only vault");
    }

    let passphrase = read_passphrase(true)?;
    let cipher = cipher.or(config.vault.cipher.as_deref());

    let params = InitParams {
        path,
        passphrase: &passphrase,
        uid,
        cipher,
        flags: VaultFlags::NOAUTH,
        server_url: None,
        auth: AuthSetup::default(),
        kdf: config.kdf,
    };
    Vault::init(&params, None)?;

    println!("vault initialized at {}", path.display());
    Ok(())
}

fn cmd_check(path: &std::path::Path, recovery: Option<&std::path::Path>) -> Result<()> {
    let vault = open_vault(path, recovery)?;
    println!("vault:   {}", vault.base_path().display());
    println!("cipher:  {}", vault.cipher().name());
    println!("uid:     {}", vault.uid());
    println!(
        "mode:    {}",
        if vault.is_noauth() {
            "passphrase-only"
        } else {
            "server-bound"
        }
    );
    vault.close()?;
    Ok(())
}

fn cmd_put(path: &std::path::Path, name: &str, input: Option<&std::path::Path>) -> Result<()> {
    let data = match input {
        Some(file) => fs::read(file).with_context(|| format!("reading {}", file.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let vault = open_vault(path, None)?;
    let obj = vault.open_object(name)?;
    obj.write(&vault, &data)?;
    info!(name, bytes = data.len(), "entry stored");
    obj.close(&vault);
    vault.close()?;
    Ok(())
}

fn cmd_get(path: &std::path::Path, name: &str, output: Option<&std::path::Path>) -> Result<()> {
    let vault = open_vault(path, None)?;
    let obj = vault.open_object(name)?;
    let data = obj.read(&vault)?;

    match output {
        Some(file) => {
            fs::write(file, data.as_slice())
                .with_context(|| format!("writing {}", file.display()))?;
        }
        None => std::io::stdout().write_all(&data)?,
    }
    obj.close(&vault);
    vault.close()?;
    Ok(())
}

fn cmd_ls(path: &std::path::Path) -> Result<()> {
    let vault = open_vault(path, None)?;
    for name in vault.list_dir()? {
        println!("{name}");
    }
    vault.close()?;
    Ok(())
}

fn cmd_export(path: &std::path::Path, output: Option<&std::path::Path>) -> Result<()> {
    let vault = open_vault(path, None)?;
    match output {
        Some(file) => {
            let mut out = fs::File::create(file)?;
            vault.export_recovery(&mut out)?;
            eprintln!(
                "recovery bundle written to {}; print it and store it offline",
                file.display()
            );
        }
        None => vault.export_recovery(&mut std::io::stdout())?,
    }
    vault.close()?;
    Ok(())
}

fn open_vault(path: &std::path::Path, recovery: Option<&std::path::Path>) -> Result<Vault> {
    if let Some(bundle) = recovery {
        return Ok(Vault::open_ekey(path, bundle)?);
    }
    let passphrase = read_passphrase(false)?;
    let params = OpenParams {
        path,
        passphrase: &passphrase,
        server_url: None,
        totp: None,
    };
    Ok(Vault::open(&params, None)?)
}

/// Passphrase from the environment (scripting) or an interactive
/// prompt, with confirmation when creating a vault.
fn read_passphrase(confirm: bool) -> Result<SecretString> {
    if let Ok(pass) = std::env::var(PASSPHRASE_ENV) {
        if !pass.is_empty() {
            return Ok(SecretString::from(pass));
        }
    }

    let mut prompt = dialoguer::Password::new().with_prompt("Passphrase");
    if confirm {
        prompt = prompt.with_confirmation("Confirm passphrase", "passphrases do not match");
    }
    let pass = prompt.interact().context("reading passphrase")?;
    Ok(SecretString::from(pass))
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("redoubt.toml"))
        .unwrap_or_else(|| PathBuf::from("redoubt.toml"))
}

fn load_config(path: &PathBuf) -> Result<RedoubtConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    } else {
        Ok(RedoubtConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
