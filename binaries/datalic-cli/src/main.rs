//! datalic CLI
//!
//! Browse, publish and license datasets, and reveal a license's price
//! after signing the session attestation.

mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use datalic_config::{BackendKind, DatalicConfig};
use datalic_core::{Category, License, LicenseDraft, LicenseId};
use datalic_registry::{LicenseRegistry, ListingQuery};
use datalic_reveal::{AttestationParams, HmacSigner, RevealFlow, StaticNetwork};
use datalic_store::{KvBackend, MemoryBackend, SqliteBackend};
use prompt::PromptSigner;

#[derive(Parser)]
#[command(name = "datalic")]
#[command(about = "Dataset license registry with signature-gated price reveal")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/datalic/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List licenses, longest duration first
    List {
        /// Case-insensitive match on the dataset name
        #[arg(short, long)]
        search: Option<String>,

        /// Only this category
        #[arg(short, long)]
        category: Option<Category>,
    },

    /// Show registry counts
    Stats,

    /// Publish a new dataset license
    Create {
        /// Dataset name
        #[arg(short, long)]
        name: String,

        /// Price; stored protected
        #[arg(short, long)]
        price: f64,

        /// License duration in days
        #[arg(short, long)]
        duration: u32,

        #[arg(short, long, default_value = "genomics")]
        category: Category,

        /// Owner address
        #[arg(short, long)]
        owner: String,
    },

    /// License a dataset (marks it unavailable)
    Purchase {
        id: String,
    },

    /// Show one license with its protected price
    Show {
        id: String,
    },

    /// Sign the session attestation and reveal the price
    Reveal {
        id: String,

        /// Sign without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the attestation message a reveal would ask to sign
    Message,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let config = match &cli.config {
        Some(path) => DatalicConfig::load_from(path),
        None => DatalicConfig::load(),
    }
    .context("loading configuration")?;

    match cli.command {
        Commands::List { search, category } => cmd_list(&config, search, category).await,
        Commands::Stats => cmd_stats(&config).await,
        Commands::Create {
            name,
            price,
            duration,
            category,
            owner,
        } => {
            let draft = LicenseDraft {
                dataset_name: name,
                price,
                duration_days: duration,
                category,
                owner,
            };
            cmd_create(&config, draft).await
        }
        Commands::Purchase { id } => cmd_purchase(&config, id).await,
        Commands::Show { id } => cmd_show(&config, id).await,
        Commands::Reveal { id, yes } => cmd_reveal(&config, id, yes).await,
        Commands::Message => cmd_message(&config).await,
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("datalic=info".parse().context("log directive")?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn open_backend(config: &DatalicConfig) -> Result<Arc<dyn KvBackend>> {
    match config.store.backend {
        BackendKind::Memory => {
            tracing::warn!("Using in-memory store; nothing will persist");
            Ok(Arc::new(MemoryBackend::new()))
        }
        BackendKind::Sqlite => {
            let path = config.store.resolved_path();
            let backend = SqliteBackend::open(&path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            Ok(Arc::new(backend))
        }
    }
}

fn open_registry(config: &DatalicConfig) -> Result<LicenseRegistry> {
    Ok(LicenseRegistry::new(open_backend(config)?))
}

async fn establish_session(config: &DatalicConfig) -> Result<AttestationParams> {
    let network = StaticNetwork::new(config.network.contract_address.clone(), config.chain_id()?);
    let params = AttestationParams::establish(&network, config.attestation.validity_days).await?;
    Ok(params)
}

async fn cmd_list(config: &DatalicConfig, search: Option<String>, category: Option<Category>) -> Result<()> {
    let registry = open_registry(config)?;
    let query = ListingQuery { search, category };
    let listing = registry.scan().await?;
    let licenses = query.apply(listing.licenses);

    if licenses.is_empty() {
        println!("No licenses found.");
    } else {
        println!("{:<24} {:<32} {:<14} {:>6}  {}", "ID", "DATASET", "CATEGORY", "DAYS", "STATUS");
        for license in &licenses {
            println!("{}", format_row(license));
        }
    }
    if !listing.skipped.is_empty() {
        eprintln!("{} record(s) could not be read:", listing.skipped.len());
        for skipped in &listing.skipped {
            eprintln!("  {}: {}", skipped.id, skipped.reason);
        }
    }
    Ok(())
}

async fn cmd_stats(config: &DatalicConfig) -> Result<()> {
    let stats = open_registry(config)?.stats().await?;
    println!("Total licenses:     {}", stats.total);
    println!("Available:          {}", stats.available);
    println!("Licensed:           {}", stats.licensed);
    println!("Categories:         {}", stats.categories);
    Ok(())
}

async fn cmd_create(config: &DatalicConfig, draft: LicenseDraft) -> Result<()> {
    let registry = open_registry(config)?;
    let id = registry.create(draft).await.context("creating license")?;
    println!("Created license {}", id);
    Ok(())
}

async fn cmd_purchase(config: &DatalicConfig, id: String) -> Result<()> {
    let registry = open_registry(config)?;
    let id = LicenseId::from(id);
    registry
        .purchase(&id)
        .await
        .with_context(|| format!("licensing {}", id))?;
    println!("Licensed {}", id);
    Ok(())
}

async fn cmd_show(config: &DatalicConfig, id: String) -> Result<()> {
    let license = open_registry(config)?.get(&LicenseId::from(id)).await?;
    println!("{}", serde_json::to_string_pretty(&license.to_document())?);
    println!("status: {}", license.status());
    Ok(())
}

async fn cmd_reveal(config: &DatalicConfig, id: String, yes: bool) -> Result<()> {
    let registry = open_registry(config)?;
    let license = registry.get(&LicenseId::from(id)).await?;

    let key_path = config.signer.resolved_key_path();
    let signer = PromptSigner::new(HmacSigner::load_or_create(&key_path)?, yes);
    let flow = RevealFlow::new(establish_session(config).await?, registry.codec())
        .with_sign_timeout(Duration::from_secs(config.attestation.sign_timeout_secs));

    match flow.reveal_license(&license, &signer).await {
        Ok(price) => {
            println!("{}: {}", license.dataset_name, price);
            Ok(())
        }
        Err(e) if e.is_user_rejected() => {
            println!("Signature declined. The price stays hidden; run reveal again any time.");
            Ok(())
        }
        Err(e) => Err(e).context("revealing price"),
    }
}

async fn cmd_message(config: &DatalicConfig) -> Result<()> {
    let params = establish_session(config).await?;
    println!("{}", params.message());
    if let Some(expiry) = chrono::DateTime::from_timestamp(params.expires_at(), 0) {
        eprintln!("valid until {}", expiry.to_rfc3339());
    }
    Ok(())
}

fn format_row(license: &License) -> String {
    format!(
        "{:<24} {:<32} {:<14} {:>6}  {}",
        license.id,
        truncate(&license.dataset_name, 32),
        license.category,
        license.duration_days,
        license.status()
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalic_core::ProtectedValue;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["datalic", "list", "--category", "imaging"]).unwrap();
        match cli.command {
            Commands::List { search, category } => {
                assert!(search.is_none());
                assert_eq!(category, Some(Category::Imaging));
            }
            _ => panic!("expected list"),
        }

        let cli = Cli::try_parse_from([
            "datalic", "create", "--name", "Cohort", "--price", "12.5", "--duration", "30", "--owner", "0xo",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Create { category: Category::Genomics, .. }));

        assert!(Cli::try_parse_from(["datalic", "list", "--category", "astrology"]).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long dataset name", 10), "a very ...");
    }

    #[test]
    fn test_format_row_hides_price() {
        let license = License {
            id: LicenseId::from("1-abc"),
            dataset_name: "Cohort".into(),
            protected_price: ProtectedValue::from_stored("FHE-MTIuNQ=="),
            duration_days: 30,
            owner: "0xo".into(),
            category: Category::Clinical,
            is_available: true,
        };
        let row = format_row(&license);
        assert!(row.contains("Cohort"));
        assert!(!row.contains("FHE-"));
        assert!(!row.contains("12.5"));
    }

    #[tokio::test]
    async fn test_sqlite_backend_from_config() {
        let dir = tempdir().unwrap();
        let mut config = DatalicConfig::default();
        config.store.path = Some(dir.path().join("nested").join("store.db"));

        let backend = open_backend(&config).unwrap();
        assert!(backend.is_available().await);
        assert!(dir.path().join("nested").join("store.db").exists());
    }
}
