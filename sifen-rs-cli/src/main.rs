use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sifen_core::api::{ClientIdentity, QueryKind, SifenClient};
use sifen_core::config::{Config, EnvironmentType};
use sifen_core::pipeline::Pipeline;
use sifen_core::response::decode_response;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sifen")]
#[command(about = "Sign and submit SIFEN electronic documents")]
struct Cli {
    /// Target environment (test, prod)
    #[arg(long, global = true, default_value = "test")]
    env: EnvironmentType,

    /// Log filter, e.g. `info` or `sifen_core=debug`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Accept any server certificate chain
    #[arg(long, global = true)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a JSON batch of job descriptors
    Process {
        /// Batch file, or `-` for stdin
        #[arg(long)]
        batch: String,
    },
    /// Sign a document and derive its QR without submitting it
    Sign {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        destination: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        certificate: PathBuf,
    },
    /// Submit an already signed document
    Submit {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        p12: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(long)]
        url: Option<String>,
    },
    /// Look up a taxpayer (ruc), a document (cdc) or a batch (lote)
    Query {
        #[arg(long)]
        kind: QueryKind,
        #[arg(long)]
        id: String,
        #[arg(long)]
        p12: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(long)]
        url: Option<String>,
    },
    /// Decode a saved service response
    DecodeResponse {
        #[arg(long)]
        response: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = Config::new(cli.env).with_accept_invalid_server_certs(cli.insecure);
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    debug!(
        env = config.env().as_str(),
        insecure = cli.insecure,
        timeout = ?config.timeout(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Process { batch } => {
            let input = read_batch(&batch)?;
            let result = Pipeline::new(config).process_batch(&input).await;
            println!("{}", result.to_json()?);
        }
        Commands::Sign {
            source,
            destination,
            key,
            certificate,
        } => {
            let qr = Pipeline::new(config)
                .sign_to_file(&source, &destination, &key, &certificate)
                .with_context(|| format!("signing {}", source.display()))?;
            if let Some(qr) = qr {
                println!("{qr}");
            }
        }
        Commands::Submit {
            document,
            p12,
            password,
            url,
        } => {
            let url = url.unwrap_or_else(|| config.env().receive_document_url());
            let identity = ClientIdentity::from_pkcs12_file(&p12, &password)?;
            let client = SifenClient::new(&config, Some(identity))?;
            let result = client
                .submit_file(&url, &document)
                .await
                .with_context(|| format!("submitting {} to {url}", document.display()))?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Commands::Query {
            kind,
            id,
            p12,
            password,
            url,
        } => {
            let url = url.unwrap_or_else(|| kind.url(config.env()));
            let identity = ClientIdentity::from_pkcs12_file(&p12, &password)?;
            let client = SifenClient::new(&config, Some(identity))?;
            let response = client
                .query(&url, kind, &id)
                .await
                .with_context(|| format!("querying {url}"))?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::DecodeResponse { response } => {
            let body = std::fs::read(&response)
                .with_context(|| format!("reading {}", response.display()))?;
            let result = decode_response(&String::from_utf8_lossy(&body));
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}

fn read_batch(batch: &str) -> Result<String> {
    if batch == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("reading batch from stdin")?;
        Ok(input)
    } else {
        std::fs::read_to_string(batch).with_context(|| format!("reading batch {batch}"))
    }
}
