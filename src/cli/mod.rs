//! # recordctl
//!
//! Command-line companion for the vault-records service.
//!
//! ## Usage
//!
//! ```bash
//! # Translate a connection string (read from stdin) into an ODBC string
//! az keyvault secret show --vault-name my-vault -n sql-conn-string --query value -o tsv \
//!     | recordctl translate --dialect odbc
//!
//! # Translate an inline string into TDS parameters, password included
//! recordctl translate --dialect tds --raw "Server=tcp:db,1433;Database=app;Uid=u;Pwd=p" --show-password
//!
//! # Run the status pipeline of a running server
//! recordctl status --url https://my-app.azurewebsites.net
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, Read};
use std::time::Duration;
use vault_records::connection_string::{translate, Dialect, RawConnectionString, Translated};
use vault_records::service::StatusReport;

/// Vault Records CLI
#[derive(Parser)]
#[command(name = "recordctl")]
#[command(
    about = "Vault Records CLI",
    long_about = None,
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_HASH"), ")"),
    after_help = "\
Examples:
  recordctl translate --dialect odbc < conn.txt
  recordctl translate --dialect tds --raw \"Server=db;Database=app;Uid=u;Pwd=p\"
  recordctl status --url http://localhost:8000
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate an ADO.NET-style connection string into another dialect
    Translate {
        /// Output dialect
        #[arg(short, long, value_enum, default_value_t = DialectArg::Odbc)]
        dialect: DialectArg,

        /// Connection string; read from stdin when omitted
        #[arg(long, value_name = "CONNECTION_STRING")]
        raw: Option<String>,

        /// Print the password instead of `***`
        #[arg(long)]
        show_password: bool,
    },
    /// Run the status pipeline of a running server and print each step
    Status {
        /// Base URL of the server
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,

        /// Print the raw JSON report
        #[arg(long)]
        json: bool,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    /// Native TDS parameters
    Tds,
    /// ODBC connection string
    Odbc,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Tds => Dialect::Tds,
            DialectArg::Odbc => Dialect::Odbc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recordctl=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Translate {
            dialect,
            raw,
            show_password,
        } => translate_command(dialect.into(), raw, show_password),
        Commands::Status { url, json, timeout } => {
            status_command(&url, json, Duration::from_secs(timeout)).await
        }
    }
}

fn translate_command(dialect: Dialect, raw: Option<String>, show_password: bool) -> Result<()> {
    let raw = match raw {
        Some(raw) => RawConnectionString::from(raw),
        None => {
            let mut stdin = std::io::stdin();
            if stdin.is_terminal() {
                anyhow::bail!("No connection string given. Pass --raw or pipe one on stdin.");
            }
            let mut buffer = String::new();
            stdin
                .read_to_string(&mut buffer)
                .context("Failed to read connection string from stdin")?;
            RawConnectionString::from(buffer)
        }
    };

    let translated = translate(&raw, dialect)?;
    drop(raw);

    if show_password {
        match &translated {
            Translated::Tds(target) => {
                let (server, username, password, database) = target.as_tuple();
                println!("server={server}");
                println!("username={username}");
                println!("password={password}");
                println!("database={database}");
                println!("port={}", target.port);
                println!("encrypt={}", target.encrypt);
                println!("trustServerCertificate={}", target.trust_server_certificate);
            }
            Translated::Odbc(odbc) => println!("{}", odbc.expose()),
        }
    } else {
        println!("{}", translated.redacted());
    }
    Ok(())
}

async fn status_command(base_url: &str, json: bool, timeout: Duration) -> Result<()> {
    let url = format!("{}/status", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?
        .error_for_status()
        .with_context(|| format!("{url} returned an error status"))?;
    let report: StatusReport = response
        .json()
        .await
        .context("Failed to parse status report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for step in &report.steps {
            println!("{}  {}", step.timestamp.to_rfc3339(), step.step);
        }
    }

    if !report.is_ok() {
        anyhow::bail!("pipeline reported an error");
    }
    if !json {
        println!("\n✅ Pipeline OK");
    }
    Ok(())
}
