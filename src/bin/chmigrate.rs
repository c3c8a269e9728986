use anyhow::{Context, Result};
use chmigrate::*;
use clap::Parser;
use tracing::{debug, error, info, Level};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// clickhouse connection string
    #[clap(long)]
    database: Option<String>,

    /// path to ssl root certificate
    #[clap(long = "pem_path", alias = "pem-path")]
    pem_path: Option<String>,

    /// migrations path
    #[clap(long)]
    path: Option<String>,

    /// configuration file path (TOML)
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database: self.database.clone(),
            pem_path: self.pem_path.clone(),
            path: self.path.clone(),
        }
    }
}

/// Accept Go-style single-dash long flags (`-database=...`) by rewriting them
/// to `--database=...`. Single-letter flags such as `-h` are left alone.
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut terminated = false;
    args.into_iter()
        .enumerate()
        .map(|(idx, arg)| {
            if idx == 0 || terminated {
                return arg;
            }
            if arg == "--" {
                terminated = true;
                return arg;
            }
            let name = arg.split('=').next().unwrap_or_default();
            if name.len() > 2 && name.starts_with('-') && !name.starts_with("--") {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

fn run(cli: &Cli) -> Result<Applied> {
    let config =
        MigrateConfig::new(&cli.config, &cli.overrides()).context("failed to load configuration")?;
    debug!("configuration:\n{}", config.summary());

    let conn = ConnectionBuilder::new()
        .build(&config.connection_spec())
        .context("failed to create clickhouse storage")?;

    MigrationRunner::new(config.driver_config())
        .run(&conn, config.migrations_path())
        .context("failed to migrate")
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args())) {
        Ok(cli) => cli,
        // exits 2 on a usage error, 0 for --help and --version
        Err(e) => e.exit(),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    match run(&cli) {
        Ok(applied) => {
            debug!("applied versions: {:?}", applied.versions);
            info!("migration done");
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
