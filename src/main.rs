//! pg-migration-gen CLI
//!
//! Entry point for the command-line tool.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use pg_migration_gen::db::{ConnectionSettings, PoolSettings};
use pg_migration_gen::output::Format;
use pg_migration_gen::pipeline::{MigrateOptions, MigrationPipeline};
use pg_migration_gen::{Config, files};

#[derive(Parser, Debug)]
#[command(name = "pg-migration-gen")]
#[command(about = "Declarative PostgreSQL migration generator", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PG_MIGRATION_GEN_CONFIG",
        default_value = "pg-migration-gen.toml"
    )]
    config: PathBuf,

    /// Deadline for the whole run, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct ConnectionArgs {
    /// Connection URL (overrides the individual connection flags)
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    dbname: Option<String>,

    /// disable, prefer or require
    #[arg(long)]
    sslmode: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a migration pair from declarations vs. the live schema
    Migrate {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Source directory holding annotated declarations
        #[arg(long)]
        package: Option<PathBuf>,

        /// Directory migration files are written into
        #[arg(long)]
        output: Option<PathBuf>,

        /// Label for the migration filename
        #[arg(long, default_value = "migration")]
        name: String,

        /// Print the statements instead of writing files
        #[arg(long)]
        dry_run: bool,

        /// Apply the up statements to the database
        #[arg(long)]
        push: bool,

        /// Emit destructive statements instead of blocking them
        #[arg(long)]
        allow_destructive: bool,

        /// Create the target database when missing; diff against empty
        #[arg(long)]
        create_if_not_exists: bool,

        /// Diff through a scratch database instead of in memory
        #[arg(long)]
        via_tempdb: bool,
    },

    /// Emit the declared DDL only; no database contact
    Generate {
        #[arg(long)]
        package: Option<PathBuf>,
    },

    /// Compare live schema against declarations; exit 0 iff no differences
    Verify {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[arg(long)]
        package: Option<PathBuf>,
    },

    /// Emit the live schema in a chosen format
    Introspect {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// sql, json, yaml, markdown, dot or rust
        #[arg(long, default_value = "sql")]
        format: String,
    },

    /// Write an empty migration pair for hand-editing
    Create {
        name: String,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print build metadata
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config).context("Failed to load configuration")?
    } else {
        Config::default()
    };

    let result = match cli.timeout {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), run(cli.command, &config)).await
            {
                Ok(result) => result,
                Err(_) => Err(pg_migration_gen::Error::Timeout(secs).into()),
            }
        }
        None => run(cli.command, &config).await,
    };

    if let Err(ref e) = result
        && let Some(err) = e.downcast_ref::<pg_migration_gen::Error>()
    {
        eprintln!("error ({}): {err}", err.stage());
        std::process::exit(1);
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Migrate {
            connection,
            package,
            output,
            name,
            dry_run,
            push,
            allow_destructive,
            create_if_not_exists,
            via_tempdb,
        } => {
            let opts = MigrateOptions {
                allow_destructive,
                via_tempdb,
                create_if_not_exists,
            };
            let mut pipeline = build_pipeline(config, &connection, package);
            let outcome = pipeline.plan(opts).await?;

            println!("{}", outcome.summary);
            if !outcome.plan.blocked.is_empty() {
                println!(
                    "destructive blocked: {} (re-run with --allow-destructive)",
                    outcome.plan.blocked.len()
                );
            }

            if outcome.plan.is_empty() {
                println!("schema is up to date");
                return Ok(());
            }

            if dry_run {
                println!("\n-- up\n{}", outcome.plan.up_script());
                println!("\n-- down\n{}", outcome.plan.down_script());
                return Ok(());
            }

            let output_dir = output.unwrap_or_else(|| config.migrations.output.clone());
            let pair = files::write_pair(
                &output_dir,
                &files::timestamp_now(),
                &name,
                &outcome.plan.up_script(),
                &outcome.plan.down_script(),
            )?;
            println!("wrote {}", pair.up_path.display());
            println!("wrote {}", pair.down_path.display());

            if push {
                let report = pipeline.push(&outcome.plan, opts).await?;
                println!("applied {} statement(s)", report.executed);
            }
            Ok(())
        }

        Command::Generate { package } => {
            let pipeline = build_pipeline(config, &ConnectionArgs::default(), package);
            let realm = pipeline.declared_realm()?;
            let ddl = pg_migration_gen::output::render(&realm, Format::Sql)?;
            println!("{ddl}");
            Ok(())
        }

        Command::Verify {
            connection,
            package,
        } => {
            let mut pipeline = build_pipeline(config, &connection, package);
            if pipeline.verify().await? {
                println!("schema matches declarations");
                Ok(())
            } else {
                anyhow::bail!("schema differs from declarations");
            }
        }

        Command::Introspect { connection, format } => {
            let format = Format::parse(&format)?;
            let mut pipeline = build_pipeline(config, &connection, None);
            let realm = pipeline.introspect_live().await?;
            println!("{}", pg_migration_gen::output::render(&realm, format)?);
            Ok(())
        }

        Command::Create { name, output } => {
            let output_dir = output.unwrap_or_else(|| config.migrations.output.clone());
            let pair = files::write_empty_pair(&output_dir, &files::timestamp_now(), &name)?;
            println!("wrote {}", pair.up_path.display());
            println!("wrote {}", pair.down_path.display());
            Ok(())
        }

        Command::Version => {
            println!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
    }
}

/// Merge CLI connection flags over the config file and build the pipeline.
fn build_pipeline(
    config: &Config,
    connection: &ConnectionArgs,
    package: Option<PathBuf>,
) -> MigrationPipeline {
    let mut settings: ConnectionSettings = config.connection_settings();
    // Discrete flags override the config file (and clear a file-level
    // URL); an explicit --url wins over everything.
    if let Some(ref host) = connection.host {
        settings.host = host.clone();
        settings.url = None;
    }
    if let Some(port) = connection.port {
        settings.port = port;
        settings.url = None;
    }
    if let Some(ref user) = connection.user {
        settings.user = user.clone();
        settings.url = None;
    }
    if let Some(ref password) = connection.password {
        settings.password = Some(password.clone());
    }
    if let Some(ref dbname) = connection.dbname {
        settings.dbname = dbname.clone();
        settings.url = None;
    }
    if let Some(ref sslmode) = connection.sslmode {
        settings.sslmode = sslmode.clone();
    }
    if let Some(ref url) = connection.url {
        settings.url = Some(url.clone());
    }

    let package = package.unwrap_or_else(|| config.source.package.clone());
    let pool_settings: PoolSettings = config.pool_settings();
    MigrationPipeline::new(settings, pool_settings, package)
}
