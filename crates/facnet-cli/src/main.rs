use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "facnet")]
#[command(about = "Facnet RAMQ billing validation operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validation run commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Register an already-uploaded file as a validation run and enqueue it.
    Enqueue {
        /// Id of a row already present in uploaded_files
        #[arg(long)]
        file_id: Uuid,

        /// Original file name, echoed back onto the run row
        #[arg(long)]
        file_name: String,

        /// Id of the user who owns this run
        #[arg(long)]
        owner: Uuid,

        /// Retry budget handed to the queue
        #[arg(long, default_value_t = 3)]
        max_attempts: i32,
    },

    /// Print a run's current status, progress and error message (if any).
    Status {
        #[arg(long)]
        run_id: Uuid,
    },

    /// Soft-delete validation runs older than the given number of days.
    CleanupOld {
        #[arg(long, default_value_t = 90)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = facnet_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = facnet_db::status(&pool).await?;
                    println!("db_ok={} has_runs_table={}", s.ok, s.has_runs_table);
                }
                DbCmd::Migrate => {
                    facnet_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = facnet_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Run { cmd } => match cmd {
            RunCmd::Enqueue { file_id, file_name, owner, max_attempts } => {
                let pool = facnet_db::connect_from_env().await?;

                facnet_db::get_uploaded_file(&pool, file_id)
                    .await?
                    .with_context(|| format!("no uploaded_files row for {file_id}; upload it first"))?;

                let run = facnet_db::create_validation_run(
                    &pool,
                    &facnet_db::NewValidationRun {
                        file_id,
                        file_name,
                        created_by: owner,
                    },
                )
                .await?;

                let newly_enqueued = facnet_queue::enqueue(&pool, run.id, max_attempts).await?;

                println!("run_id={}", run.id);
                println!("status={:?}", run.status);
                println!("newly_enqueued={newly_enqueued}");
            }

            RunCmd::Status { run_id } => {
                let pool = facnet_db::connect_from_env().await?;
                let run = facnet_db::get_validation_run(&pool, run_id)
                    .await?
                    .with_context(|| format!("no validation_runs row for {run_id}"))?;

                println!("run_id={}", run.id);
                println!("status={:?}", run.status);
                println!("progress={}", run.progress);
                if let Some(err) = run.error_message {
                    println!("error_message={err}");
                }
            }

            RunCmd::CleanupOld { days } => {
                let pool = facnet_db::connect_from_env().await?;
                let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
                let affected = facnet_db::cleanup_old_validations(&pool, cutoff).await?;
                println!("cleaned_up={affected}");
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
