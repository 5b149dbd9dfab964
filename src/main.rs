use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lazyfood::config::Config;
use lazyfood::db::{Database, SeedOptions};
use lazyfood::{logging, ops};

#[derive(Parser)]
#[command(name = "lazyfood")]
#[command(version, about = "LazyFood database bootstrap, seed, migration and rebuild", long_about = None)]
struct Cli {
    /// Path to config file (default: $LAZYFOOD_CONFIG or $XDG_CONFIG_HOME/lazyfood/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Mirror log records to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and make sure usuario.rol exists
    Init,
    /// Load lookup ingredients and recipes
    Seed {
        /// Also load the demo user with pantry, preferences and a planner entry
        #[arg(long)]
        demo: bool,
    },
    /// Add usuario.rol if missing and backfill the default admin
    Migrate,
    /// Init, seed and migrate in one go
    Bootstrap {
        /// Also load demo data
        #[arg(long)]
        demo: bool,
    },
    /// Print row counts per table
    Status,
    /// Delete session tokens past their expiry
    PurgeTokens,
    /// Stop, rebuild without cache and restart the container environment
    Rebuild {
        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Copy the configured SQLite database into PostgreSQL
    #[cfg(feature = "postgres")]
    Transfer {
        /// Target PostgreSQL URL
        #[arg(long)]
        to: String,
    },
}

fn open_database(config: &Config) -> Result<Database> {
    let db = Database::open(&config.database)?;
    db.initialize()?;
    Ok(db)
}

fn seed_options(config: &Config, demo: bool) -> SeedOptions {
    SeedOptions {
        demo_data: demo || config.seed.demo_data,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    if let Err(e) = logging::init(None, cli.verbose) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();

    match cli.command {
        Commands::Init => {
            open_database(&config)?;
            println!("Schema ready ({:?})", config.database.backend);
        }
        Commands::Seed { demo } => {
            let db = open_database(&config)?;
            let report = db.seed(&seed_options(&config, demo))?;
            println!(
                "Seeded {} ingredients, {} recipes ({} steps){}",
                report.ingredients_added,
                report.recipes_added,
                report.steps_added,
                if report.demo_user_created { ", demo user created" } else { "" }
            );
        }
        Commands::Migrate => {
            let db = Database::open(&config.database)?;
            db.create_schema()?;
            let report = db.migrate(&config.admin)?;
            print_migration(&report, &config.admin.email);
        }
        Commands::Bootstrap { demo } => {
            let db = Database::open(&config.database)?;
            db.create_schema()?;
            let seeded = db.seed(&seed_options(&config, demo))?;
            let migration = db.migrate(&config.admin)?;
            print_migration(&migration, &config.admin.email);
            println!(
                "Seeded {} ingredients, {} recipes ({} steps)",
                seeded.ingredients_added, seeded.recipes_added, seeded.steps_added
            );
        }
        Commands::Status => {
            let db = open_database(&config)?;
            println!("Backend: {:?}", db.backend());
            for (table, count) in db.table_counts()? {
                println!("  {:<20} {}", table, count);
            }
            let missing = config.service.missing_required();
            if !missing.is_empty() {
                println!("Unset service settings: {}", missing.join(", "));
            }
        }
        Commands::PurgeTokens => {
            let db = open_database(&config)?;
            let purged = db.purge_expired_tokens(Utc::now().naive_utc())?;
            println!("Purged {} expired tokens", purged);
        }
        Commands::Rebuild { dry_run } => {
            if dry_run {
                for command in ops::commands(&config.rebuild)? {
                    println!("{}", command);
                }
            } else {
                // The database clients are blocking, so only this command needs a runtime.
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(ops::rebuild(&config.rebuild))?;
                println!("Rebuild complete");
            }
        }
        #[cfg(feature = "postgres")]
        Commands::Transfer { to } => {
            let copied = lazyfood::db::transfer::copy_sqlite_to_postgres(&config.database.sqlite_path, &to)?;
            for (table, count) in copied {
                println!("  {:<20} {}", table, count);
            }
        }
    }

    Ok(())
}

fn print_migration(report: &lazyfood::db::MigrationReport, admin_email: &str) {
    if !report.changed() {
        println!("Migration: nothing to do");
        return;
    }
    if report.rol_column_added {
        println!("Migration: added usuario.rol");
    }
    if report.admin_created {
        println!("Migration: created admin {}", admin_email);
    }
}
