//! Collection Ledger - MTG card allocation and resumable bulk operations
//!
//! Command line front end: imports decklists, deletes containers, resumes or
//! abandons interrupted operations and edits allocations by hand.

use clap::{Parser, Subcommand, ValueEnum};
use collection_ledger::config::{default_checkpoint_dir, DEFAULT_SCRYFALL_URL};
use collection_ledger::{
    containers, database, export, inventory, ledger, BulkConfig, BulkOperationController,
    Checkpoint, CheckpointStore, ContainerEntry, ContainerKind, CsvDialect, DeleteRequest,
    ExportScope, FileCheckpointPort, ImportMode, ImportRequest, LogProgress, OperationGuard,
    OperationKind, OperationOutcome, OperationReport, OperationRequest, ScryfallCatalog, Section,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

type Controller = BulkOperationController<ScryfallCatalog, FileCheckpointPort>;

/// MTG collection ledger - allocate owned cards to decks and binders
#[derive(Parser, Debug)]
#[command(name = "collection_ledger")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Directory for operation checkpoints (default: next to the database)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Byte quota shared by all checkpoint files
    #[arg(long)]
    checkpoint_quota: Option<usize>,

    /// Scryfall API base URL
    #[arg(long, default_value = DEFAULT_SCRYFALL_URL)]
    scryfall_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a decklist file into a new deck or binder
    Import {
        /// Decklist file, one `<qty> <name> [(SET)] [*F*]` per line
        file: PathBuf,
        /// Name of the container to create
        #[arg(short, long)]
        name: String,
        /// Create a binder instead of a deck
        #[arg(long, default_value_t = false)]
        binder: bool,
        /// Deck format, e.g. "modern"
        #[arg(long)]
        format: Option<String>,
        /// Skip sideboard lines
        #[arg(long, default_value_t = false)]
        no_sideboard: bool,
        /// Record the cards as wanted instead of owned
        #[arg(long, default_value_t = false)]
        wishlist: bool,
    },
    /// Delete a container, optionally with the owned cards allocated to it
    Delete {
        container_id: i64,
        #[arg(long, default_value_t = false)]
        with_cards: bool,
    },
    /// Continue an interrupted operation
    Resume { kind: KindArg },
    /// Drop the checkpoint of an interrupted operation
    Abandon { kind: KindArg },
    /// Show unfinished operations
    Status,
    /// Export the collection or one container as CSV
    Export {
        /// Only cards allocated to this container
        #[arg(long)]
        container: Option<i64>,
        #[arg(long, value_enum, default_value_t = DialectArg::Standard)]
        dialect: DialectArg,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Allocate copies of a card to a container
    Allocate {
        container_id: i64,
        card_id: i64,
        quantity: u32,
        #[arg(long, value_enum, default_value_t = SectionArg::Mainboard)]
        section: SectionArg,
    },
    /// Change how many copies of a card are owned
    SetQuantity { card_id: i64, quantity: u32 },
    /// List containers, or the entries of one container
    List { container_id: Option<i64> },
    /// Convert a container's legacy wishlist lines into wishlist cards
    MigrateWishlist { container_id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Import,
    Delete,
}

impl From<KindArg> for OperationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Import => OperationKind::Import,
            KindArg::Delete => OperationKind::Delete,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DialectArg {
    Standard,
    Cardmarket,
}

impl From<DialectArg> for CsvDialect {
    fn from(dialect: DialectArg) -> Self {
        match dialect {
            DialectArg::Standard => CsvDialect::Standard,
            DialectArg::Cardmarket => CsvDialect::Cardmarket,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SectionArg {
    Mainboard,
    Sideboard,
}

impl From<SectionArg> for Section {
    fn from(section: SectionArg) -> Self {
        match section {
            SectionArg::Mainboard => Section::Mainboard,
            SectionArg::Sideboard => Section::Sideboard,
        }
    }
}

/// Returns the default database path: ~/.local/share/collection_ledger/collection.db
fn default_db_path() -> String {
    database::default_db_path().to_string_lossy().to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let db_path = PathBuf::from(&args.database);
    log::debug!("Database path: {}", db_path.display());
    let conn = database::open(&db_path)?;

    let checkpoint_dir = args
        .checkpoint_dir
        .clone()
        .unwrap_or_else(|| default_checkpoint_dir(&db_path));
    let port = FileCheckpointPort::with_quota(checkpoint_dir, args.checkpoint_quota);
    let controller = BulkOperationController::new(
        Arc::new(Mutex::new(conn)),
        ScryfallCatalog::new(&args.scryfall_url)?,
        CheckpointStore::new(port),
        Arc::new(OperationGuard::new()),
        BulkConfig::default(),
    );

    if !matches!(
        args.command,
        Command::Resume { .. } | Command::Abandon { .. } | Command::Status
    ) {
        offer_resume(&controller).await?;
    }

    match args.command {
        Command::Import {
            file,
            name,
            binder,
            format,
            no_sideboard,
            wishlist,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let kind = if binder {
                ContainerKind::Binder
            } else {
                ContainerKind::Deck {
                    format,
                    commander: None,
                }
            };
            let request = ImportRequest {
                container_name: name,
                kind,
                text,
                include_sideboard: !no_sideboard,
                mode: if wishlist {
                    ImportMode::Wishlist
                } else {
                    ImportMode::Collection
                },
            };
            let outcome = controller
                .start(OperationRequest::Import(request), &LogProgress)
                .await?;
            print_outcome(&outcome)
        }
        Command::Delete {
            container_id,
            with_cards,
        } => {
            let request = DeleteRequest {
                container_id,
                delete_cards: with_cards,
            };
            let outcome = controller
                .start(OperationRequest::Delete(request), &LogProgress)
                .await?;
            print_outcome(&outcome)
        }
        Command::Resume { kind } => {
            let outcome = controller.resume(kind.into(), &LogProgress).await?;
            print_outcome(&outcome)
        }
        Command::Abandon { kind } => {
            let kind = OperationKind::from(kind);
            if controller.abandon(kind).await? {
                println!("Abandoned the interrupted {}", kind.as_str());
            } else {
                println!("No {} to abandon", kind.as_str());
            }
            Ok(())
        }
        Command::Status => {
            let pending = controller.pending().await?;
            if pending.is_empty() {
                println!("No unfinished operations");
            }
            for record in &pending {
                println!("{}", describe(record));
            }
            Ok(())
        }
        Command::Export {
            container,
            dialect,
            output,
        } => {
            let scope = container.map_or(ExportScope::Collection, ExportScope::Container);
            let conn = controller.db().lock().await;
            let rows = match output {
                Some(path) => {
                    export::write_csv(&conn, scope, dialect.into(), std::fs::File::create(&path)?)?
                }
                None => export::write_csv(&conn, scope, dialect.into(), std::io::stdout().lock())?,
            };
            log::info!("Wrote {} rows", rows);
            Ok(())
        }
        Command::Allocate {
            container_id,
            card_id,
            quantity,
            section,
        } => {
            let mut conn = controller.db().lock().await;
            let outcome = ledger::allocate(&mut conn, container_id, card_id, quantity, section.into())?;
            println!(
                "Allocated {}, wishlisted {}",
                outcome.allocated, outcome.wishlisted
            );
            Ok(())
        }
        Command::SetQuantity { card_id, quantity } => {
            let mut conn = controller.db().lock().await;
            let trims = ledger::reduce_allocations_for_card(&mut conn, card_id, quantity)?;
            for trim in &trims {
                println!(
                    "Container {} {}: {} -> {}",
                    trim.container_id,
                    trim.section.as_str(),
                    trim.from,
                    trim.to
                );
            }
            println!("Card {} now owns {} copies", card_id, quantity);
            Ok(())
        }
        Command::List { container_id } => {
            let conn = controller.db().lock().await;
            match container_id {
                Some(id) => {
                    let container = containers::require_container(&conn, id)?;
                    println!("{} ({})", container.name, container.kind.as_str());
                    for entry in containers::entries(&conn, id)? {
                        println!("{}", describe_entry(&entry));
                    }
                }
                None => {
                    for c in containers::list_containers(&conn)? {
                        println!(
                            "{:>5}  {:<30} {:<6} {:>4} owned {:>4} wanted {:>5.1}%",
                            c.id,
                            c.name,
                            c.kind.as_str(),
                            c.stats.owned,
                            c.stats.wishlist,
                            c.stats.completion
                        );
                    }
                    println!("{} cards in inventory", inventory::get_card_count(&conn)?);
                }
            }
            Ok(())
        }
        Command::MigrateWishlist { container_id } => {
            let mut conn = controller.db().lock().await;
            let migrated = ledger::migrate_legacy_wishlist(&mut conn, container_id)?;
            println!("Migrated {} wishlist lines", migrated);
            Ok(())
        }
    }
}

/// Point at unfinished operations before starting new work
async fn offer_resume(controller: &Controller) -> Result<(), Box<dyn Error>> {
    for record in controller.pending().await? {
        log::warn!(
            "{}; run `resume {kind}` to continue or `abandon {kind}` to drop it",
            describe(&record),
            kind = record.kind().as_str()
        );
    }
    Ok(())
}

fn describe(record: &Checkpoint) -> String {
    match record {
        Checkpoint::Import(state) => format!(
            "Interrupted import into '{}' at stage {} ({} of {} cards processed, {} of {} allocated)",
            state.container_name,
            record.stage_name(),
            state.current_card,
            state.total_cards,
            state.allocated_count,
            state.created_cards.len()
        ),
        Checkpoint::Delete(state) => format!(
            "Interrupted delete of '{}' at stage {} ({} of {} cards removed)",
            state.container_name,
            record.stage_name(),
            state.succeeded + state.failed,
            state.card_count
        ),
    }
}

fn describe_entry(entry: &ContainerEntry) -> String {
    match entry {
        ContainerEntry::Owned {
            card_id,
            name,
            set_code,
            section,
            allocated_quantity,
            foil,
            ..
        } => format!(
            "  [{}] {}x {} ({}){} #{}",
            section.as_str(),
            allocated_quantity,
            name,
            set_code,
            if *foil { " *F*" } else { "" },
            card_id
        ),
        ContainerEntry::Wishlist {
            name,
            set_code,
            section,
            requested_quantity,
            ..
        } => format!(
            "  [{}] {}x {} ({}) wanted",
            section.as_str(),
            requested_quantity,
            name,
            set_code
        ),
    }
}

fn print_outcome(outcome: &OperationOutcome) -> Result<(), Box<dyn Error>> {
    match outcome {
        OperationOutcome::Completed(OperationReport::Import(report)) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OperationOutcome::Completed(OperationReport::Delete(report)) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OperationOutcome::Failed { stage, message } => {
            return Err(format!("Failed while {}: {}; run `resume` to retry", stage, message).into());
        }
        OperationOutcome::Rejected => {
            return Err("An operation of the same kind is already running".into());
        }
        OperationOutcome::NothingToResume => println!("Nothing to resume"),
    }
    Ok(())
}
