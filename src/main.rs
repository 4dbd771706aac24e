use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::warn;

use jobtrail::ai::{create_provider, AIProvider};
use jobtrail::config::AppConfig;
use jobtrail::db::Database;
use jobtrail::logging;
use jobtrail::models::{EmployerRecord, Message, Status};
use jobtrail::pipeline::{read_messages, Pipeline, ScanOptions, ScanReport};
use jobtrail::report::{export_csv, export_json, review_flags, truncate, Statistics};
use jobtrail::store::{MemoryStore, RecordStore};
use jobtrail::tracker::{annotate, clear_conflicts, manual_update, UpsertKind};

#[derive(Parser)]
#[command(name = "jobtrail")]
#[command(about = "Track job applications from recruiting emails")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the application database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Process exported messages and update application records
    Scan {
        /// JSON or JSON-lines file of messages
        #[arg(short, long)]
        input: PathBuf,

        /// Ask the AI collaborator about weak extractions
        #[arg(long)]
        use_ai: bool,

        /// Show what would change without saving anything
        #[arg(long)]
        preview: bool,

        /// Only process messages on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Stop after this many messages
        #[arg(short, long)]
        max: Option<usize>,

        /// Write the deletion plan to this file
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Classify a single message without touching the database
    Check {
        /// Sender address
        #[arg(short, long, default_value = "")]
        from: String,

        #[arg(short, long, default_value = "")]
        subject: String,

        #[arg(short, long, default_value = "")]
        body: String,

        #[arg(long)]
        starred: bool,

        #[arg(long)]
        attachments: bool,

        #[arg(long)]
        use_ai: bool,
    },

    /// List tracked applications
    List {
        /// Filter by status (applied, interviewing, rejected, offer)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by employer
        #[arg(short, long)]
        employer: Option<String>,

        /// Only applications with unreviewed conflicts
        #[arg(long)]
        conflicts: bool,
    },

    /// Show one application in detail
    Show {
        /// Employer name
        employer: String,
    },

    /// Summary statistics
    Stats,

    /// Export all applications
    Export {
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Set an application's status by hand
    Update {
        employer: String,

        /// New status (applied, interviewing, rejected, offer)
        status: String,

        /// Allow moving down the status hierarchy
        #[arg(long)]
        force: bool,
    },

    /// Attach a note to an application
    Note {
        employer: String,

        text: String,

        /// Keep existing notes
        #[arg(short, long)]
        append: bool,
    },

    /// Mark an application's conflicts as reviewed
    ClearConflict {
        employer: String,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Check the configuration for risky settings
    Validate,

    /// Write a default configuration file
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config {
        command: ConfigCommands::Init,
    } = &cli.command
    {
        let path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
        AppConfig::write_default(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.store.path = Some(db.clone());
    }
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.database_path())?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Scan {
            input,
            use_ai,
            preview,
            since,
            max,
            plan,
        } => {
            if use_ai {
                config.extraction.use_ai = true;
            }
            let options = ScanOptions {
                since: since.as_deref().map(parse_since).transpose()?,
                max_messages: max,
            };

            let messages = read_messages(&input)?;
            println!("Read {} message(s) from {}", messages.len(), input.display());

            let provider = collaborator(&config);
            let db = Database::open(&config.database_path())?;

            let report = if preview {
                let existing = if db.ensure_initialized().is_ok() { db.all()? } else { Vec::new() };
                let mut store = MemoryStore::from_records(existing);
                Pipeline::new(&mut store, &config)
                    .with_provider(provider.as_deref())
                    .run(messages, &options)?
            } else {
                db.ensure_initialized()?;
                let mut db = db;
                Pipeline::new(&mut db, &config)
                    .with_provider(provider.as_deref())
                    .run(messages, &options)?
            };

            print_scan_report(&report);

            if let Some(path) = plan {
                report.write_plan(&path)?;
                println!("\nDeletion plan written to {}", path.display());
            }
            if preview {
                println!("\n(Preview - no records were saved)");
            }
        }

        Commands::Check {
            from,
            subject,
            body,
            starred,
            attachments,
            use_ai,
        } => {
            if use_ai {
                config.extraction.use_ai = true;
            }
            let message = Message {
                id: "check".to_string(),
                sender: from,
                subject,
                body,
                starred,
                has_attachments: attachments,
                ..Default::default()
            };

            let provider = collaborator(&config);
            let mut scratch = MemoryStore::new();
            let processed = Pipeline::new(&mut scratch, &config)
                .with_provider(provider.as_deref())
                .process(&message)?;
            let result = &processed.extraction;

            println!("Employer:   {} ({})", result.employer, source_label(result.employer_source));
            println!("Position:   {} ({})", result.role, source_label(result.role_source));
            println!("Status:     {} ({} matching pattern(s))", result.status, result.status_evidence_count);
            println!("Confidence: {} ({:.2})", result.confidence, result.confidence_score);
            println!("Method:     {}", result.extraction_method.as_str());
            if !result.matched_patterns.is_empty() {
                println!("Matched:");
                for pattern in &result.matched_patterns {
                    println!("  {}", pattern);
                }
            }
            let verdict = if processed.deletion.should_delete { "delete" } else { "keep" };
            println!("Deletion:   {} - {}", verdict, processed.deletion.reason);
        }

        Commands::List {
            status,
            employer,
            conflicts,
        } => {
            let db = open_initialized(&config)?;
            let status = status.as_deref().map(str::parse::<Status>).transpose()?;
            let mut records = db.list(status, employer.as_deref())?;
            if conflicts {
                records.retain(EmployerRecord::has_conflict);
            }

            if records.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<3} {:<24} {:<28} {:<13} {:<7} {:<11} {:>6}",
                    "", "COMPANY", "POSITION", "STATUS", "CONF", "LAST SEEN", "EMAILS"
                );
                println!("{}", "-".repeat(97));
                for record in &records {
                    println!(
                        "{:<3} {:<24} {:<28} {:<13} {:<7} {:<11} {:>6}",
                        review_flags(record),
                        truncate(&record.employer, 24),
                        truncate(&record.role, 28),
                        record.status,
                        record.confidence,
                        record.last_seen.format("%Y-%m-%d"),
                        record.message_ids.len()
                    );
                }
                if records.iter().any(EmployerRecord::needs_review) {
                    println!("\n! = status conflict   ? = low confidence");
                }
            }
        }

        Commands::Show { employer } => {
            let db = open_initialized(&config)?;
            let record = db
                .find(&employer)?
                .ok_or_else(|| anyhow!("No application found for '{}'", employer))?;
            print_record(&record);
        }

        Commands::Stats => {
            let db = open_initialized(&config)?;
            let stats = Statistics::from_records(&db.all()?);
            if stats.total == 0 {
                println!("No applications tracked yet.");
                return Ok(());
            }

            println!("Applications: {} ({} emails)", stats.total, stats.messages);
            for status in Status::ALL {
                println!(
                    "  {:<14} {:>5}  ({:.1}%)",
                    status.as_str(),
                    stats.status_count(status),
                    stats.percent(status)
                );
            }
            println!("\nConfidence:");
            for (level, count) in stats.by_confidence.iter().rev() {
                println!("  {:<14} {:>5}", level.as_str(), count);
            }
            println!("\nConflicts:    {}", stats.conflicts);
            println!("Needs review: {}", stats.needs_review);
        }

        Commands::Export { format, output } => {
            let db = open_initialized(&config)?;
            let records = db.all()?;
            match format {
                ExportFormat::Json => export_json(&records, &output)?,
                ExportFormat::Csv => export_csv(&records, &output)?,
            }
            println!("Exported {} application(s) to {}", records.len(), output.display());
        }

        Commands::Update {
            employer,
            status,
            force,
        } => {
            let mut db = open_initialized(&config)?;
            let status: Status = status.parse()?;
            let outcome = manual_update(&mut db, &employer, status, force, Utc::now())?;
            if outcome.kind != UpsertKind::Updated {
                bail!("{}", outcome.reason);
            }
            db.flush()?;
            match outcome.previous_status {
                Some(previous) if previous != outcome.status => {
                    println!("Updated '{}': {} -> {}", outcome.employer, previous, outcome.status)
                }
                _ => println!("'{}' is already {}.", outcome.employer, outcome.status),
            }
        }

        Commands::Note {
            employer,
            text,
            append,
        } => {
            let mut db = open_initialized(&config)?;
            annotate(&mut db, &employer, &text, append)?;
            db.flush()?;
            println!("Note saved for '{}'.", employer);
        }

        Commands::ClearConflict { employer } => {
            let mut db = open_initialized(&config)?;
            let cleared = clear_conflicts(&mut db, &employer, Utc::now())?;
            db.flush()?;
            if cleared == 0 {
                println!("'{}' has no conflicts.", employer);
            } else {
                println!("Cleared {} conflict(s) for '{}'.", cleared, employer);
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Validate => {
                let warnings = config.validate();
                if warnings.is_empty() {
                    println!("Configuration OK.");
                } else {
                    for warning in &warnings {
                        println!("warning: {}", warning);
                    }
                }
            }
            // Written before the config is loaded.
            ConfigCommands::Init => {}
        },
    }

    Ok(())
}

fn open_initialized(config: &AppConfig) -> Result<Database> {
    let db = Database::open(&config.database_path())?;
    db.ensure_initialized()?;
    Ok(db)
}

/// Builds the collaborator when enabled. A provider that cannot be built is
/// logged and the run continues on patterns alone.
fn collaborator(config: &AppConfig) -> Option<Box<dyn AIProvider>> {
    if !config.extraction.use_ai {
        return None;
    }
    match create_provider(&config.ai) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "AI collaborator disabled");
            None
        }
    }
}

fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))?;
    date.and_hms_opt(0, 0, 0)
        .map(|at| at.and_utc())
        .ok_or_else(|| anyhow!("Invalid date '{}'", value))
}

fn source_label(source: Option<jobtrail::models::FieldSource>) -> &'static str {
    source.map(|s| s.as_str()).unwrap_or("not found")
}

fn print_scan_report(report: &ScanReport) {
    println!("\nResults:");
    println!("  Messages processed: {}", report.processed);
    if report.skipped > 0 {
        println!("  Skipped (date):     {}", report.skipped);
    }
    println!("  New applications:   {}", report.created);
    println!("  Updated:            {}", report.updated);
    println!("  Conflicts:          {}", report.conflicts);
    if report.duplicates > 0 {
        println!("  Already recorded:   {}", report.duplicates);
    }
    if report.ai_consulted > 0 {
        println!("  AI consulted:       {}", report.ai_consulted);
    }
    if report.errors > 0 {
        println!("  Errors:             {}", report.errors);
    }

    if !report.by_status.is_empty() {
        let counts: Vec<String> = report
            .by_status
            .iter()
            .map(|(status, n)| format!("{} {}", status, n))
            .collect();
        println!("\nBy status: {}", counts.join(", "));
    }

    println!(
        "\nDeletion plan: {} to delete, {} to keep",
        report.to_delete.len(),
        report.to_keep.len()
    );
    for action in &report.to_delete {
        println!(
            "  {:<20} {:<20} {}",
            truncate(&action.message_id, 20),
            truncate(&action.employer, 20),
            action.reason
        );
    }
}

fn print_record(record: &EmployerRecord) {
    let flags = review_flags(record);
    if flags.is_empty() {
        println!("{}", record.employer);
    } else {
        println!("{} [{}]", record.employer, flags);
    }
    println!("Position:   {}", record.role);
    println!("Status:     {}", record.status);
    println!("Confidence: {}", record.confidence);
    println!("First seen: {}", record.first_seen.format("%Y-%m-%d %H:%M"));
    println!("Last seen:  {}", record.last_seen.format("%Y-%m-%d %H:%M"));

    let wrap = textwrap::Options::new(76)
        .initial_indent("  ")
        .subsequent_indent("    ");

    if !record.notes.is_empty() {
        println!("\nNotes:");
        for note in &record.notes {
            println!("{}", textwrap::fill(note, &wrap));
        }
    }

    if record.has_conflict() {
        println!("\nConflicts (needs review):");
        for conflict in &record.conflicts {
            println!("{}", textwrap::fill(&conflict.note(), &wrap));
        }
    }

    if !record.audit.is_empty() {
        println!("\nHistory:");
        for entry in &record.audit {
            let from = entry.from.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "  {}  {:<9} {} -> {}  {}",
                entry.at.format("%Y-%m-%d"),
                format!("{:?}", entry.origin).to_lowercase(),
                from,
                entry.to,
                entry.detail
            );
        }
    }

    println!("\nEmails ({}):", record.message_ids.len());
    for id in &record.message_ids {
        println!("  {}", id);
    }
}
