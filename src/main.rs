use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use dream_journal_lib::ai::InterpretationStyle;
use dream_journal_lib::config::AppConfig;
use dream_journal_lib::stats::{search, DreamFilter, DreamStats};
use dream_journal_lib::{backup, logging, AppState, DreamDraft, DreamEntry, ImportSummary};

const UNTITLED: &str = "Untitled Dream";

#[derive(Debug, Parser)]
#[command(name = "dream-journal", about = "Record, browse and back up your dreams", version)]
struct Cli {
    /// Use this directory instead of the platform data directory.
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List dreams, newest first.
    List {
        /// Only dreams whose title or body contains this text.
        #[arg(long)]
        search: Option<String>,
        /// all, lucid, nightmare or images.
        #[arg(long, default_value_t = DreamFilter::All)]
        filter: DreamFilter,
        #[arg(long)]
        json: bool,
    },
    /// Print one dream as JSON.
    Show { id: i64 },
    /// Record a new dream.
    Add(AddArgs),
    /// Change fields of an existing dream.
    Edit(EditArgs),
    /// Delete a dream.
    Delete { id: i64 },
    /// Delete every dream. The profile is kept.
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Aggregate figures over the journal.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Write a plain JSON export (no images).
    ExportJson {
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Import dreams from a plain JSON export.
    ImportJson { file: PathBuf },
    /// Zip backups with images.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Show or change the user profile.
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Ask the dream service for an interpretation and store it.
    Interpret {
        id: i64,
        #[arg(long, default_value_t = InterpretationStyle::Psychologist)]
        style: InterpretationStyle,
    },
    /// Ask the dream service for an illustration and attach it.
    Illustrate { id: i64 },
}

#[derive(Debug, clap::Args)]
struct AddArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long, default_value = "")]
    body: String,
    /// Display date; defaults to today.
    #[arg(long)]
    date: Option<String>,
    /// 1 (worst) to 5 (best); 0 leaves it unset.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..=5))]
    mood: i64,
    #[arg(long)]
    lucid: bool,
    #[arg(long)]
    nightmare: bool,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "image")]
    images: Vec<String>,
}

#[derive(Debug, clap::Args)]
struct EditArgs {
    id: i64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    body: Option<String>,
    #[arg(long)]
    date: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=5))]
    mood: Option<i64>,
    #[arg(long)]
    lucid: Option<bool>,
    #[arg(long)]
    nightmare: Option<bool>,
    /// Replaces all tags when given.
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Replaces all images when given.
    #[arg(long = "image")]
    images: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Create a zip backup including local images.
    Export {
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Restore a zip backup; dreams are added alongside existing ones.
    Restore { archive: PathBuf },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Show {
        #[arg(long)]
        json: bool,
    },
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Non-digits are dropped.
        #[arg(long)]
        age: Option<String>,
        #[arg(long)]
        gender: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }

    let _log_guard = match logging::init(&config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("logging disabled: {err:#}");
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };

    match runtime.block_on(run(config, cli.command)) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(config: AppConfig, command: Commands) -> Result<i32> {
    let state = AppState::open(config).await.context("open dream journal")?;
    let code = handle(&state, command).await?;
    state.store.pool().close().await;
    Ok(code)
}

async fn handle(state: &AppState, command: Commands) -> Result<i32> {
    let store = &state.store;
    match command {
        Commands::List {
            search: query,
            filter,
            json,
        } => {
            let entries = store.list();
            let hits = search(&entries, query.as_deref().unwrap_or(""), filter);
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No dreams found.");
            } else {
                for entry in hits {
                    println!("{}", summary_line(entry));
                }
            }
            Ok(0)
        }
        Commands::Show { id } => match store.get(id) {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                Ok(0)
            }
            None => {
                eprintln!("No dream with id {id}.");
                Ok(2)
            }
        },
        Commands::Add(args) => {
            let draft = DreamDraft {
                title: args
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string()),
                body: args.body,
                date: args.date.unwrap_or_else(today),
                mood: args.mood,
                is_lucid: args.lucid,
                is_nightmare: args.nightmare,
                tags: args.tags,
                images: args.images,
                interpretation: String::new(),
            };
            match store.add(draft).await {
                Some(id) => {
                    println!("Saved dream #{id}");
                    Ok(0)
                }
                None => report_store_error(state),
            }
        }
        Commands::Edit(args) => {
            let Some(mut entry) = store.get(args.id) else {
                eprintln!("No dream with id {}.", args.id);
                return Ok(2);
            };
            if let Some(title) = args.title.filter(|t| !t.trim().is_empty()) {
                entry.title = title;
            }
            if let Some(body) = args.body {
                entry.body = body;
            }
            if let Some(date) = args.date {
                entry.date = date;
            }
            if let Some(mood) = args.mood {
                entry.mood = mood;
            }
            if let Some(lucid) = args.lucid {
                entry.is_lucid = lucid;
            }
            if let Some(nightmare) = args.nightmare {
                entry.is_nightmare = nightmare;
            }
            if !args.tags.is_empty() {
                entry.tags = args.tags;
            }
            if !args.images.is_empty() {
                entry.images = args.images;
            }
            if store.update(&entry).await {
                println!("Updated dream #{}", entry.id);
                Ok(0)
            } else {
                report_store_error(state)
            }
        }
        Commands::Delete { id } => {
            if store.delete(id).await {
                println!("Deleted dream #{id}");
                Ok(0)
            } else {
                report_store_error(state)
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                eprintln!("This permanently deletes all dreams. Re-run with --yes to confirm.");
                return Ok(2);
            }
            if store.clear_all().await {
                println!("Your journal has been wiped.");
                Ok(0)
            } else {
                report_store_error(state)
            }
        }
        Commands::Stats { json } => {
            let stats = DreamStats::from_entries(&store.list());
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let avg = stats
                    .average_mood
                    .map(|m| format!("{m:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                println!("Total dreams: {}", stats.total);
                println!("Avg mood:     {avg} / 5.0");
                println!("Lucid:        {}", stats.lucid);
                println!("Nightmares:   {}", stats.nightmares);
                println!("Images:       {}", stats.total_images);
            }
            Ok(0)
        }
        Commands::ExportJson { out } => {
            let entries = store.list();
            if entries.is_empty() {
                println!("You have no dreams to export yet.");
                return Ok(0);
            }
            let out_dir = out.unwrap_or_else(|| state.config.backups_dir());
            let path = backup::export_json(&entries, &out_dir).await?;
            println!("Export stored at {}", path.display());
            Ok(0)
        }
        Commands::ImportJson { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            match store.import_json(&text).await {
                Ok(summary) => {
                    print_import_summary(&summary);
                    Ok(0)
                }
                Err(err) => {
                    eprintln!("Invalid backup file: {err}");
                    Ok(1)
                }
            }
        }
        Commands::Backup(BackupCommand::Export { out }) => {
            let out_dir = out.unwrap_or_else(|| state.config.backups_dir());
            let path = backup::export_backup(&store.list(), &out_dir).await?;
            println!("Backup stored at {}", path.display());
            Ok(0)
        }
        Commands::Backup(BackupCommand::Restore { archive }) => {
            match backup::restore_into_store(store, &archive, &state.config.images_dir()).await {
                Ok(summary) => {
                    print_import_summary(&summary);
                    Ok(0)
                }
                Err(err) => {
                    eprintln!("Restore failed: {err}");
                    Ok(1)
                }
            }
        }
        Commands::Profile(ProfileCommand::Show { json }) => {
            let profile = state.settings.load_profile();
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!("Name:   {}", profile.name);
                println!("Age:    {}", profile.age);
                println!("Gender: {}", profile.gender);
            }
            Ok(0)
        }
        Commands::Profile(ProfileCommand::Set { name, age, gender }) => {
            let mut profile = state.settings.load_profile();
            if let Some(name) = name {
                profile.name = name;
            }
            if let Some(age) = age {
                profile.age = age.chars().filter(char::is_ascii_digit).collect();
            }
            if let Some(gender) = gender {
                profile.gender = gender;
            }
            state.settings.save_profile(&profile)?;
            println!("Profile saved.");
            Ok(0)
        }
        Commands::Interpret { id, style } => {
            let Some(entry) = store.get(id) else {
                eprintln!("No dream with id {id}.");
                return Ok(2);
            };
            let text = state
                .ai
                .interpret(&entry.title, &entry.body, &entry.tags, style)
                .await?;
            store.set_interpretation(id, &text).await?;
            println!("{text}");
            Ok(0)
        }
        Commands::Illustrate { id } => {
            let Some(entry) = store.get(id) else {
                eprintln!("No dream with id {id}.");
                return Ok(2);
            };
            let description = if entry.body.trim().is_empty() {
                entry.title.clone()
            } else {
                entry.body.clone()
            };
            let path = state
                .ai
                .generate_image(&description, Some(id), &state.config.images_dir())
                .await?;
            store.attach_image(id, &path.display().to_string()).await?;
            println!("Image saved at {}", path.display());
            Ok(0)
        }
    }
}

fn report_store_error(state: &AppState) -> Result<i32> {
    if let Some(err) = state.store.last_error() {
        eprintln!("Error: {err}");
        state.store.dismiss_error();
    }
    Ok(1)
}

fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Imported {} dream(s), skipped {}.",
        summary.inserted.len(),
        summary.skipped.len()
    );
    for skipped in &summary.skipped {
        println!("  record {}: {}", skipped.index, skipped.reason);
    }
}

fn summary_line(entry: &DreamEntry) -> String {
    let mut line = format!("#{:<4} {:<12} {}", entry.id, entry.date, entry.title);
    if entry.is_lucid {
        line.push_str(" [lucid]");
    }
    if entry.is_nightmare {
        line.push_str(" [nightmare]");
    }
    if entry.has_images() {
        line.push_str(&format!(" ({} images)", entry.image_count()));
    }
    if !entry.tags.is_empty() {
        line.push_str(&format!(" {}", entry.tags.join(" ")));
    }
    line
}

fn today() -> String {
    Local::now().format("%-m/%-d/%Y").to_string()
}
