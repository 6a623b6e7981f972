mod config;
mod enrich;
mod export;
mod parser;
mod record;
mod sink;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use config::{Lexicon, QuickbaseSettings};
use parser::extract::Mode;
use parser::normalize::{CsvImportRule, CSV_DEFAULT_ASSOCIATION};
use record::{Association, CanonicalRecord};
use sink::{QuickbaseSink, SinkOutcome, SinkPolicy};

#[derive(Parser)]
#[command(
    name = "assoc_importer",
    about = "Association directory importer: parse, enrich and push member listings"
)]
struct Cli {
    /// TOML file overriding the built-in association/county/field tables
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the association a directory document belongs to
    Classify { file: PathBuf },
    /// Parse a directory document into cleaned records and write them as CSV
    Parse {
        file: PathBuf,
        #[arg(short, long, default_value = "hoa_cleaned.csv")]
        output: PathBuf,
        /// Fill missing phone/email from profile pages
        #[arg(long)]
        enrich: bool,
    },
    /// Parse, enrich, export and push every record to the table
    Import {
        file: PathBuf,
        #[arg(long)]
        no_enrich: bool,
        #[arg(short, long, default_value = "hoa_cleaned.csv")]
        output: PathBuf,
        /// Save per-record import results to this CSV
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Push a previously cleaned CSV to the table
    ImportCsv {
        file: PathBuf,
        /// Association for rows that do not carry one
        #[arg(long, default_value = CSV_DEFAULT_ASSOCIATION)]
        association: String,
        /// Keep going after a rejected record
        #[arg(long)]
        continue_on_error: bool,
    },
    /// List the target table's fields
    Fields,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let lexicon = Lexicon::load(cli.lexicon.as_deref())?;

    let result = match cli.command {
        Commands::Classify { file } => {
            let text = read_document(&file)?;
            let association = parser::classify::classify(&text, &lexicon);
            if association.is_unknown() {
                warn!("No known association phrase in {}", file.display());
            }
            println!("{}", association);
            Ok(())
        }
        Commands::Parse {
            file,
            output,
            enrich,
        } => {
            let text = read_document(&file)?;
            let mut doc = parser::process_document(&text, &lexicon);
            println!(
                "Association: {} ({} rows, {} records)",
                doc.association,
                doc.raw_rows,
                doc.records.len()
            );
            if doc.records.is_empty() {
                println!("No records found.");
                return Ok(());
            }
            if enrich {
                run_enrichment(&mut doc.records, &doc.association, &lexicon).await;
            }
            print_records(&doc.records);
            export::save_records(&output, &doc.records)?;
            println!("\nSaved {} records to {}", doc.records.len(), output.display());
            Ok(())
        }
        Commands::Import {
            file,
            no_enrich,
            output,
            results,
        } => {
            let settings = QuickbaseSettings::from_env()?;
            let text = read_document(&file)?;
            let mut doc = parser::process_document(&text, &lexicon);
            if doc.records.is_empty() {
                println!("No records found in {}.", file.display());
                return Ok(());
            }

            if !no_enrich {
                run_enrichment(&mut doc.records, &doc.association, &lexicon).await;
            }
            print_records(&doc.records);
            export::save_records(&output, &doc.records)?;

            let t_push = Instant::now();
            println!("\nPushing {} records...", doc.records.len());
            let sink = QuickbaseSink::new(settings, lexicon.fields.clone());
            let outcomes =
                sink::push_records(&sink, &doc.records, SinkPolicy::ContinueOnFailure).await;
            print_outcomes(&outcomes);
            println!("Pushed in {}", format_duration(t_push.elapsed()));

            if let Some(path) = results {
                export::save_outcomes(&path, &outcomes)?;
            }
            Ok(())
        }
        Commands::ImportCsv {
            file,
            association,
            continue_on_error,
        } => {
            let settings = QuickbaseSettings::from_env()?;
            let rows = export::load_csv_rows(&file)?;
            let rule = CsvImportRule::new(Association::new(association));
            let records: Vec<CanonicalRecord> =
                rows.iter().filter_map(|row| rule.normalize(row)).collect();
            println!(
                "{} of {} rows are importable.",
                records.len(),
                rows.len()
            );
            if records.is_empty() {
                return Ok(());
            }

            let policy = if continue_on_error {
                SinkPolicy::ContinueOnFailure
            } else {
                SinkPolicy::HaltOnFailure
            };
            let sink = QuickbaseSink::new(settings, lexicon.fields.clone());
            let outcomes = sink::push_records(&sink, &records, policy).await;
            print_outcomes(&outcomes);
            if outcomes.len() < records.len() {
                println!(
                    "Stopped after a failure; {} records not sent.",
                    records.len() - outcomes.len()
                );
            }
            Ok(())
        }
        Commands::Fields => {
            let settings = QuickbaseSettings::from_env()?;
            let sink = QuickbaseSink::new(settings, lexicon.fields.clone());
            let fields = sink.fetch_fields().await?;

            println!(
                "{:>4} | {:<14} | {:<32} | {:<8} | {:<8} | {:<10}",
                "fid", "type", "label", "required", "noUpdate", "mode"
            );
            println!("{}", "-".repeat(90));
            for f in &fields {
                println!(
                    "{:>4} | {:<14} | {:<32} | {:<8} | {:<8} | {:<10}",
                    f.id,
                    f.field_type,
                    truncate(&f.label, 32),
                    f.required,
                    f.no_update,
                    f.mode
                );
            }
            println!("\n{} fields", fields.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Whole file as UTF-8. Anything else aborts the run.
fn read_document(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path.display()))
}

/// Enrichment applies to the listing directory only, whose profile pages
/// carry the phone numbers the listing itself leaves out.
async fn run_enrichment(
    records: &mut [CanonicalRecord],
    association: &Association,
    lexicon: &Lexicon,
) {
    if Mode::for_association(association, lexicon) != Mode::Listing {
        info!("Skipping enrichment for {}", association);
        return;
    }

    let mut session = match enrich::SpiderSession::open() {
        Ok(session) => session,
        Err(e) => {
            warn!("Enrichment unavailable: {}", e);
            return;
        }
    };

    let t_enrich = Instant::now();
    let report = enrich::enrich_records(records, &mut session).await;
    report.print();
    println!("Enriched in {}", format_duration(t_enrich.elapsed()));
}

pub(crate) fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

fn print_records(records: &[CanonicalRecord]) {
    println!(
        "{:>3} | {:<28} | {:<24} | {:<16} | {:<5} | {:<14} | {:>5}",
        "#", "Property", "Company", "City", "State", "Phone", "Units"
    );
    println!("{}", "-".repeat(112));

    for (i, r) in records.iter().enumerate() {
        println!(
            "{:>3} | {:<28} | {:<24} | {:<16} | {:<5} | {:<14} | {:>5}",
            i + 1,
            truncate(&r.property, 28),
            truncate(&r.company, 24),
            truncate(&r.city, 16),
            r.state,
            truncate(&r.phone, 14),
            r.units
        );
    }
}

fn print_outcomes(outcomes: &[SinkOutcome]) {
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    for o in outcomes.iter().filter(|o| !o.is_success()) {
        let status = o
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!("  ! {} [{}] {}", truncate(&o.property, 28), status, truncate(&o.response, 80));
    }
    println!("Done: {} sent ({} ok, {} failed).", outcomes.len(), ok, outcomes.len() - ok);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
