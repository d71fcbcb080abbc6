//! ragline - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use ragline::{
    cli::{Args, Commands, Verbosity},
    config::Config,
    doctor::Doctor,
    logging,
    service::RagService,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    logging::init(&config.logging, args.verbosity().log_level());

    match &args.command {
        Commands::Doctor => run_doctor(config).await,
        Commands::Config { init } => show_config(&args, &config, *init),
        _ => run_pipeline(&args, &config).await,
    }
}

async fn run_pipeline(args: &Args, config: &Config) -> Result<()> {
    let verbosity = args.verbosity();
    let pb = spinner(verbosity, "Connecting to backends...");
    let service = RagService::from_config(config).await;
    pb.finish_and_clear();
    let service = service.context("Failed to start ragline")?;

    if !config.vector_store.is_persistent() && verbosity.show_progress() {
        eprintln!(
            "{} in-memory vector store: nothing indexed by this run is kept after it exits",
            "warning:".yellow()
        );
    }

    match &args.command {
        Commands::Index {
            tenant,
            document,
            file,
            replace,
        } => {
            let document_id = document_id(document.as_deref(), file.as_deref())?;
            let text = read_input(file.as_deref())?;

            let pb = spinner(verbosity, &format!("Indexing {}...", document_id));
            let report = if *replace {
                service.reindex_document(tenant, &document_id, &text).await
            } else {
                service.index_document(tenant, &document_id, &text).await
            };
            pb.finish_and_clear();
            let report = report?;

            println!(
                "{} {} ({} chunks, {} ms)",
                "✓ Indexed".green(),
                report.document_id,
                report.chunks,
                report.duration_ms
            );
        }
        Commands::Delete { document } => {
            service.delete_document(document).await?;
            println!("{} {}", "✓ Deleted".green(), document);
        }
        Commands::Search {
            tenant,
            count,
            query,
        } => {
            let results = service.search_text(tenant, query, *count).await?;
            if results.is_empty() {
                println!("{}", "No matching chunks.".yellow());
            }
            for (i, text) in results.iter().enumerate() {
                println!("{} {}", format!("{}.", i + 1).cyan(), text.trim());
            }
        }
        Commands::Ask {
            tenant,
            stream,
            sources,
            question,
        } => {
            if *stream {
                let mut fragments = service.answer_query_stream(tenant, question).await?;
                let mut stdout = std::io::stdout();
                while let Some(fragment) = fragments.next().await {
                    print!("{}", fragment?);
                    stdout.flush()?;
                }
                println!();
            } else {
                let pb = spinner(verbosity, "Thinking...");
                let answer = service.answer_with_sources(tenant, question).await;
                pb.finish_and_clear();
                let answer = answer?;

                println!("{}", answer.answer.trim());
                if *sources && !answer.sources.is_empty() {
                    println!("\n{}", "Sources:".bold());
                    for source in &answer.sources {
                        println!(
                            "  {} {} (score {:.3})",
                            "•".cyan(),
                            source.id,
                            source.score
                        );
                    }
                }
            }
        }
        Commands::Doctor | Commands::Config { .. } => {}
    }

    if args.stats {
        println!("\n{}", "Pipeline statistics".bold());
        println!("{}", service.stats());
    }

    Ok(())
}

async fn run_doctor(config: Config) -> Result<()> {
    let doctor = Doctor::new(config);
    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

fn show_config(args: &Args, config: &Config, init: bool) -> Result<()> {
    let path = args.config.clone().or_else(Config::default_path);

    if init {
        let path = path.context("Cannot determine home directory for config")?;
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        config.save(&path)?;
        println!("{} {}", "✓ Wrote".green(), path.display());
        return Ok(());
    }

    if let Some(path) = &path {
        let state = if path.exists() { "" } else { " (not found, using defaults)" };
        println!("{} {}{}\n", "Config:".bold(), path.display(), state);
    }
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{}", rendered);
    if !config.vector_store.is_persistent() {
        println!(
            "{}",
            "Note: the memory vector store is emptied when each ragline command exits; \
             use qdrant or pgvector to search across runs."
                .yellow()
        );
    }
    Ok(())
}

fn document_id(explicit: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }
    file.and_then(|f| f.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .context("--document is required when reading from stdin")
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn spinner(verbosity: Verbosity, message: &str) -> ProgressBar {
    if !verbosity.show_progress() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
