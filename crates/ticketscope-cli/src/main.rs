//! ticketscope: topic discovery over support tickets.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ticketscope_core::{DataPaths, PipelineConfig};
use ticketscope_llm::LLMConfig;
use ticketscope_runtime::{Pipeline, Services};
use ticketscope_store::TicketCache;

pub mod validate;

fn resolve_data_dir() -> PathBuf {
    std::env::var("TICKETSCOPE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("ticketscope: topic discovery over support tickets");
    println!();
    println!("Usage: ticketscope [command]");
    println!();
    println!("Commands:");
    println!("  run [--refresh]          Run the pipeline (default); --refresh refetches tickets");
    println!("  clear-cache [ids...]     Drop cached translations/cleanings (all, or the given tickets)");
    println!("  validate [data-dir]      Check the source view, result store and caches");
    println!("  help                     Show this help message");
    println!();
    println!("The data directory is $TICKETSCOPE_DATA_DIR, ../data next to the binary, or ./data.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "run" => {
            let refresh = rest.iter().any(|a| a == "--refresh");
            if let Some(unknown) = rest.iter().find(|a| *a != "--refresh") {
                anyhow::bail!("Unknown option for run: {}", unknown);
            }
            run(refresh).await
        }
        "clear-cache" => clear_cache(rest),
        "--validate" | "validate" => {
            let data_dir = rest.first().map(PathBuf::from).unwrap_or_else(resolve_data_dir);
            let report = validate::validate(&data_dir);
            validate::print_report(&report);
            std::process::exit(if report.is_ok() { 0 } else { 1 });
        }
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'ticketscope help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn run(refresh: bool) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let paths = DataPaths::new(&data_dir)?;
    let config = PipelineConfig::load(&paths.pipeline_config_file)?;
    let llm = LLMConfig::load(&paths.llm_config_file);
    let services = Services::from_config(&config, &llm, &paths)?;

    let report = Pipeline::new(config, paths, services).run(refresh).await?;

    println!(
        "Fetched {} tickets, modeled {} (translation: {} remote / {} cached / {} fallback; \
         cleaning: {} remote / {} cached / {} fallback)",
        report.fetched,
        report.selected,
        report.translation.remote,
        report.translation.cached,
        report.translation.fallback,
        report.cleaning.remote,
        report.cleaning.cached,
        report.cleaning.fallback,
    );
    for run in &report.runs {
        println!(
            "  {} [{}] {} docs, {} topics, {} outliers{}",
            run.run_id,
            run.status,
            run.doc_count,
            run.topic_count,
            run.outlier_count,
            run.output_dir
                .as_ref()
                .map(|d| format!(" -> {}", d.display()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn clear_cache(ticket_ids: &[String]) -> anyhow::Result<()> {
    let paths = DataPaths::new(resolve_data_dir())?;
    let cache = TicketCache::open(&paths.cache)?;
    let removed = if ticket_ids.is_empty() {
        cache.clear()?
    } else {
        cache.invalidate(ticket_ids)?
    };
    println!("Removed {} cache entries ({} left)", removed, cache.count()?);
    Ok(())
}
