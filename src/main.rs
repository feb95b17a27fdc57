mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::{JobId, JobStatus};
use rf_db::JobRegistry;
use rf_pipeline::TranscodeService;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=trace,rf_core=debug,rf_av=debug,rf_db=debug,rf_pipeline=debug".to_string()
        } else {
            "reelforge=info,rf_core=info,rf_av=info,rf_db=info,rf_pipeline=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Submit { file } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(submit_file(&config, &file))
        }
        Commands::Lookup { job_id } => lookup_job(&config, &job_id),
        Commands::List { limit, offset } => list_jobs(&config, offset, limit),
        Commands::CheckTools { json } => check_tools(&config, json),
        Commands::Config => show_config(&config),
    }
}

async fn submit_file(config: &Config, file: &Path) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }

    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let service = TranscodeService::from_config(config)?;
    tracing::info!(
        "Submitting {:?} as {} variants",
        file,
        service.items().len()
    );

    let submission = service.submit_path(file).await?;
    println!("{}", serde_json::to_string_pretty(&submission)?);

    if submission.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {} failed: {}",
            submission.job_id,
            submission
                .error
                .as_deref()
                .unwrap_or("no variant could be produced")
        );
    }

    Ok(())
}

fn open_registry(config: &Config) -> Result<JobRegistry> {
    let pool = rf_db::pool::init_pool(&config.storage.db_path)?;
    Ok(JobRegistry::new(pool))
}

fn lookup_job(config: &Config, job_id: &str) -> Result<()> {
    let job_id = JobId::parse(job_id)?;
    let record = open_registry(config)?.get(&job_id)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn list_jobs(config: &Config, offset: i64, limit: i64) -> Result<()> {
    let jobs = open_registry(config)?.list(offset, limit)?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

fn check_tools(config: &Config, json: bool) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools).check_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("Checking external tools...\n");
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it or set tools.ffmpeg_path in the config.");
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);

    let warnings = config.validate();
    if warnings.is_empty() {
        eprintln!("✓ Configuration is valid");
    } else {
        for warning in warnings {
            eprintln!("warning: {warning}");
        }
    }

    Ok(())
}
