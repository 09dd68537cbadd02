use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tribunal_auditor::report::render_markdown;
use tribunal_auditor::{CourtDeps, Tribunal};
use tribunal_common::{Config, FinalReport, Rubric};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
    Both,
}

#[derive(Parser)]
#[command(name = "tribunal", about = "Adversarial audit of a repository and its design document")]
struct Cli {
    /// Git URL of the repository, or a local checkout directory
    #[arg(long)]
    repo_url: String,

    /// Path to the design document (Markdown or plain text)
    #[arg(long)]
    doc_path: String,

    /// Rubric JSON file. Overrides TRIBUNAL_RUBRIC; defaults to the built-in rubric.
    #[arg(long)]
    rubric: Option<PathBuf>,

    /// Output directory. Overrides TRIBUNAL_AUDIT_DIR.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "both")]
    format: Format,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("tribunal=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;
    config.log_redacted();

    let rubric = match cli.rubric.as_ref().or(config.rubric_path.as_ref()) {
        Some(path) => Rubric::load(path).with_context(|| format!("failed to load rubric {}", path.display()))?,
        None => Rubric::builtin(),
    };
    info!(criteria = rubric.dimensions.len(), "Rubric loaded");

    let tribunal = Tribunal::new(CourtDeps::from_config(&config)?, rubric)?;
    let report = tribunal.run(&cli.repo_url, &cli.doc_path).await?;

    let out_dir = cli.out_dir.unwrap_or(config.audit_dir);
    write_reports(&report, &out_dir, cli.format)?;

    match report.overall_score {
        Some(score) => info!(score, tier = report.tier.label(), "Audit complete"),
        None => info!(reason = report.abort_reason.as_deref().unwrap_or_default(), "Audit dismissed"),
    }
    println!("{}", report.executive_summary);
    Ok(())
}

fn write_reports(report: &FinalReport, out_dir: &Path, format: Format) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    if matches!(format, Format::Json | Format::Both) {
        let path = out_dir.join(format!("audit-{}.json", report.run_id));
        std::fs::write(&path, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote JSON report");
    }
    if matches!(format, Format::Markdown | Format::Both) {
        let path = out_dir.join(format!("audit-{}.md", report.run_id));
        std::fs::write(&path, render_markdown(report))
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote Markdown report");
    }
    Ok(())
}
