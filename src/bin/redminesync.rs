use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "redminesync", about = "Sync Redmine issues into a local store")]
struct Cli {
    /// Database path (default: ~/.redminesync/redminesync.db)
    #[arg(long)]
    db: Option<String>,

    /// Config file path (default: ~/.redminesync/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync issues from Redmine for one project, or every configured project
    Sync {
        /// Project identifier (must be listed in the config)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        project: Option<String>,
        /// Sync every project listed in the config
        #[arg(long)]
        all: bool,
        /// Only issues created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Only issues created on or before this date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Re-fetch every stored issue from Redmine
    Refresh,
    /// List stored issues
    List {
        /// Filter by Redmine project id
        #[arg(long)]
        project_id: Option<i64>,
        /// Start date on or after (YYYY-MM-DD)
        #[arg(long)]
        start_from: Option<String>,
        /// Due date on or before (YYYY-MM-DD)
        #[arg(long)]
        due_to: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "100")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
    /// Show store contents and the last sync runs
    Status,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl redminesync::SyncProgress for StderrProgress {
    fn on_page_fetched(&self, target: &str, offset: u32, count: usize, total: Option<u64>) {
        match total {
            Some(total) => eprintln!("{target}: page at {offset}, {count} issues (of {total})"),
            None => eprintln!("{target}: page at {offset}, {count} issues"),
        }
    }

    fn on_issue_failed(&self, issue_id: i64, error: &redminesync::Error) {
        eprintln!("  #{issue_id} failed: {error}");
    }

    fn on_refresh_progress(&self, updated: u64, failed: u64) {
        eprint!("\r  Refreshed: {updated} updated, {failed} failed   ");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => redminesync::Database::open_at(path).await?,
        None => redminesync::Database::open().await?,
    };

    match cli.command {
        Commands::Status => {
            print_status(&db).await?;
        }
        Commands::List {
            project_id,
            start_from,
            due_to,
            limit,
            json,
            csv,
        } => {
            let mut query = redminesync::IssueQuery::new().limit(limit);
            if let Some(id) = project_id {
                query = query.project(id);
            }
            if let Some(ref d) = start_from {
                query = query.start_from(&redminesync::date_util::parse_date(d)?.to_string());
            }
            if let Some(ref d) = due_to {
                query = query.due_to(&redminesync::date_util::parse_date(d)?.to_string());
            }
            handle_list(&db, query, json, csv).await?;
        }
        Commands::Sync {
            project,
            all,
            start,
            end,
        } => {
            let app = connect(db, cli.config.as_deref())?;
            let options = redminesync::SyncOptions::parse(start.as_deref(), end.as_deref())?;
            let cancel = cancel_on_ctrl_c();
            let reports = match project {
                Some(ref project) if !all => {
                    vec![app.start_sync(project, &options, &StderrProgress, &cancel).await?]
                }
                _ => app.sync_all(&options, &StderrProgress, &cancel).await?,
            };
            for report in &reports {
                print_sync_report(report);
            }
            let failed: Vec<&str> = reports
                .iter()
                .filter(|r| r.status == redminesync::SyncStatus::Failed)
                .map(|r| r.target.as_str())
                .collect();
            if !failed.is_empty() {
                anyhow::bail!("sync failed for {}", failed.join(", "));
            }
        }
        Commands::Refresh => {
            let app = connect(db, cli.config.as_deref())?;
            let cancel = cancel_on_ctrl_c();
            let report = app.refresh_all_details(&StderrProgress, &cancel).await?;
            eprintln!();
            println!("Refresh: {}", report.status.as_str());
            println!("  Updated: {} issues", report.updated_count);
            println!("  Failed:  {} issues", report.failed_count);
        }
    }

    Ok(())
}

fn connect(
    db: redminesync::Database,
    config: Option<&str>,
) -> anyhow::Result<redminesync::RedmineSync> {
    let settings = match config {
        Some(path) => redminesync::Settings::load_from(path)?,
        None => redminesync::Settings::load()?,
    };
    Ok(redminesync::RedmineSync::from_settings(db, settings)?)
}

/// Cancel the returned token on the first Ctrl-C. The run stops at the next
/// page or issue boundary and still records its job.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            token.cancel();
        }
    });
    cancel
}

async fn handle_list(
    db: &redminesync::Database,
    query: redminesync::IssueQuery,
    json: bool,
    csv: bool,
) -> anyhow::Result<()> {
    if json {
        println!("{}", query.to_json(db).await?);
        return Ok(());
    }
    if csv {
        print!("{}", query.to_csv(db).await?);
        return Ok(());
    }

    let rows = query.issues(db).await?;
    if rows.is_empty() {
        println!("No issues found.");
        return Ok(());
    }
    for row in &rows {
        let issue = &row.issue;
        let dates = match (issue.start_date, issue.due_date) {
            (Some(s), Some(d)) => format!("{s} → {d}"),
            (Some(s), None) => format!("{s} →"),
            (None, Some(d)) => format!("→ {d}"),
            (None, None) => String::new(),
        };
        println!(
            "#{:<8} {:<50} {:<20} {}",
            issue.remote_id,
            truncate(&issue.subject, 50),
            issue.assignee.as_deref().unwrap_or("-"),
            dates
        );
    }
    println!("\n{} issues", rows.len());
    Ok(())
}

async fn print_status(db: &redminesync::Database) -> anyhow::Result<()> {
    let status = redminesync::status(db).await?;

    println!("Issues stored: {}", status.issue_count);
    for (label, job) in [("Last sync", &status.last_sync), ("Last refresh", &status.last_refresh)] {
        match job {
            Some(job) => println!(
                "{label}: {} {} at {} ({} synced, {} failed)",
                job.target,
                job.status,
                job.completed_at.as_deref().unwrap_or(&job.started_at),
                job.synced_items,
                job.failed_items
            ),
            None => println!("{label}: never"),
        }
    }
    Ok(())
}

fn print_sync_report(report: &redminesync::SyncReport) {
    println!("Sync: {}", report.target);
    println!("  Status:  {}", report.status.as_str());
    println!("  Fetched: {} issues in {} pages", report.total_fetched, report.pages_fetched);
    println!("  Stored:  {} issues", report.stored_count);
    println!("  Failed:  {} issues", report.failed_count);
    for item in &report.errors {
        println!("    #{}: {}", item.issue_id, item.error);
    }
    if let Some(ref err) = report.error {
        println!("  Error:   {err}");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}
