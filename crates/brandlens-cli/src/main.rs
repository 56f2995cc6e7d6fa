use std::path::PathBuf;

use brandlens_cli::cli::CliConfig;
use brandlens_core::constants::STATUS_POLL_INTERVAL;
use brandlens_core::models::Product;
use brandlens_core::pipeline::{self, PipelineConfig, StepStatus, STEPS};
use brandlens_core::{LoginProfile, Session};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brandlens")]
#[command(about = "CLI interface for the brandlens client core")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (apiBaseUrl, dataDir, storageSecret)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials and scope local state to the user
    Login {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value = "")]
        session_id: String,
        #[arg(long, default_value = "")]
        application_id: String,
        #[arg(long, default_value = "")]
        first_name: String,
        /// JSON array of already-analyzed products, if any
        #[arg(long)]
        products_json: Option<String>,
    },

    /// Clear credentials from every scope
    Logout,

    /// Print the current analysis lifecycle state
    Status,

    /// Trigger an analysis and watch the pipeline until the report arrives
    Analyze {
        /// Product/site id to analyze
        resource_id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config.into_core_config(),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let session = Session::new(&config);

    let result = match cli.command {
        Commands::Login {
            access_token,
            user_id,
            session_id,
            application_id,
            first_name,
            products_json,
        } => login(
            &session,
            access_token,
            user_id,
            session_id,
            application_id,
            first_name,
            products_json,
        ),
        Commands::Logout => {
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        Commands::Status => status(&session, cli.pretty),
        Commands::Analyze { resource_id } => analyze(&session, &resource_id, cli.pretty).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CliConfig> {
    match &cli.config {
        Some(path) => CliConfig::load(path),
        None => Ok(CliConfig::default()),
    }
}

fn login(
    session: &Session,
    access_token: String,
    user_id: String,
    session_id: String,
    application_id: String,
    first_name: String,
    products_json: Option<String>,
) -> anyhow::Result<()> {
    let products: Vec<Product> = match products_json {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    session.login(LoginProfile {
        access_token,
        session_id,
        user_id,
        application_id,
        first_name,
        applications: Vec::new(),
        products,
    });
    println!("Logged in.");
    if session.analysis().snapshot().is_analyzing {
        println!("An analysis is still in flight for this account.");
    }
    Ok(())
}

fn status(session: &Session, pretty: bool) -> anyhow::Result<()> {
    let state = session.analysis().snapshot();
    let json = if pretty {
        serde_json::to_string_pretty(&*state)?
    } else {
        serde_json::to_string(&*state)?
    };
    println!("{json}");
    Ok(())
}

async fn analyze(session: &Session, resource_id: &str, pretty: bool) -> anyhow::Result<()> {
    if !session.is_logged_in() {
        anyhow::bail!("not logged in");
    }

    session.run_analysis(resource_id).await?;
    let poller = session.spawn_status_poller(resource_id, STATUS_POLL_INTERVAL);
    let handle = pipeline::spawn(PipelineConfig::default(), poller.ready_signal());

    println!("> {}", STEPS[0].title);
    let mut progress = handle.progress();
    let mut printed = 0usize;
    while !progress.borrow().all_done {
        progress.changed().await?;
        let snapshot = progress.borrow_and_update().clone();
        for (index, status) in snapshot.statuses.iter().enumerate() {
            if *status == StepStatus::Complete && index >= printed {
                println!("  done: {}", STEPS[index].title);
                printed = index + 1;
                if index + 1 < STEPS.len() {
                    println!("> {}", STEPS[index + 1].title);
                }
            }
        }
    }
    session.analysis().mark_pipeline_viewed();

    match poller.join().await {
        Some(report) => {
            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{json}");
        }
        None => println!("Analysis finished but no report payload was returned."),
    }
    Ok(())
}
