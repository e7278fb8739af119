mod activity;
mod cli;
mod config;
mod directory;
mod error;
mod gate;
mod model;
mod notify;
mod pass;
mod roster;
mod session;
mod store;
mod verify;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "campus-pass", about = "Campus access pass for students")]
pub struct Args {
    #[arg(short, long, help = "Run a single command (e.g. \"/status\") and exit")]
    pub command: Option<String>,

    #[arg(long, env = "CAMPUS_PASS_BASE_URL", help = "Database base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "File holding the signed-in student")]
    pub session_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Register the student in FILE (JSON) and exit")]
    pub enroll: Option<PathBuf>,

    #[arg(long, help = "Do not write the activity log")]
    pub no_activity: bool,

    #[arg(long, help = "Debug output (HTTP requests and state changes)")]
    pub debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };

    // CLI overrides
    if let Some(base_url) = &args.base_url {
        cfg.store.base_url = Some(base_url.clone());
    }
    if let Some(path) = &args.session_file {
        cfg.session.path = Some(path.clone());
    }
    if args.no_activity {
        cfg.activity.enabled = Some(false);
    }

    if let Err(errors) = cfg.validate() {
        for err in &errors {
            eprintln!("Config error {}", err);
        }
        return Err(anyhow::anyhow!("Invalid configuration"));
    }
    tracing::debug!(base_url = cfg.store.base_url(), "Configuration loaded");

    let store = store::FirebaseStore::new(
        cfg.store.base_url(),
        cfg.store.resolve_auth_token(),
        cfg.store.timeout(),
    );
    let notifier: Arc<dyn notify::Notifier> = Arc::new(notify::ConsoleNotifier);

    if let Some(path) = &args.enroll {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let student: model::Identity = serde_json::from_str(&content)
            .with_context(|| format!("Invalid student record in {}", path.display()))?;
        return match roster::enroll(&store, &student) {
            Ok(_) => {
                notifier.success("Student registered successfully");
                Ok(())
            }
            Err(e) => {
                notifier.failure(&e);
                Err(e.into())
            }
        };
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let activity = if cfg.activity_enabled() {
        let path = cfg.activity_dir().join(format!("{}.jsonl", run_id));
        activity::ActivityLog::new(&path, &run_id)?
    } else {
        activity::ActivityLog::disabled(&run_id)
    };

    let mut session = session::SessionStore::open(Box::new(session::FileStorage::new(
        &cfg.session_path(),
    )));
    session.subscribe(|identity| match identity {
        Some(student) => tracing::debug!(roll_no = %student.roll_no, "Session started"),
        None => tracing::debug!("Session ended"),
    });

    let expiry_notifier = Arc::clone(&notifier);
    let passes = pass::PassGenerator::new(&cfg.attendance_endpoint(), cfg.validity_secs())
        .on_expire(move || expiry_notifier.warning("Your entry pass has expired."));

    let ctx = cli::Context {
        args,
        config: cfg,
        store: Box::new(store),
        session: RefCell::new(session),
        passes: RefCell::new(passes),
        route: RefCell::new(gate::Route::Register),
        directory: RefCell::new(None),
        activity: RefCell::new(activity),
        notifier,
    };

    if let Some(command) = &ctx.args.command {
        cli::run_once(&ctx, command)
    } else {
        cli::run_repl(ctx)
    }
}
