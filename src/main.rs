//! SelfMachine Core - Entry Point
//!
//! Operator tool around the library: recovers (or creates) a session and runs
//! the machine-inactivity report for a store.
//!
//! Environment:
//! - SELFMACHINE_API_URL      Backend base URL
//! - SELFMACHINE_HOSTNAME     Hostname for tenant resolution
//! - SELFMACHINE_LOJA_ID      Store to monitor
//! - SELFMACHINE_EMAIL/SENHA  Credentials for --login

use selfmachine_core::{activity, ApiClient, AuthMachine, Config, HeaderCell, ReportStatus, SessionStore};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let login_mode = args.iter().any(|a| a == "--login" || a == "-l");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("SelfMachine Core v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: selfmachine-core [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --login, -l   Authenticate with SELFMACHINE_EMAIL/SELFMACHINE_SENHA first");
        println!("  --help, -h    Show this help");
        println!();
        println!("Default: reuse the durable session and report machines without");
        println!("movement in the last {} hours for SELFMACHINE_LOJA_ID.", activity::INACTIVITY_WINDOW_HOURS);
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("SelfMachine Core v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let headers = HeaderCell::new();
    let store = SessionStore::open(&config.storage_dir, headers.clone())?;
    let api = ApiClient::new(&config.api_base_url, &config.hostname, headers);
    let auth = AuthMachine::new(api.clone(), store, &config.hostname);

    auth.bootstrap().await;

    if login_mode {
        let email = std::env::var("SELFMACHINE_EMAIL")
            .map_err(|_| anyhow::anyhow!("SELFMACHINE_EMAIL not set"))?;
        let senha = std::env::var("SELFMACHINE_SENHA")
            .map_err(|_| anyhow::anyhow!("SELFMACHINE_SENHA not set"))?;
        auth.login(&email, &senha)
            .await
            .map_err(|e| anyhow::anyhow!("login failed: {}", e))?;
    }

    let snapshot = auth.current();
    if !snapshot.is_authenticated() {
        anyhow::bail!("no session available; run with --login");
    }
    info!(
        "session active (tenant: {})",
        snapshot
            .tenant
            .as_ref()
            .map(|t| t.nome.as_str())
            .unwrap_or("plataforma")
    );

    let loja_id = match config.default_loja_id {
        Some(id) => id,
        None => {
            warn!("SELFMACHINE_LOJA_ID not set, nothing to monitor");
            return Ok(());
        }
    };

    let now = chrono::Utc::now();
    let desde = now - chrono::Duration::hours(activity::INACTIVITY_WINDOW_HOURS);
    let machines = api.machines(&loja_id).await?;
    let movements = api.movements_since(&loja_id, desde).await?;

    let report = activity::report(&loja_id, &machines, &movements, now);
    match report.status() {
        ReportStatus::NoMachines => {
            warn!("loja {} has no machines registered", loja_id);
        }
        ReportStatus::AllActive => {
            info!(
                "all {} machines of loja {} moved in the last {}h",
                report.machine_count(),
                loja_id,
                activity::INACTIVITY_WINDOW_HOURS
            );
        }
        ReportStatus::HasInactive => {
            let names: Vec<&str> = machines
                .iter()
                .filter(|m| report.inactive.contains(&m.id))
                .map(|m| m.nome.as_str())
                .collect();
            warn!(
                "{} machine(s) of loja {} without movement in the last {}h: {}",
                report.inactive.len(),
                loja_id,
                activity::INACTIVITY_WINDOW_HOURS,
                names.join(", ")
            );
        }
    }

    Ok(())
}
