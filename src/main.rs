use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use service_hours::config::{has_flag, Config, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = Config::from_env_and_args(&args);

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "service_hours::startup",
        "service-hours starting: RUST_LOG='{}', http_port={}, data_dir='{}', snapshot_ms={}, domain={}, audience_check={}, roster={:?}, admins={:?}, secure_cookies={}",
        rust_log,
        config.http_port,
        config.data_dir.display(),
        config.snapshot_ms,
        config.domain,
        config.client_id.is_some(),
        config.roster_path,
        config.admins_path,
        config.secure_cookies
    );

    service_hours::server::run_with_config(config).await
}
