use anyhow::Result;
use clap::Parser;
use flowmon::app::AppBuilder;
use flowmon::config::Config;
use std::fs::File;
use tokio::select;
use tracing::{info, level_filters::LevelFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Flow and SIP call continuity tracker for multipath gateways")]
struct Cli {
    /// Path to the TOML configuration file; defaults apply without one.
    #[clap(long)]
    conf: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.conf {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }
    let _appender_guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };

    let app = AppBuilder::new().config(config).build()?;
    info!("starting flowmon, publishing to {}", app.config.flows_path);
    select! {
        result = app.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received CTRL+C, shutting down");
        }
    }
    Ok(())
}
