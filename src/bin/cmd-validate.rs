use std::process::ExitCode;

use anyhow::Result;
use cmd_validator::{Config, cli};

fn main() -> Result<ExitCode> {
    let config = Config::from_args_and_env()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    if let Some(path) = &config.config_file {
        log::debug!("Using configuration file {}", path.display());
    }

    let all_valid = cli::run(&config)?;
    Ok(if all_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
