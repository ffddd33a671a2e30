use std::future::Future;

use clap::Parser;
use veo_director::cli::{self, Cli, Command};
use veo_director::config::Config;

/// Load .env file without overriding existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

/// Run an async command to completion on a fresh runtime.
fn block_on<F>(command: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;
    rt.block_on(command)
}

fn run(args: Cli) -> Result<(), String> {
    let load_config = || Config::load(args.config.as_deref()).map_err(|e| e.to_string());

    match args.command {
        Command::Config { action } => cli::handle_config_action(action, args.config.as_deref()),
        Command::Suggest { idea, image } => {
            let cfg = load_config()?;
            block_on(cli::run_suggest(&cfg, &idea, image.as_deref()))
        }
        Command::Generate {
            prompt,
            image,
            aspect_ratio,
            output,
        } => {
            let cfg = load_config()?;
            block_on(cli::run_generate(
                &cfg,
                &prompt,
                image.as_deref(),
                aspect_ratio,
                output,
            ))
        }
        Command::Studio {
            image,
            aspect_ratio,
        } => {
            let cfg = load_config()?;
            block_on(cli::run_studio(&cfg, image, aspect_ratio))
        }
    }
}

fn main() {
    // Load .env file before anything else
    load_env();
    init_logging();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_not_overridden() {
        std::env::set_var("VEO_DIRECTOR_TEST_EXISTING_VAR", "original_value");

        let _ = dotenv::dotenv();

        assert_eq!(
            std::env::var("VEO_DIRECTOR_TEST_EXISTING_VAR").unwrap(),
            "original_value",
            "Existing env vars should not be overridden by dotenv"
        );
        std::env::remove_var("VEO_DIRECTOR_TEST_EXISTING_VAR");
    }

    #[test]
    fn test_run_dispatches_config_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_arg = path.to_str().unwrap();

        run(Cli::parse_from(["veo-director", "--config", path_arg, "config", "init"])).unwrap();
        assert!(path.exists());

        let again = run(Cli::parse_from(["veo-director", "--config", path_arg, "config", "init"]));
        assert!(again.unwrap_err().contains("already exists"));
    }

    #[test]
    fn test_run_reports_malformed_config_before_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\n").unwrap();
        let path_arg = path.to_str().unwrap();

        let result = run(Cli::parse_from(["veo-director", "--config", path_arg, "suggest", "idea"]));
        assert!(result.unwrap_err().contains("Failed to parse config file"));
    }
}
