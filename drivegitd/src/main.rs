use drivegitd::runner::{RunnerConfig, SyncRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    DryRun,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--dry-run" => mode = CliMode::DryRun,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: drivegitd [--dry-run]");
            println!("  --dry-run   Walk the remote tree and print the plan without syncing");
            return Ok(());
        }
        CliMode::DryRun => {
            let config = RunnerConfig::from_env()?;
            let runner = SyncRunner::bootstrap(config).await?;
            let plan = runner.plan().await?;
            for item in plan.items() {
                println!("{item}");
            }
            println!(
                "{} files to fetch, {} empty-folder markers",
                plan.fetch_count(),
                plan.marker_count()
            );
            return Ok(());
        }
        CliMode::Run => {}
    }

    let config = RunnerConfig::from_env()?;
    let runner = SyncRunner::bootstrap(config).await?;
    runner.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_mode_defaults_to_run() {
        let mode = parse_cli_mode(vec!["drivegitd".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Run);
    }

    #[test]
    fn parse_cli_mode_supports_dry_run() {
        let mode = parse_cli_mode(vec!["drivegitd".to_string(), "--dry-run".to_string()]).unwrap();
        assert_eq!(mode, CliMode::DryRun);
    }

    #[test]
    fn parse_cli_mode_supports_help() {
        let mode = parse_cli_mode(vec!["drivegitd".to_string(), "--help".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_arguments() {
        assert!(parse_cli_mode(vec!["drivegitd".to_string(), "--verbose".to_string()]).is_err());
    }
}
