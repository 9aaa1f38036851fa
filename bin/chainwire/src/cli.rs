use std::path::PathBuf;

use chainwire_deploy::{CONFIG_FILENAME, Selection};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "chainwire")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts and wire them together"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "CHAINWIRE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the project manifest, or to the directory containing it.
    #[arg(short, long, alias = "conf", global = true, env = "CHAINWIRE_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// The network to target. Defaults to the manifest's `default_network`.
    #[arg(short, long, global = true, env = "CHAINWIRE_NETWORK")]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the selected artifacts and their missing dependencies.
    Deploy(DeployArgs),
    /// Run the wiring steps against the recorded deployments.
    Wire,
    /// Deploy, then wire.
    Run(DeployArgs),
    /// Show what `deploy` would do without sending anything.
    Plan(DeployArgs),
    /// List the deployments recorded on the network.
    Status,
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Comma separated tags or artifact names to deploy (`all` for everything).
    #[arg(short, long, env = "CHAINWIRE_TAGS", default_value = "all")]
    pub tags: Selection,

    /// Redeploy the selected artifacts even if they are already recorded.
    ///
    /// Dependencies that are already recorded are still reused.
    #[arg(long, env = "CHAINWIRE_FORCE", default_value_t = false)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_with_tags() {
        let cli = Cli::try_parse_from([
            "chainwire",
            "deploy",
            "--tags",
            "RewardToken,Governance",
            "--force",
            "-n",
            "sepolia",
        ])
        .unwrap();

        assert_eq!(cli.network.as_deref(), Some("sepolia"));
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));
        match cli.command {
            Command::Deploy(args) => {
                assert!(args.force);
                assert_eq!(args.tags, "Governance,RewardToken".parse::<Selection>().unwrap());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_selection_is_everything() {
        let cli = Cli::try_parse_from(["chainwire", "run"]).unwrap();

        match cli.command {
            Command::Run(args) => {
                assert!(args.tags.is_all());
                assert!(!args.force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
