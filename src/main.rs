use anyhow::Result;
use clap::Parser;
use stagehand::commands::{InstallRequest, install, repositories};
use std::path::PathBuf;

/// stagehand - staged package installer
///
/// Installs modules and scripts from the repositories listed in
/// repositories.json, in priority order. Every package is unpacked into a
/// private staging directory, validated, and only then moved into place.
///
/// Examples:
///   stagehand install Foo                      # Newest Foo from the first repository that has it
///   stagehand install Foo --version "[1.0,2.0)"
///   stagehand repositories                     # Show the configured repositories
#[derive(Parser, Debug)]
#[command(author, version = env!("STAGEHAND_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via STAGEHAND_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "STAGEHAND_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install packages by name
    Install(InstallArgs),

    /// List configured repositories in priority order
    Repositories,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package names
    #[arg(value_name = "NAME", required = true)]
    pub names: Vec<String>,

    /// Version or version range, e.g. 1.0, [1.0], [1.0,2.0)
    #[arg(long, value_name = "RANGE")]
    pub version: Option<String>,

    /// Allow prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Only search these repositories (repeatable)
    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,

    /// Accept license terms without prompting
    #[arg(long)]
    pub accept_license: bool,

    /// Install even when a matching version is already present
    #[arg(long)]
    pub reinstall: bool,

    /// Do not prompt for untrusted repositories
    #[arg(long)]
    pub force: bool,

    /// Treat every repository as trusted for this run
    #[arg(long)]
    pub trust_repository: bool,

    /// Bearer credential sent to remote repositories
    #[arg(long, env = "STAGEHAND_CREDENTIAL", value_name = "TOKEN", hide_env_values = true)]
    pub credential: Option<String>,

    /// Save the package archive to the install root instead of installing it
    #[arg(long)]
    pub save_only: bool,

    /// Do not write package-info.json into installed module directories
    /// (scripts always keep their install record)
    #[arg(long)]
    pub no_metadata: bool,

    /// Answer yes to every prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl From<InstallArgs> for InstallRequest {
    fn from(args: InstallArgs) -> Self {
        InstallRequest {
            names: args.names,
            version: args.version,
            prerelease: args.prerelease,
            repositories: args.repositories,
            accept_license: args.accept_license,
            reinstall: args.reinstall,
            force: args.force,
            trust_repository: args.trust_repository,
            credential: args.credential,
            save_only: args.save_only,
            no_metadata: args.no_metadata,
            yes: args.yes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = stagehand::runtime::RealRuntime;

    match cli.command {
        Commands::Install(args) => install(runtime, args.into(), cli.install_root).await?,
        Commands::Repositories => repositories(runtime)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from(["stagehand", "install", "Foo", "Bar"]).unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.names, vec!["Foo", "Bar"]);
                assert!(!args.reinstall);
                assert_eq!(args.version, None);
            }
            _ => panic!("Expected Install command"),
        }
        assert_eq!(cli.install_root, None);
    }

    #[test]
    fn test_cli_install_flags() {
        let cli = Cli::try_parse_from([
            "stagehand",
            "install",
            "Foo",
            "--version",
            "[1.0,2.0)",
            "--repository",
            "R1",
            "--repository",
            "R2",
            "--accept-license",
            "--trust-repository",
            "--no-metadata",
            "-y",
        ])
        .unwrap();
        let Commands::Install(args) = cli.command else {
            panic!("Expected Install command");
        };
        let request = InstallRequest::from(args);
        assert_eq!(request.version.as_deref(), Some("[1.0,2.0)"));
        assert_eq!(request.repositories, vec!["R1", "R2"]);
        assert!(request.accept_license);
        assert!(request.trust_repository);
        assert!(request.no_metadata);
        assert!(request.yes);
        assert!(!request.force);
    }

    #[test]
    fn test_cli_install_requires_a_name() {
        assert!(Cli::try_parse_from(["stagehand", "install"]).is_err());
    }

    #[test]
    fn test_cli_global_root_parsing() {
        let cli = Cli::try_parse_from(["stagehand", "--root", "/tmp", "repositories"]).unwrap();
        assert_eq!(cli.install_root, Some(PathBuf::from("/tmp")));
        assert!(matches!(cli.command, Commands::Repositories));
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["stagehand", "Foo"]).is_err());
    }
}
