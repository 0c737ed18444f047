use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "clustore",
    about = "clustore: inspect and edit item clusters through the storage manager",
    version
)]
/// Command-line arguments for the `clustore` binary.
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Storage configuration file. Defaults to a file backend in ./clustore-data
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what each backend can do per cluster type
    Capabilities,
    /// Print a fresh item id
    NewItem,
    /// Read one object, or list a bare cluster type
    Get(GetArgs),
    /// Store an object
    Put(PutArgs),
    /// List the names one level below a path
    Ls(LsArgs),
    /// Remove an object, or a whole subtree with --recursive
    Rm(RmArgs),
    /// Highest integer key under a path
    LastId(LastIdArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub item: String,
    pub path: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub item: String,
    pub path: String,
    /// Object content. `Property/<name>` paths store it as the property value
    pub value: Option<String>,
    /// Read content from a file instead
    #[arg(short, long, conflicts_with = "value")]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct LsArgs {
    pub item: String,
    /// Defaults to the item root
    pub path: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub item: String,
    pub path: String,
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct LastIdArgs {
    pub item: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = "0190f5a4-7d3e-7c2a-8b1f-3a4d5e6f7a8b";

    #[test]
    fn parse_capabilities() {
        let cli = Cli::try_parse_from(["clustore", "capabilities"]).unwrap();
        assert!(matches!(cli.command, Command::Capabilities));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_global_config() {
        let cli = Cli::try_parse_from(["clustore", "ls", ITEM, "--config", "c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.item, ITEM);
            assert!(args.path.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_put_value() {
        let cli = Cli::try_parse_from(["clustore", "put", ITEM, "Property/Name", "Bob"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.path, "Property/Name");
            assert_eq!(args.value, Some("Bob".into()));
            assert!(args.file.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn put_value_and_file_conflict() {
        let parsed =
            Cli::try_parse_from(["clustore", "put", ITEM, "Job/1", "x", "--file", "job.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parse_rm_recursive() {
        let cli = Cli::try_parse_from(["clustore", "rm", "-r", ITEM, "Outcome/Invoice"]).unwrap();
        if let Command::Rm(args) = cli.command {
            assert!(args.recursive);
            assert_eq!(args.path, "Outcome/Invoice");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_last_id() {
        let cli = Cli::try_parse_from(["clustore", "last-id", ITEM, "AuditTrail"]).unwrap();
        assert!(matches!(cli.command, Command::LastId(_)));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["clustore", "--format", "json", "new-item"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
