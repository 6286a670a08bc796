use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pushsync",
    version,
    about = "Scan for recently modified files and push them to a remote host over SSH"
)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(short, long, env = "PUSHSYNC_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Listen address, overriding `server.listen` from the configuration.
    #[arg(short, long, env = "PUSHSYNC_LISTEN")]
    pub listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_and_override() {
        let cli = Cli::try_parse_from(["pushsync"]).unwrap();
        if std::env::var_os("PUSHSYNC_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from("config.json"));
        }

        let cli =
            Cli::try_parse_from(["pushsync", "--config", "/etc/pushsync.json", "-l", "0.0.0.0:9000"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/pushsync.json"));
        assert_eq!(cli.listen.as_deref(), Some("0.0.0.0:9000"));
    }
}
