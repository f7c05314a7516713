//! Command-line and environment configuration.
//!
//! Values come from flags first, then the environment (including a `.env`
//! file loaded at startup), then the defaults below.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_ALLOWLIST: &str = "/opt/mcp/server/allowed_cmds.txt";
pub const DEFAULT_LAUNCHER: &str = "source ~/.local/bin/env && specify";

#[derive(Debug, Parser)]
#[command(name = "linuxops", version, about = "Allowlisted remote command gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the allowlisted command gateway (HTTP)
    Serve(GatewayArgs),

    /// Run an allowlisted command on a remote gateway
    Exec {
        #[command(flatten)]
        client: ClientArgs,

        /// Command words, joined with single spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// List the commands a remote gateway allows
    List(ClientArgs),

    /// Show a remote gateway's health
    Health(ClientArgs),

    /// Serve the spec-kit browser UI and its JSON API
    SpeckitWeb(SpeckitWebArgs),

    /// Speak the line-delimited spec-kit tool protocol on stdin/stdout
    SpeckitStdio(SpeckitArgs),
}

#[derive(Debug, Clone, Args)]
pub struct GatewayArgs {
    /// Address to bind
    #[arg(long, env = "MCP_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, short, env = "MCP_PORT", default_value_t = 3030)]
    pub port: u16,

    /// Allowlist file, one command per line
    #[arg(long, env = "MCP_ALLOWLIST", default_value = DEFAULT_ALLOWLIST)]
    pub allowlist: PathBuf,

    /// Name reported by /health
    #[arg(long, env = "MCP_SERVER_NAME", default_value = "linuxOps")]
    pub server_name: String,

    /// Wall-clock limit per command
    #[arg(
        long,
        env = "MCP_EXEC_TIMEOUT_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Shell used to interpret allowlisted commands
    #[arg(long, env = "MCP_SHELL", default_value = "/bin/sh")]
    pub shell: String,
}

impl GatewayArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    /// Gateway base URL
    #[arg(long, env = "MCP_URL", default_value = "http://127.0.0.1:3030")]
    pub url: String,

    /// HTTP request timeout; keep above the gateway's command timeout
    #[arg(
        long,
        default_value_t = 75,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_secs: u64,
}

impl ClientArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct SpeckitArgs {
    /// Shell prefix that resolves and invokes `specify`
    #[arg(long, env = "SPECKIT_LAUNCHER", default_value = DEFAULT_LAUNCHER)]
    pub launcher: String,

    /// Shell used to run the launcher
    #[arg(long, env = "SPECKIT_SHELL", default_value = "/bin/bash")]
    pub shell: String,

    /// Wall-clock limit per `specify` invocation
    #[arg(
        long,
        env = "SPECKIT_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct SpeckitWebArgs {
    /// Address to bind
    #[arg(long, env = "SPECKIT_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, short, env = "SPECKIT_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Shell prefix that resolves and invokes `specify`
    #[arg(long, env = "SPECKIT_LAUNCHER", default_value = DEFAULT_LAUNCHER)]
    pub launcher: String,

    /// Shell used to run the launcher
    #[arg(long, env = "SPECKIT_SHELL", default_value = "/bin/bash")]
    pub shell: String,

    /// Wall-clock limit per `specify` invocation
    #[arg(
        long,
        env = "SPECKIT_WEB_TIMEOUT_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,
}

impl SpeckitWebArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["linuxops", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.allowlist, PathBuf::from(DEFAULT_ALLOWLIST));
        assert_eq!(args.shell, "/bin/sh");
        assert_eq!(args.server_name, "linuxOps");
    }

    #[test]
    fn test_exec_keeps_hyphenated_words() {
        let cli = Cli::try_parse_from(["linuxops", "exec", "--url", "http://h:1", "df", "-h"])
            .unwrap();
        let Commands::Exec { client, words } = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(client.url, "http://h:1");
        assert_eq!(words.join(" "), "df -h");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let parsed = Cli::try_parse_from(["linuxops", "serve", "--timeout-secs", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(Cli::try_parse_from(["linuxops", "exec"]).is_err());
    }
}
