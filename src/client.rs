//! Command-line client for a remote gateway.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{CommandsResponse, HealthResponse};
use crate::config::ClientArgs;
use crate::executor::ExecutionResult;

/// Body returned by `/exec`: either a result or a gateway error.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExecReply {
    Error { error: String },
    Result(ExecutionResult),
}

pub struct GatewayClient {
    http: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(args: &ClientArgs) -> Result<Self> {
        let http = Client::builder()
            .timeout(args.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: args.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn exec(&self, cmd: &str) -> Result<ExecReply> {
        let response = self
            .http
            .post(self.url("/exec"))
            .json(&json!({ "cmd": cmd }))
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        serde_json::from_value(body)
            .with_context(|| format!("Unexpected /exec response (HTTP {})", status))
    }

    pub async fn commands(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("/commands"))
            .send()
            .await?
            .error_for_status()?;
        let body: CommandsResponse = response.json().await?;
        Ok(body.commands)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Run a remote command, echoing its streams. Returns true on exit code 0.
pub async fn run_remote_cmd(args: &ClientArgs, cmd: &str) -> Result<bool> {
    let client = GatewayClient::new(args)?;
    match client.exec(cmd).await {
        Ok(ExecReply::Error { error }) => {
            eprintln!("Error: {}", error);
            Ok(false)
        }
        Ok(ExecReply::Result(result)) => {
            if !result.stdout.is_empty() {
                println!("{}", result.stdout.trim_end());
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr.trim_end());
            }
            Ok(result.returncode == 0)
        }
        Err(e) => {
            eprintln!("Connection error: {:#}", e);
            Ok(false)
        }
    }
}

pub async fn print_commands(args: &ClientArgs) -> Result<bool> {
    let client = GatewayClient::new(args)?;
    match client.commands().await {
        Ok(commands) => {
            println!("{} allowlisted commands:", commands.len());
            for cmd in commands {
                println!(" - {}", cmd);
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to fetch commands: {:#}", e);
            Ok(false)
        }
    }
}

pub async fn check_health(args: &ClientArgs) -> Result<bool> {
    let client = GatewayClient::new(args)?;
    match client.health().await {
        Ok(health) => {
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(true)
        }
        Err(e) => {
            eprintln!("Health check failed: {:#}", e);
            Ok(false)
        }
    }
}
