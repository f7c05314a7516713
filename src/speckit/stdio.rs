//! Line-delimited JSON tool adapter for `specify`.
//!
//! Each stdin line holds one request object tagged by `type`; each reply is
//! written as a single stdout line. Tools form a closed set bound to
//! handlers at compile time.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{find_invalid_arg, SpecifyOutcome, SpecifyRunner, SpecifySubcommand};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "spec-kit-mcp-server";

// ============================================================================
// Protocol Messages
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Request {
    #[serde(rename = "initialize")]
    Initialize {},
    #[serde(rename = "tools/list")]
    ToolsList {},
    #[serde(rename = "tools/call")]
    ToolsCall {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum Reply {
    #[serde(rename = "initialize")]
    Initialize {
        #[serde(rename = "protocolVersion")]
        protocol_version: &'static str,
        capabilities: Value,
        #[serde(rename = "serverInfo")]
        server_info: ServerInfo,
    },
    #[serde(rename = "tools/list")]
    ToolsList { tools: Vec<ToolDescriptor> },
    #[serde(rename = "tools/call")]
    ToolsCall {
        name: Option<String>,
        /// JSON-encoded tool outcome
        result: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

// ============================================================================
// Tool Parameter Types
// ============================================================================

/// Parameters for specify_init.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct InitParams {
    /// Directory path for new Specify project (defaults to current directory)
    #[serde(default)]
    pub path: Option<String>,
}

/// Tools without parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

/// Parameters for specify_run_command.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RunCommandParams {
    /// The specify subcommand to run (e.g., 'init', 'check', 'version')
    #[serde(default)]
    pub command: String,
    /// Additional arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}))
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifyTool {
    Init,
    Check,
    Version,
    RunCommand,
}

impl SpecifyTool {
    pub const ALL: [SpecifyTool; 4] = [
        SpecifyTool::Init,
        SpecifyTool::Check,
        SpecifyTool::Version,
        SpecifyTool::RunCommand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpecifyTool::Init => "specify_init",
            SpecifyTool::Check => "specify_check",
            SpecifyTool::Version => "specify_version",
            SpecifyTool::RunCommand => "specify_run_command",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            SpecifyTool::Init => "Initialize a new Specify project from the latest template",
            SpecifyTool::Check => "Check that all required tools are installed for Specify",
            SpecifyTool::Version => "Display version and system information for Specify",
            SpecifyTool::RunCommand => "Run a raw specify command with custom arguments",
        }
    }

    fn input_schema(&self) -> Value {
        match self {
            SpecifyTool::Init => schema_value::<InitParams>(),
            SpecifyTool::Check | SpecifyTool::Version => schema_value::<NoParams>(),
            SpecifyTool::RunCommand => schema_value::<RunCommandParams>(),
        }
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

fn parse_params<T: for<'de> Deserialize<'de> + Default>(arguments: Value) -> Result<T, String> {
    if arguments.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(arguments).map_err(|e| format!("Invalid parameters: {}", e))
}

// ============================================================================
// Server
// ============================================================================

pub struct StdioServer {
    runner: SpecifyRunner,
}

impl StdioServer {
    pub fn new(runner: SpecifyRunner) -> Self {
        Self { runner }
    }

    /// Validate then run. Rejections mirror a failed process with code 1.
    async fn run_checked(&self, command: &str, args: &[String]) -> SpecifyOutcome {
        let sub: SpecifySubcommand = match command.parse() {
            Ok(sub) => sub,
            Err(e) => return SpecifyOutcome::failure(e.to_string(), 1),
        };
        if let Some(arg) = find_invalid_arg(args) {
            return SpecifyOutcome::failure(format!("Invalid characters in argument: {}", arg), 1);
        }
        self.runner.run(sub, args).await
    }

    /// Call a tool by name. The returned value is the tool's JSON result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let Some(tool) = SpecifyTool::from_name(name) else {
            return json!({ "success": false, "stderr": format!("Unknown tool: {}", name) });
        };

        let outcome = match tool {
            SpecifyTool::Init => match parse_params::<InitParams>(arguments) {
                Ok(params) => {
                    let args: Vec<String> = params
                        .path
                        .filter(|p| p != ".")
                        .into_iter()
                        .collect();
                    self.run_checked("init", &args).await
                }
                Err(e) => SpecifyOutcome::failure(e, 1),
            },
            SpecifyTool::Check => self.run_checked("check", &[]).await,
            SpecifyTool::Version => self.run_checked("version", &[]).await,
            SpecifyTool::RunCommand => match parse_params::<RunCommandParams>(arguments) {
                Ok(params) if params.command.is_empty() => {
                    return json!({
                        "success": false,
                        "stderr": "command parameter is required"
                    });
                }
                Ok(params) => self.run_checked(&params.command, &params.args).await,
                Err(e) => SpecifyOutcome::failure(e, 1),
            },
        };

        serde_json::to_value(outcome).unwrap_or_else(|_| json!({ "success": false }))
    }

    /// Handle one input line, returning the reply object.
    async fn handle_line(&self, line: &str) -> Reply {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Reply::Error {
                    message: format!("Invalid JSON: {}", e),
                }
            }
        };

        let request_type = value
            .get("type")
            .map(|t| t.as_str().map(String::from).unwrap_or_else(|| t.to_string()))
            .unwrap_or_else(|| "null".to_string());

        let request = match serde_json::from_value::<Request>(value) {
            Ok(request) => request,
            Err(e) if request_type == "tools/call" => {
                return Reply::Error {
                    message: e.to_string(),
                }
            }
            Err(_) => Request::Unknown,
        };

        match request {
            Request::Initialize {} => Reply::Initialize {
                protocol_version: PROTOCOL_VERSION,
                capabilities: json!({}),
                server_info: ServerInfo {
                    name: SERVER_NAME,
                    version: env!("CARGO_PKG_VERSION"),
                },
            },
            Request::ToolsList {} => Reply::ToolsList {
                tools: SpecifyTool::ALL.iter().map(SpecifyTool::descriptor).collect(),
            },
            Request::ToolsCall { name, arguments } => {
                let tool_name = name.clone().unwrap_or_default();
                tracing::debug!(tool = %tool_name, "Tool call");
                let result = self
                    .call_tool(&tool_name, arguments.unwrap_or(Value::Null))
                    .await;
                Reply::ToolsCall {
                    name,
                    result: result.to_string(),
                }
            }
            Request::Unknown => Reply::Error {
                message: format!("Unknown request type: {}", request_type),
            },
        }
    }

    /// Serve requests until the reader reaches EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("Spec-Kit stdio server started");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            // A bad line gets an error reply; the session keeps going.
            let reply = match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.handle_line(line).await
                }
                Err(e) => Reply::Error {
                    message: format!("Invalid JSON: {}", e),
                },
            };
            let mut encoded = serde_json::to_string(&reply).map_err(std::io::Error::other)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
        tracing::info!("Spec-Kit stdio server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server() -> StdioServer {
        StdioServer::new(SpecifyRunner::new(
            "/bin/sh",
            "echo specify",
            Duration::from_secs(10),
        ))
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server()
            .serve(input.as_bytes(), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn call_result(reply: &Value) -> Value {
        serde_json::from_str(reply["result"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let replies = exchange("{\"type\":\"initialize\"}\n\n{\"type\":\"tools/list\"}\n").await;
        assert_eq!(replies.len(), 2);

        assert_eq!(replies[0]["type"], "initialize");
        assert_eq!(replies[0]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(replies[0]["serverInfo"]["name"], SERVER_NAME);

        assert_eq!(replies[1]["type"], "tools/list");
        let tools = replies[1]["tools"].as_array().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec!["specify_init", "specify_check", "specify_version", "specify_run_command"]
        );
        let run_schema = &tools[3]["inputSchema"];
        assert!(run_schema["properties"]["command"].is_object());
        assert!(run_schema["properties"]["args"].is_object());
    }

    #[tokio::test]
    async fn test_errors() {
        let replies = exchange("not json\n{\"type\":\"ping\"}\n{\"foo\":1}\n").await;
        assert_eq!(replies[0]["type"], "error");
        assert!(replies[0]["message"].as_str().unwrap().starts_with("Invalid JSON"));
        assert_eq!(replies[1]["message"], "Unknown request type: ping");
        assert_eq!(replies[2]["message"], "Unknown request type: null");
    }

    #[tokio::test]
    async fn test_non_utf8_line_keeps_session() {
        let input: &[u8] = b"\xff\xfe{\"type\"}\n{\"type\":\"initialize\"}\n";
        let mut output = Vec::new();
        server().serve(input, &mut output).await.unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["type"], "error");
        assert!(replies[0]["message"].as_str().unwrap().starts_with("Invalid JSON"));
        assert_eq!(replies[1]["type"], "initialize");
    }

    #[tokio::test]
    async fn test_tool_calls() {
        let input = concat!(
            "{\"type\":\"tools/call\",\"name\":\"specify_version\"}\n",
            "{\"type\":\"tools/call\",\"name\":\"specify_init\",\"arguments\":{\"path\":\"demo\"}}\n",
            "{\"type\":\"tools/call\",\"name\":\"specify_init\",\"arguments\":{\"path\":\".\"}}\n",
            "{\"type\":\"tools/call\",\"name\":\"specify_run_command\",\"arguments\":{\"command\":\"check\",\"args\":[\"--debug\"]}}\n",
        );
        let replies = exchange(input).await;

        assert_eq!(replies[0]["type"], "tools/call");
        assert_eq!(replies[0]["name"], "specify_version");
        assert_eq!(call_result(&replies[0])["stdout"], "specify version\n");
        assert_eq!(call_result(&replies[1])["stdout"], "specify init demo\n");
        assert_eq!(call_result(&replies[2])["stdout"], "specify init\n");
        let run = call_result(&replies[3]);
        assert_eq!(run["stdout"], "specify check --debug\n");
        assert_eq!(run["success"], true);
    }

    #[tokio::test]
    async fn test_tool_call_rejections() {
        let server = server();

        let unknown = server.call_tool("specify_destroy", Value::Null).await;
        assert_eq!(
            unknown,
            json!({ "success": false, "stderr": "Unknown tool: specify_destroy" })
        );

        let missing = server
            .call_tool("specify_run_command", json!({ "args": [] }))
            .await;
        assert_eq!(
            missing,
            json!({ "success": false, "stderr": "command parameter is required" })
        );

        let bad_sub = server
            .call_tool("specify_run_command", json!({ "command": "deploy" }))
            .await;
        assert_eq!(bad_sub["returncode"], 1);
        assert!(bad_sub["stderr"].as_str().unwrap().starts_with("Unknown command: deploy"));

        let bad_arg = server
            .call_tool(
                "specify_run_command",
                json!({ "command": "init", "args": ["x`id`"] }),
            )
            .await;
        assert_eq!(bad_arg["returncode"], 1);
        assert_eq!(bad_arg["stderr"], "Invalid characters in argument: x`id`");

        let bad_path = server
            .call_tool("specify_init", json!({ "path": "a|b" }))
            .await;
        assert_eq!(bad_path["success"], false);

        let non_string = server
            .call_tool("specify_run_command", json!({ "command": "init", "args": [3] }))
            .await;
        assert_eq!(non_string["success"], false);
        assert_eq!(non_string["returncode"], 1);
    }
}
