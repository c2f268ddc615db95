//! mcp-probe: spawn an MCP server command and walk the standard handshake.
//!
//! Thin demonstration harness over the `mcplet` library: initialize, send
//! the initialized notification, list tools and resources, optionally read
//! one resource, then tear the server down. Results go to stdout as pretty
//! JSON; diagnostics go to stderr.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use mcplet::{ClientConfig, InitializeParams, McpSession, TransportConfig};
use tokio::process::Command;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug)]
struct Options {
    cwd: Option<PathBuf>,
    read_uri: Option<String>,
    timeout: Duration,
    command: String,
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: mcp-probe [--cwd <dir>] [--read <uri>] [--timeout <secs>] <command> [args...]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --cwd <dir>       Working directory for the server process");
            eprintln!("  --read <uri>      Also read this resource after listing");
            eprintln!("  --timeout <secs>  Per-call deadline in seconds [default: 30]");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(options).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut cwd: Option<PathBuf> = None;
    let mut read_uri: Option<String> = None;
    let mut timeout_secs: u64 = 30;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--cwd" => {
                i += 1;
                cwd = Some(PathBuf::from(args.get(i).ok_or("--cwd requires a value")?));
            }
            "--read" => {
                i += 1;
                read_uri = Some(args.get(i).ok_or("--read requires a value")?.clone());
            }
            "--timeout" => {
                i += 1;
                timeout_secs = args
                    .get(i)
                    .ok_or("--timeout requires a value")?
                    .parse()
                    .map_err(|_| "--timeout requires a whole number of seconds".to_string())?;
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            _ => {
                // Everything from the first bare argument on is the server
                // command line, flags included.
                return Ok(Options {
                    cwd,
                    read_uri,
                    timeout: Duration::from_secs(timeout_secs),
                    command: args[i].clone(),
                    args: args[i + 1..].to_vec(),
                });
            }
        }
        i += 1;
    }

    Err("missing server command".to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    let _ = subscriber.try_init();
}

async fn run(options: Options) -> anyhow::Result<()> {
    let mut command = Command::new(&options.command);
    command.args(&options.args);
    if let Some(dir) = &options.cwd {
        command.current_dir(dir);
    }

    tracing::info!(command = %options.command, "starting server");
    let client_config = ClientConfig::default().with_call_timeout(options.timeout);
    let mut session =
        McpSession::connect_with_config(command, TransportConfig::default(), client_config)?;

    let init = session.initialize(InitializeParams::default()).await?;
    print_step("initialize", &init)?;

    let tools = session.list_tools().await?;
    print_step("tools/list", &tools)?;

    let resources = session.list_resources().await?;
    print_step("resources/list", &resources)?;

    if let Some(uri) = &options.read_uri {
        let contents = session.read_resource(uri).await?;
        print_step("resources/read", &contents)?;
    }

    session.shutdown().await?;
    Ok(())
}

fn print_step(label: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{label}:");
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
