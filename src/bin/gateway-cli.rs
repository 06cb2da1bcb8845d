use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

const SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the vehicle gateway", long_about = None)]
struct Cli {
    /// Gateway JSON-RPC endpoint.
    #[arg(short, long, default_value = "http://localhost:3000/mcp")]
    url: String,

    /// Bearer token, when the gateway has auth enabled.
    #[arg(short, long)]
    token: Option<String>,

    /// Session id to reuse. A new one is issued by the gateway otherwise.
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Round-trip a ping
    Ping,
    /// Call a method
    Call {
        method: String,
        /// Params as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Request id (defaults to 1)
        #[arg(long, default_value_t = 1)]
        id: i64,
    },
    /// Cancel an in-flight request on the session
    Cancel {
        request_id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Terminate the session
    EndSession,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }
    if let Some(session) = &cli.session {
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_str(session)?);
    }

    match cli.command {
        Commands::Ping => {
            let body = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
            let res = client.post(&cli.url).headers(headers).json(&body).send().await?;
            print_response(res).await?;
        }
        Commands::Call { method, params, id } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!({}),
            };
            let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
            let res = client.post(&cli.url).headers(headers).json(&body).send().await?;
            print_response(res).await?;
        }
        Commands::Cancel { request_id, reason } => {
            if cli.session.is_none() {
                eprintln!("Error: --session is required to cancel a request");
                return Ok(());
            }
            let body = json!({
                "jsonrpc": "2.0",
                "method": "notifications/cancelled",
                "params": {"requestId": request_id, "reason": reason},
            });
            let res = client.post(&cli.url).headers(headers).json(&body).send().await?;
            print_response(res).await?;
        }
        Commands::EndSession => {
            if cli.session.is_none() {
                eprintln!("Error: --session is required to end a session");
                return Ok(());
            }
            let res = client.delete(&cli.url).headers(headers).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(session) = res.headers().get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()) {
        eprintln!("Session: {}", session);
    }

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Some(challenge) = res.headers().get("www-authenticate").and_then(|v| v.to_str().ok()) {
            eprintln!("Challenge: {}", challenge);
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
