//! respkv command-line client.
//!
//! With arguments, sends them as one command and prints the reply:
//!
//! ```text
//! $ respkv-cli SET name Ariz
//! OK
//! $ respkv-cli GET name
//! "Ariz"
//! ```
//!
//! Without arguments, reads commands from stdin, one per line.

use anyhow::Context;
use clap::Parser;
use respkv::client::{split_command_line, Client};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "respkv-cli", version, about = "Send commands to a respkv server")]
struct Args {
    /// Server host
    #[arg(short = 'H', long, env = "RESPKV_HOST", default_value = respkv::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, env = "RESPKV_PORT", default_value_t = respkv::DEFAULT_PORT)]
    port: u16,

    /// Command and arguments; omit to read commands from stdin
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut client = Client::connect(&address)
        .await
        .with_context(|| format!("could not connect to {}", address))?;

    if !args.command.is_empty() {
        let reply = client.send(&args.command).await?;
        println!("{}", reply);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts = match split_command_line(&line) {
            Some(parts) => parts,
            None => continue,
        };
        if parts[0].eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = client.send(&parts).await?;
        println!("{}", reply);
    }

    Ok(())
}
