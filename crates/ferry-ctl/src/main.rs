//! ferry-ctl: send and receive files, and query a running ferryd.

mod cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};

use ferry_core::wire::DEFAULT_PORT;

const DEFAULT_API_PORT: u16 = 6790;

fn print_usage() {
    println!("Usage: ferry-ctl [--api-port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  send <file>... --host <host> [--port <port>] [--json]");
    println!("                      Send files directly, one connection each");
    println!("  push <file>... --host <host> [--port <port>]");
    println!("                      Ask ferryd to send files");
    println!("  listen [--port <port>] [--dir <dir>] [--workers <n>]");
    println!("                      Receive files in the foreground until ctrl-c");
    println!("  status              Show daemon status");
    println!("  transfers           List transfers known to the daemon");
    println!("  shutdown            Stop the daemon");
    println!();
    println!("Options:");
    println!("  --api-port <port>   ferryd API port (default: {})", DEFAULT_API_PORT);
    println!("  --port <port>       Transfer port (default: {})", DEFAULT_PORT);
}

/// Options shared by all commands. Anything not recognised is left positional.
#[derive(Default)]
struct Args {
    api_port: Option<u16>,
    host: Option<String>,
    port: Option<u16>,
    dir: Option<PathBuf>,
    workers: Option<usize>,
    json: bool,
    positional: Vec<String>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--api-port" => {
                i += 1;
                args.api_port = Some(
                    raw.get(i)
                        .context("--api-port requires a value")?
                        .parse()
                        .context("--api-port must be a number")?,
                );
            }
            "--port" => {
                i += 1;
                args.port = Some(
                    raw.get(i)
                        .context("--port requires a value")?
                        .parse()
                        .context("--port must be a number")?,
                );
            }
            "--host" => {
                i += 1;
                args.host = Some(raw.get(i).context("--host requires a value")?.clone());
            }
            "--dir" => {
                i += 1;
                args.dir = Some(raw.get(i).context("--dir requires a value")?.into());
            }
            "--workers" => {
                i += 1;
                args.workers = Some(
                    raw.get(i)
                        .context("--workers requires a value")?
                        .parse()
                        .context("--workers must be a number")?,
                );
            }
            "--json" => args.json = true,
            other => args.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(args)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;
    let api_port = args.api_port.unwrap_or(DEFAULT_API_PORT);
    let positional: Vec<&str> = args.positional.iter().map(String::as_str).collect();

    match positional.as_slice() {
        ["send", files @ ..] if !files.is_empty() => {
            let host = args.host.as_deref().context("send requires --host")?;
            let failed = cmd::send::cmd_send(
                &args.positional[1..],
                host,
                args.port.unwrap_or(DEFAULT_PORT),
                args.json,
            )
            .await?;
            if failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        ["push", files @ ..] if !files.is_empty() => {
            let host = args.host.as_deref().context("push requires --host")?;
            cmd::send::cmd_push(
                api_port,
                &args.positional[1..],
                host,
                args.port.unwrap_or(DEFAULT_PORT),
            )
            .await
        }
        ["listen"] => {
            cmd::listen::cmd_listen(cmd::listen::ListenOptions {
                port: args.port,
                dir: args.dir.clone(),
                workers: args.workers,
            })
            .await
        }
        ["status"] | [] => cmd::status::cmd_status(api_port).await,
        ["transfers"] => cmd::status::cmd_transfers(api_port).await,
        ["shutdown"] => cmd::status::cmd_shutdown(api_port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
