//! Framelink client - auto-sends a payload and prints client events as JSON lines.

use std::env;
use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framelink::sink::{client_event_json, write_stdout_json};
use framelink::{ClientBuilder, ClientConfig};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    init_logging(arg_value(&args, "--log-format").as_deref().unwrap_or("pretty"));

    let mut config = match arg_value(&args, "--config") {
        Some(path) => match ClientConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };

    if let Some(payload) = arg_value(&args, "--payload") {
        config.auto_payload = payload;
        config.auto_send = true;
    }
    if let Some(value) = arg_value(&args, "--interval") {
        match value.parse::<u32>() {
            Ok(ms) => config.auto_interval_ms = ms,
            Err(e) => {
                eprintln!("Invalid --interval: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let host = arg_value(&args, "--host").unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match arg_value(&args, "--port").map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        Some(Err(e)) => {
            eprintln!("Invalid --port: {}", e);
            return ExitCode::FAILURE;
        }
        None => 9000,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(config, host, port)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "client failed");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(config: ClientConfig, host: String, port: u16) -> framelink::Result<()> {
    let (client, mut events) = ClientBuilder::from_config(config).spawn();
    client.connect(host, port);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                write_stdout_json(&client_event_json(&event))?;
            }
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    client.shutdown();
    while let Some(event) = events.recv().await {
        write_stdout_json(&client_event_json(&event))?;
    }

    let snapshot = client.snapshot();
    info!(sent = snapshot.sent, received = snapshot.received, "client stopped");
    Ok(())
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (i, arg) in args.iter().enumerate() {
        if arg == name {
            return args.get(i + 1).cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
    }
    None
}

fn init_logging(format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format.to_lowercase().as_str() {
        "json" => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        _ => registry.with(fmt::layer().pretty().with_writer(std::io::stderr)).init(),
    }
}

fn print_help() {
    println!(
        r#"framelink client

USAGE:
    client [OPTIONS]

OPTIONS:
    --host <HOST>              Server host [default: 127.0.0.1]
    --port <PORT>              Server port [default: 9000]
    --payload <TEXT>           Auto-send TEXT (enables auto-send)
    --interval <MS>            Auto-send interval [default: 3000]
    --config <PATH>            JSON client configuration
    --log-format <FORMAT>      pretty | json [default: pretty]
    -h, --help                 Print help information
"#
    );
}
