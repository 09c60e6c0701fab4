//! Framelink listener - prints every server event as a JSON line on stdout.

use std::env;
use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framelink::server::{ConnectionTable, ListenerBuilder, ServerEvent};
use framelink::sink::{server_event_json, write_stdout_json};
use framelink::ServerConfig;

const DEFAULT_PORT: u16 = 9000;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    init_logging(arg_value(&args, "--log-format").as_deref().unwrap_or("pretty"));

    let mut config = match arg_value(&args, "--config") {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    if let Some(value) = arg_value(&args, "--forced-interval") {
        match value.parse::<u32>() {
            Ok(ms) if ms > 0 => {
                config.interval_control = true;
                config.forced_interval_ms = ms;
            }
            _ => {
                eprintln!("Invalid --forced-interval '{}'", value);
                return ExitCode::FAILURE;
            }
        }
    }

    let port = match arg_value(&args, "--port").map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        Some(Err(e)) => {
            eprintln!("Invalid --port: {}", e);
            return ExitCode::FAILURE;
        }
        None => DEFAULT_PORT,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(config, port)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(config: ServerConfig, port: u16) -> framelink::Result<()> {
    let (mut listener, mut events) = ListenerBuilder::from_config(config).build();
    listener.start(port).await?;

    let mut table = ConnectionTable::new();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                table.apply(&event);
                write_stdout_json(&server_event_json(&event))?;
            }
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    listener.stop().await;
    while let Ok(event) = events.try_recv() {
        table.apply(&event);
        write_stdout_json(&server_event_json(&event))?;
        if event == ServerEvent::Stopped {
            break;
        }
    }

    info!(connections = table.len(), "server stopped");
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
        r#"framelink server

USAGE:
    server [OPTIONS]

OPTIONS:
    --port <PORT>              Port to listen on [default: {DEFAULT_PORT}]
    --forced-interval <MS>     Tell every client to send every MS milliseconds
    --config <PATH>            JSON server configuration
    --log-format <FORMAT>      pretty | json [default: pretty]
    -h, --help                 Print help information
"#
    );
}
