use messenger_console::args::Args;
use messenger_console::commands::{self, ConsoleCommand};
use messenger_console::error::ConsoleError;
use messenger_console::logger::initialize as LoggerInitialize;
use messenger_console::render::describe;

use transport_core::auth::HttpAuthApi;
use transport_core::events::{Event, EventStream};
use transport_core::session::MessagingClient;
use transport_core::store::JsonFileStore;
use transport_core::transport::WebSocketTransport;

use common::ErrorLocation;

use std::fmt::Display;
use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use tokio::time::timeout;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ConsoleError> {
    // .env values only fill variables the shell has not set
    let dotenv_path = dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_dir = args.log_dir();
    create_dir_all(&log_dir).map_err(|e| ConsoleError::Console {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir, args.log_level())?;

    info!("Messenger console starting");
    info!("Log file: {}", args.log_file().display());
    if let Some(path) = dotenv_path {
        info!("Loaded .env from: {}", path.display());
    }

    let config = args.resolve_config()?;
    info!("Deployment {} on {}", config.deployment_id, config.domain);

    let base_url = config.api_base_url().map_err(session_error)?;
    let api = HttpAuthApi::new(base_url, &config.deployment_id).map_err(session_error)?;
    let store = JsonFileStore::open(args.store_path()).map_err(session_error)?;

    let (client, events) = MessagingClient::new(
        config,
        Arc::new(WebSocketTransport::new()),
        api,
        Arc::new(store),
    )
    .map_err(session_error)?;

    if client.was_authenticated() {
        println!("* this deployment was signed in before; /auth to sign in again");
    }

    let quitting = Arc::new(AtomicBool::new(false));
    let mut printer = tokio::spawn(print_events(
        client.clone(),
        events,
        Arc::clone(&quitting),
    ));

    if let Err(e) = client.connect().await {
        warn!("Initial connect failed: {e}");
    }

    read_commands(&client, &quitting).await?;

    // The printer holds a client clone, so it only ends on the final close
    if timeout(SHUTDOWN_GRACE, &mut printer).await.is_err() {
        printer.abort();
    }

    info!("Messenger console exiting");
    Ok(())
}

#[track_caller]
fn session_error(e: impl Display) -> ConsoleError {
    ConsoleError::Session {
        message: e.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Print every event and run the console's own follow-ups. Ends on a
/// terminal state once the user has asked to quit.
async fn print_events(
    client: MessagingClient,
    mut events: EventStream,
    quitting: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        println!("{}", describe(&event));

        if quitting.load(Ordering::SeqCst)
            && matches!(&event, Event::StateChanged { new, .. } if new.is_terminal())
        {
            return;
        }

        let authenticated = client.auth_jwt().await.is_some();
        if let Some(command) = commands::follow_up(&event, authenticated)
            && let Err(e) = commands::execute(&client, command).await
        {
            println!("! {e}");
        }
    }
}

async fn read_commands(
    client: &MessagingClient,
    quitting: &AtomicBool,
) -> Result<(), ConsoleError> {
    let mut lines = BufReader::new(stdin()).lines();

    loop {
        let line = lines.next_line().await.map_err(|e| ConsoleError::Console {
            message: format!("Failed to read stdin: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        // EOF behaves like /quit
        let command = match line {
            None => ConsoleCommand::Quit,
            Some(line) => match commands::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("! {e}");
                    continue;
                }
            },
        };

        let quit = command == ConsoleCommand::Quit;
        quitting.store(quit, Ordering::SeqCst);
        match commands::execute(client, command).await {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => {}
            Err(e) if quit => info!("Disconnect on quit: {e}"),
            Err(e) => println!("! {e}"),
        }
        if quit {
            return Ok(());
        }
    }
}
