use std::fs::File;
use std::io::stdout;
use std::process::ExitCode;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, TryRecvError};

use clap::Parser;
use ratatui::DefaultTerminal;
use ratatui::crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use ratatui::crossterm::execute;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod aggregate;
mod controller;
mod domain;
mod gesture;
mod inputter;
mod layout;
mod model;
mod paginate;
mod pipeline;
mod source;
mod storage;
mod store;
mod ui;

use controller::Controller;
use domain::{Route, TVConfig, TVError};
use model::{Model, Status};
use store::Dataset;
use ui::TableUI;

/// Browse a CSV file page by page in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// CSV file to open
    path: String,

    /// View to start in
    #[arg(long, value_enum, default_value_t = Route::Table)]
    view: Route,

    /// Rows per page in the table view
    #[arg(long, default_value_t = 10)]
    page_size: usize,

    /// Rows per page in the pivot view
    #[arg(long, default_value_t = 15)]
    pivot_page_size: usize,

    /// Where the pivot view keeps its column layout
    #[arg(long, default_value = "~/.tabex_state.json")]
    state_file: String,

    /// Write logs to this file (RUST_LOG sets the level)
    #[arg(long)]
    log: Option<String>,

    /// Event poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(args.log.as_deref()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let mut terminal = ratatui::init();
    let result = execute!(stdout(), EnableMouseCapture)
        .map_err(TVError::from)
        .and_then(|_| run(&args, &mut terminal));
    let _ = execute!(stdout(), DisableMouseCapture);
    ratatui::restore();

    match result {
        Err(e) => {
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

/// Logs go to a file only; the terminal belongs to the UI.
fn init_logging(log: Option<&str>) -> Result<(), TVError> {
    let Some(path) = log else {
        return Ok(());
    };
    let file = File::create(source::expand_location(path))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: &Args, terminal: &mut DefaultTerminal) -> Result<(), TVError> {
    info!("Starting tabex on {} ({})", args.path, args.view.path());

    let cfg = TVConfig::default()
        .with_event_poll_time(args.poll_ms)
        .with_table_page_size(args.page_size)
        .with_pivot_page_size(args.pivot_page_size);
    let store = storage::open_or_memory(source::expand_location(&args.state_file));
    let size = terminal.size()?;

    let mut model = Model::init(
        &cfg,
        args.view,
        args.path.clone(),
        store,
        size.width as usize,
        size.height as usize,
    );
    let ui = TableUI::new();
    let controller = Controller::new(&cfg);
    let mut pending: Option<Receiver<Result<Dataset, TVError>>> = None;

    while model.status != Status::QUITTING {
        if model.status == Status::LOADING && pending.is_none() {
            pending = Some(source::spawn_load(model.source().to_string()));
        }
        match pending.as_ref().map(|rx| rx.try_recv()) {
            Some(Ok(result)) => {
                model.finish_loading(result);
                pending = None;
            }
            Some(Err(TryRecvError::Disconnected)) => {
                model.finish_loading(Err(TVError::LoadingFailed(
                    "Loader stopped without a result".into(),
                )));
                pending = None;
            }
            Some(Err(TryRecvError::Empty)) | None => (),
        }

        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}
