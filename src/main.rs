mod app;
mod chart;
mod config;
mod data;
mod details;
mod error;
mod gui;
mod performance;
mod portfolio;
mod report;

use anyhow::Result;
use app::{App, Session};
use clap::{Parser, ValueEnum};
use data::Timeframe;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum GuiRendererChoice {
    Wgpu,
    Glow,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderChoice {
    Yfinance,
    Synthetic,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "stockviz: hypothetical stock portfolio visualizer",
    after_help = "EXAMPLES:
    # Launch the window with two holdings preloaded
    cargo run --release -- --holding AAPL=20 --holding MSFT=30

    # Print the details table and chart summary without a window
    cargo run --release -- --report --holding AAPL=20 --start 2023-01-02 --end now

    # Work offline with generated prices
    cargo run --release -- --provider synthetic --holding SPY=50"
)]
struct Args {
    /// Chart lookback period (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)
    #[arg(long, default_value_t = Timeframe::default())]
    timeframe: Timeframe,

    /// Start date for the details panel and chart marker (YYYY-MM-DD)
    #[arg(long, default_value = config::DEFAULT_START_DATE)]
    start: String,

    /// End date for the details panel (YYYY-MM-DD or 'now')
    #[arg(long, default_value = config::DEFAULT_END_DATE)]
    end: String,

    /// Hypothetical capital split across holdings
    #[arg(long, default_value_t = config::DEFAULT_STARTING_AMOUNT)]
    amount: f64,

    /// Holding to preload as SYMBOL=PERCENT (repeatable)
    #[arg(long = "holding", value_name = "SYMBOL=PERCENT")]
    holdings: Vec<String>,

    /// Market data provider; overrides STOCKVIZ_DATA_PROVIDER
    #[arg(long, value_enum)]
    provider: Option<ProviderChoice>,

    /// Print the portfolio report to stdout instead of opening a window
    #[arg(long)]
    report: bool,

    /// GUI renderer backend (wgpu|glow). Useful for RDP compatibility.
    #[arg(long, value_enum, default_value_t = GuiRendererChoice::Wgpu)]
    gui_renderer: GuiRendererChoice,

    /// Enable GUI safe mode for remote desktop (disables vsync/MSAA and hardware acceleration).
    #[arg(long)]
    gui_safe_mode: bool,
}

fn build_session(args: &Args) -> Result<Session> {
    let mut session = Session {
        timeframe: args.timeframe,
        start_date: args.start.trim().to_string(),
        end_date: args.end.trim().to_string(),
        starting_amount: args.amount,
        ..Session::default()
    };

    for raw in &args.holdings {
        let (symbol, percent) = portfolio::parse_holding_arg(raw)?;
        match session.portfolio.add_holding(&symbol, &percent) {
            Ok(_) => {}
            Err(error::InputError::DuplicateSymbol(s)) => warn!("Ignoring duplicate holding {}", s),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stockviz=info,wgpu_core=error,wgpu_hal=error"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let mut settings = config::Settings::from_env();
    if let Some(choice) = args.provider {
        settings.provider = match choice {
            ProviderChoice::Yfinance => config::DataProviderMode::Yfinance,
            ProviderChoice::Synthetic => config::DataProviderMode::Synthetic,
        };
    }
    let provider = data::build_provider(&settings);

    let session = match build_session(&args) {
        Ok(session) => session,
        Err(e) => {
            error!("Invalid arguments: {}", e);
            return Err(e);
        }
    };

    if args.report {
        let today = chrono::Local::now().date_naive();
        let text = report::run_report(provider.as_ref(), &session, today).await?;
        println!("{}", text);
        return Ok(());
    }

    let preloaded = !session.portfolio.is_empty();
    let mut app = App::new(provider, session);
    if preloaded {
        app.request_chart();
    }

    let mut options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Stock Price Visualizer")
            .with_inner_size([1100.0, 650.0])
            .with_min_inner_size([800.0, 400.0]),
        ..Default::default()
    };
    options.renderer = match args.gui_renderer {
        GuiRendererChoice::Wgpu => eframe::Renderer::Wgpu,
        GuiRendererChoice::Glow => eframe::Renderer::Glow,
    };

    if args.gui_safe_mode {
        options.vsync = false;
        options.multisampling = 0;
        options.depth_buffer = 0;
        options.stencil_buffer = 0;
        options.hardware_acceleration = eframe::HardwareAcceleration::Off;
    }

    info!(
        "Launching GUI with renderer: {:?}, safe_mode={}, provider={}",
        args.gui_renderer,
        args.gui_safe_mode,
        app.provider_name()
    );
    eframe::run_native(
        "Stock Price Visualizer",
        options,
        Box::new(|cc| Ok(Box::new(gui::GuiApp::new(cc, app)))),
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
