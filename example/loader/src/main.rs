//! Runs the "deferred" loader and prints every display change as it
//! happens.
//!
//! ```text
//! RUST_LOG=leptos_deferred=trace cargo run -- --base-delay 250
//! ```
use std::time::{Duration, Instant};

use clap::Parser;
use leptos_deferred::{
    DeferredBundle, ErrorRendererSelection, ErrorReport, FieldOverride, Presenter, RenderOptions,
    Renderer, RendererSettings,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Stream a deferred bundle to the terminal")]
struct Args {
    /// Delay unit in milliseconds; every field settles after a multiple
    /// of it.
    #[arg(long, default_value_t = 250)]
    base_delay: u64,

    /// Ignore the dedicated error view of `lazyError`.
    #[arg(long)]
    bundle_wide_errors: bool,

    /// Leave diagnostic detail out of generic error views.
    #[arg(long)]
    no_detail: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct LoaderError(&'static str);

async fn resolve(value: impl Into<String>, ms: u64) -> Result<String, LoaderError> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(value.into())
}

async fn reject(message: &'static str, ms: u64) -> Result<String, LoaderError> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Err(LoaderError(message))
}

struct Terminal;

impl Presenter<String> for Terminal {
    type View = String;

    fn critical(&self, _: &str, value: &String) -> String {
        value.clone()
    }

    fn placeholder(&self, field: &str) -> String {
        format!("loading {field}...")
    }

    fn resolved(&self, _: &str, value: &String) -> String {
        value.clone()
    }

    fn errored(&self, report: &ErrorReport) -> String {
        match &report.detail {
            Some(detail) => format!("Error! {} ({detail})", report.message),
            None => format!("Error! {}", report.message),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();
    let unit = args.base_delay;
    let start = Instant::now();

    let bundle = DeferredBundle::builder()
        .critical("critical1", resolve("Critical 1", unit))
        .critical("critical2", resolve("Critical 2", unit * 2))
        .lazy(
            "lazyResolved",
            resolve(format!("Lazy Data immediately resolved - {}", unit), 0),
        )
        .lazy("lazy1", resolve("Lazy 1", unit * 4))
        .lazy("lazy2", resolve("Lazy 2", unit * 6))
        .lazy("lazy3", resolve("Lazy 3", unit * 8))
        .lazy("lazyError", reject("Kaboom!", unit * 10))
        .build()
        .await?;

    let settings = RendererSettings {
        error_renderer: if args.bundle_wide_errors {
            ErrorRendererSelection::BundleWide
        } else {
            ErrorRendererSelection::PerField
        },
        include_detail: !args.no_detail,
    };
    let options = RenderOptions::new()
        .field(
            "lazy1",
            FieldOverride::new().placeholder(|| "loading 1...".to_string()),
        )
        .field(
            "lazyError",
            FieldOverride::new()
                .errored(|error| format!("Error (errorElement)! {}", error.message())),
        )
        .settings(settings);

    let mut renderer = Renderer::attach(&bundle, Terminal, options);
    let mut updates = renderer
        .updates()
        .ok_or_else(|| anyhow::anyhow!("updates already taken"))?;

    println!("[{:>5}ms] page ready", start.elapsed().as_millis());
    for display in renderer.snapshot() {
        println!("  {:<14}{:?}: {}", display.field, display.phase, display.view);
    }
    while let Some(display) = updates.recv().await {
        println!(
            "[{:>5}ms] {:<14}{:?}: {}",
            start.elapsed().as_millis(),
            display.field,
            display.phase,
            display.view,
        );
    }
    Ok(())
}
