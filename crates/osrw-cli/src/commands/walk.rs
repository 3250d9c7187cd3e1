use crate::cli::WalkArgs;
use crate::config::builder::build_config;
use crate::error::Result;
use crate::ui::{UiEvent, progress_callback};
use osrw::engine::progress::ProgressReporter;
use osrw::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: WalkArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args)?;

    let reporter = ProgressReporter::with_callback(progress_callback(ui_sender));

    println!(
        "Starting OSRW walk: {} walker(s), {} steps each...",
        app.walk.walkers, app.walk.steps
    );
    info!("Invoking the core walk workflow...");

    let summary = tokio::task::block_in_place(|| {
        workflows::walk::run(&app.osrw, &app.model, &app.walk, &reporter)
    })?;

    let exact = app.model.exact_free_energy(app.osrw.temperature);
    info!(
        "Walk finished with {} counts; estimate {:.4}, exact {:.4} kcal/mol.",
        summary.total_counts, summary.free_energy, exact
    );

    for walker in &summary.walkers {
        println!(
            "  Walker {:>3}: λ = {:.4}, E = {:.4} kcal/mol after {} counted steps",
            walker.rank,
            walker.final_lambda,
            walker.final_energy,
            walker.energy_count.max(0)
        );
    }
    println!(
        "✓ Free energy: {:.4} kcal/mol from {} counts (analytic: {:.4} kcal/mol)",
        summary.free_energy, summary.total_counts, exact
    );
    if let Some(path) = &app.osrw.histogram_file {
        println!("  Histogram restart written to: {}", path.display());
    }

    Ok(())
}
