use crate::cli::ProfileArgs;
use crate::error::{CliError, Result};
use osrw::workflows;
use std::fs::File;
use std::io::BufWriter;
use tracing::info;

pub async fn run(args: ProfileArgs) -> Result<()> {
    info!("Reading histogram restart file {:?}", &args.histogram);
    let report = workflows::profile::run(&args.histogram, args.temperature)?;

    println!(
        "{} λ bins × {} F_λ bins (F_λ from {:.1} to {:.1}) at {:.2} K",
        report.lambda_bins,
        report.flambda_bins,
        report.min_flambda,
        report.max_flambda,
        report.temperature
    );
    println!(" Count   Lambda Bins    F_Lambda Bins   <   F_L  >       dG        G");
    for bin in report.profile.bins() {
        println!(
            " {:6}  {:5.3} {:5.3}   {:7.1} {:7.1}   {:8.3}  {:8.3} {:8.3}",
            bin.counts,
            bin.lambda_lower,
            bin.lambda_upper,
            bin.flambda_lower,
            bin.flambda_upper,
            bin.mean_flambda,
            bin.delta_g,
            bin.cumulative_g
        );
    }
    println!(
        "✓ Free energy: {:.4} kcal/mol from {} counts",
        report.free_energy(),
        report.total_counts()
    );

    if let Some(path) = &args.csv {
        let file = File::create(path)?;
        report
            .profile
            .write_csv(BufWriter::new(file))
            .map_err(|e| CliError::FileWriting {
                path: path.clone(),
                source: e.into(),
            })?;
        println!("  Per-bin table written to: {}", path.display());
    }

    Ok(())
}
