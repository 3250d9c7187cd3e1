use super::error::{RestartError, RestartParseErrorKind};
use super::format_scientific;
use super::traits::{RecordReader, RestartFile};
use crate::core::histogram::{Histogram, MAX_CELLS};
use std::io::{BufRead, Write};

/// Contents of a histogram restart file: the recursion kernel plus the run parameters
/// that shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramRestart {
    pub temperature: f64,
    pub theta_mass: f64,
    pub theta_friction: f64,
    pub bias_magnitude: f64,
    pub bias_cutoff: usize,
    pub count_interval: usize,
    pub histogram: Histogram,
}

pub struct HistogramFile;

impl RestartFile for HistogramFile {
    type Data = HistogramRestart;
    type Error = RestartError;

    fn read_from(reader: &mut impl BufRead) -> Result<Self::Data, Self::Error> {
        let mut records = RecordReader::new(reader);

        let temperature = records.f64_record("Temperature")?;
        records.ensure(temperature.is_finite() && temperature > 0.0, || {
            format!("temperature {temperature}")
        })?;
        let theta_mass = records.f64_record("Lambda-Mass")?;
        records.ensure(theta_mass.is_finite() && theta_mass > 0.0, || {
            format!("lambda mass {theta_mass}")
        })?;
        let theta_friction = records.f64_record("Lambda-Friction")?;
        records.ensure(theta_friction.is_finite() && theta_friction >= 0.0, || {
            format!("lambda friction {theta_friction}")
        })?;
        let bias_magnitude = records.f64_record("Bias-Mag")?;
        records.ensure(bias_magnitude.is_finite() && bias_magnitude >= 0.0, || {
            format!("bias magnitude {bias_magnitude}")
        })?;
        let bias_cutoff = records.usize_record("Bias-Cutoff")?;
        let count_interval = records.usize_record("Count-Interval")?;
        let lambda_bins = records.usize_record("Lambda-Bins")?;
        records.ensure(lambda_bins >= 2, || format!("{lambda_bins} lambda bins"))?;
        let fl_bins = records.usize_record("FLambda-Bins")?;
        records.ensure(
            fl_bins > 0
                && lambda_bins
                    .checked_mul(fl_bins)
                    .is_some_and(|cells| cells <= MAX_CELLS),
            || format!("{lambda_bins} x {fl_bins} bins"),
        )?;
        let min_f = records.f64_record("Flambda-Min")?;
        records.ensure(min_f.is_finite(), || format!("minimum F_lambda {min_f}"))?;
        let df = records.f64_record("Flambda-Width")?;
        records.ensure(df.is_finite() && df > 0.0, || format!("F_lambda bin width {df}"))?;

        let mut counts = Vec::with_capacity(lambda_bins * fl_bins);
        for _ in 0..lambda_bins {
            let row: Vec<String> = records
                .next_line()?
                .ok_or(RestartError::MissingRecord("recursion kernel row"))?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if row.len() != fl_bins {
                return Err(records.parse_error(RestartParseErrorKind::RowLength {
                    expected: fl_bins,
                    found: row.len(),
                }));
            }
            for value in row {
                let count = value.parse::<u32>().map_err(|_| {
                    records.parse_error(RestartParseErrorKind::InvalidInt { value })
                })?;
                counts.push(count);
            }
        }

        Ok(HistogramRestart {
            temperature,
            theta_mass,
            theta_friction,
            bias_magnitude,
            bias_cutoff,
            count_interval,
            histogram: Histogram::from_counts(lambda_bins, fl_bins, min_f, df, counts),
        })
    }

    fn write_to(data: &Self::Data, writer: &mut impl Write) -> Result<(), Self::Error> {
        let histogram = &data.histogram;
        writeln!(writer, "Temperature     {:15.3}", data.temperature)?;
        writeln!(
            writer,
            "Lambda-Mass     {}",
            format_scientific(data.theta_mass, 15, 8)
        )?;
        writeln!(
            writer,
            "Lambda-Friction {}",
            format_scientific(data.theta_friction, 15, 8)
        )?;
        writeln!(
            writer,
            "Bias-Mag        {}",
            format_scientific(data.bias_magnitude, 15, 8)
        )?;
        writeln!(writer, "Bias-Cutoff     {:15}", data.bias_cutoff)?;
        writeln!(writer, "Count-Interval  {:15}", data.count_interval)?;
        writeln!(writer, "Lambda-Bins     {:15}", histogram.lambda_bins())?;
        writeln!(writer, "FLambda-Bins    {:15}", histogram.flambda_bins())?;
        writeln!(
            writer,
            "Flambda-Min     {}",
            format_scientific(histogram.min_flambda(), 15, 8)
        )?;
        writeln!(
            writer,
            "Flambda-Width   {}",
            format_scientific(histogram.flambda_width(), 15, 8)
        )?;

        for i in 0..histogram.lambda_bins() {
            let row = histogram
                .row(i)
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(writer, "{row}")?;
        }
        Ok(())
    }
}
