use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::AppConfig;
use crate::cli::WalkArgs;
use crate::error::{CliError, Result};
use osrw::core::model::HarmonicLambdaModel;
use osrw::core::potential::LambdaInterface;
use osrw::engine::config::{OptimizationConfig, OsrwConfigBuilder};
use osrw::workflows::walk::WalkSettings;
use std::str::FromStr;

pub fn build_config(args: &WalkArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let model_file = file_config.model.take().unwrap_or_default();
    let osrw_file = file_config.osrw.take().unwrap_or_default();
    let walk_file = file_config.walk.take().unwrap_or_default();

    let temperature = file_config.temperature.unwrap_or(defaults.temperature);
    let model = build_model(model_file, &defaults)?;

    let mut builder = OsrwConfigBuilder::new()
        .temperature(temperature)
        .time_step(file_config.time_step.unwrap_or(defaults.time_step))
        .seed(args.seed.or(file_config.seed).unwrap_or(0));
    if let Some(cutoff) = osrw_file.lambda_bias_cutoff {
        builder = builder.bias_cutoff(cutoff);
    }
    if let Some(magnitude) = osrw_file.bias_gaussian_mag {
        builder = builder.bias_magnitude(magnitude);
    }
    if let Some(width) = osrw_file.lambda_bin_width {
        builder = builder.lambda_bin_width(width);
    }
    if let Some(width) = osrw_file.flambda_bin_width {
        builder = builder.flambda_bin_width(width);
    }
    if let Some(interval) = osrw_file.count_interval {
        builder = builder.count_interval(interval);
    }
    if let Some(mass) = osrw_file.theta_mass {
        builder = builder.theta_mass(mass);
    }
    if let Some(friction) = osrw_file.theta_friction {
        builder = builder.theta_friction(friction);
    }
    if let Some(interval) = osrw_file.print_interval {
        builder = builder.print_interval(interval);
    }
    if let Some(frequency) = osrw_file.print_frequency {
        builder = builder.print_frequency(frequency);
    }
    if let Some(interval) = osrw_file.save_interval {
        builder = builder.save_interval(interval);
    }
    if let Some(frequency) = osrw_file.save_frequency {
        builder = builder.save_frequency(frequency);
    }
    if let Some(steps) = osrw_file.equilibration_steps {
        builder = builder.equilibration_steps(steps);
    }
    if let Some(mode) = args.mode.map(Into::into).or(osrw_file.mode) {
        builder = builder.sync_mode(mode);
    }
    if let Some(path) = args.histogram.clone().or(walk_file.histogram_file) {
        builder = builder.histogram_file(path);
    }
    if let Some(optimization) = file_config.optimization {
        let default = OptimizationConfig::default();
        builder = builder.optimization(OptimizationConfig {
            frequency: optimization.frequency.unwrap_or(default.frequency),
            lambda_cutoff: optimization.lambda_cutoff.unwrap_or(default.lambda_cutoff),
        });
    }
    let osrw = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let walk = WalkSettings {
        walkers: args
            .walkers
            .or(walk_file.walkers)
            .unwrap_or(defaults.walkers),
        steps: args.steps.or(walk_file.steps).unwrap_or(defaults.steps),
        diffusion: walk_file.diffusion.unwrap_or(defaults.diffusion),
        initial_coordinates: walk_file.initial_coordinates.unwrap_or_default(),
        lambda_prefix: args.lambda_prefix.clone().or(walk_file.lambda_prefix),
    };
    if walk.walkers == 0 {
        return Err(CliError::Config(
            "`walk.walkers` must be at least 1.".to_string(),
        ));
    }

    Ok(AppConfig { osrw, walk, model })
}

fn build_model(
    file: super::file::FileModelConfig,
    defaults: &DefaultsConfig,
) -> Result<HarmonicLambdaModel> {
    let k0 = file.k0.unwrap_or(defaults.k0);
    let k1 = file.k1.unwrap_or(defaults.k1);
    if !(k0 > 0.0 && k1 > 0.0) {
        return Err(CliError::Config(
            "`model.k0` and `model.k1` must be positive.".to_string(),
        ));
    }
    let center0 = file.center0.unwrap_or_else(|| vec![0.0]);
    let center1 = file.center1.unwrap_or_else(|| vec![0.0; center0.len()]);
    if center0.is_empty() || center0.len() != center1.len() {
        return Err(CliError::Config(format!(
            "`model.center0` and `model.center1` must be non-empty and of equal length (got {} and {}).",
            center0.len(),
            center1.len()
        )));
    }
    let initial_lambda = file.initial_lambda.unwrap_or(defaults.initial_lambda);
    if !(0.0..=1.0).contains(&initial_lambda) {
        return Err(CliError::Config(format!(
            "`model.initial-lambda` must lie in [0, 1] (got {initial_lambda})."
        )));
    }

    let mut model = HarmonicLambdaModel::new(
        k0,
        k1,
        center0,
        center1,
        file.offset.unwrap_or(defaults.offset),
    );
    model.set_lambda(initial_lambda);
    Ok(model)
}

fn parse_value<T: FromStr>(key: &str, value_str: &str, kind: &str) -> Result<T> {
    value_str
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value_str)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };

        match key {
            "temperature" => config.temperature = Some(parse_value(key, value_str, "float")?),
            "time-step" => config.time_step = Some(parse_value(key, value_str, "float")?),
            "seed" => config.seed = Some(parse_value(key, value_str, "integer")?),
            "model.k0" => {
                config.model.get_or_insert_with(Default::default).k0 =
                    Some(parse_value(key, value_str, "float")?);
            }
            "model.k1" => {
                config.model.get_or_insert_with(Default::default).k1 =
                    Some(parse_value(key, value_str, "float")?);
            }
            "model.offset" => {
                config.model.get_or_insert_with(Default::default).offset =
                    Some(parse_value(key, value_str, "float")?);
            }
            "model.initial-lambda" => {
                config.model.get_or_insert_with(Default::default).initial_lambda =
                    Some(parse_value(key, value_str, "float")?);
            }
            "osrw.lambda-bias-cutoff" => {
                config.osrw.get_or_insert_with(Default::default).lambda_bias_cutoff =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "osrw.bias-gaussian-mag" => {
                config.osrw.get_or_insert_with(Default::default).bias_gaussian_mag =
                    Some(parse_value(key, value_str, "float")?);
            }
            "osrw.lambda-bin-width" => {
                config.osrw.get_or_insert_with(Default::default).lambda_bin_width =
                    Some(parse_value(key, value_str, "float")?);
            }
            "osrw.flambda-bin-width" => {
                config.osrw.get_or_insert_with(Default::default).flambda_bin_width =
                    Some(parse_value(key, value_str, "float")?);
            }
            "osrw.count-interval" => {
                config.osrw.get_or_insert_with(Default::default).count_interval =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "osrw.print-frequency" => {
                config.osrw.get_or_insert_with(Default::default).print_frequency =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "osrw.save-frequency" => {
                config.osrw.get_or_insert_with(Default::default).save_frequency =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "osrw.equilibration-steps" => {
                config.osrw.get_or_insert_with(Default::default).equilibration_steps =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "walk.steps" => {
                config.walk.get_or_insert_with(Default::default).steps =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "walk.walkers" => {
                config.walk.get_or_insert_with(Default::default).walkers =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "walk.diffusion" => {
                config.walk.get_or_insert_with(Default::default).diffusion =
                    Some(parse_value(key, value_str, "float")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
