use super::error::{RestartError, RestartParseErrorKind};
use super::format_scientific;
use super::traits::{RecordReader, RestartFile};
use std::io::{BufRead, Write};

/// Per-walker state of the lambda particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambdaRestart {
    pub lambda: f64,
    pub half_theta_velocity: f64,
    /// Energy evaluations already taken. Files without this record restart from zero.
    pub steps_taken: i64,
}

pub struct LambdaFile;

impl RestartFile for LambdaFile {
    type Data = LambdaRestart;
    type Error = RestartError;

    fn read_from(reader: &mut impl BufRead) -> Result<Self::Data, Self::Error> {
        let mut records = RecordReader::new(reader);

        let lambda = records.f64_record("Lambda")?;
        if !(0.0..=1.0).contains(&lambda) {
            return Err(records.parse_error(RestartParseErrorKind::OutOfRange(format!(
                "lambda {lambda} is outside [0, 1]"
            ))));
        }
        let half_theta_velocity = records.f64_record("Lambda-Velocity")?;

        let steps = records.next_line()?.map(|line| {
            let mut tokens = line.split_whitespace();
            (
                tokens.next().map(str::to_string),
                tokens.next().map(str::to_string),
            )
        });
        let steps_taken = match steps {
            None => 0,
            Some((Some(key), Some(value))) if key == "Steps-Taken" => value
                .parse()
                .map_err(|_| records.parse_error(RestartParseErrorKind::InvalidInt { value }))?,
            Some((key, _)) => {
                return Err(records.parse_error(RestartParseErrorKind::UnexpectedRecord {
                    expected: "Steps-Taken",
                    found: key.unwrap_or_default(),
                }));
            }
        };

        Ok(LambdaRestart {
            lambda,
            half_theta_velocity,
            steps_taken,
        })
    }

    fn write_to(data: &Self::Data, writer: &mut impl Write) -> Result<(), Self::Error> {
        writeln!(writer, "Lambda          {:15.8}", data.lambda)?;
        writeln!(
            writer,
            "Lambda-Velocity {}",
            format_scientific(data.half_theta_velocity, 15, 8)
        )?;
        writeln!(writer, "Steps-Taken     {:15}", data.steps_taken)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn restart_round_trips_through_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("osrw.lam");
        let original = LambdaRestart {
            lambda: 0.375,
            half_theta_velocity: -2.5e-3,
            steps_taken: 1234,
        };

        LambdaFile::write_to_path(&original, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let restored = LambdaFile::read_from_path(&path).unwrap();

        assert!(text.starts_with("Lambda               0.37500000\n"));
        assert!(text.contains("Lambda-Velocity -2.50000000e-03\n"));
        assert_eq!(restored, original);
    }

    #[test]
    fn missing_step_counter_means_zero() {
        let text = "Lambda          0.5\nLambda-Velocity 1.0e-3\n";

        let restart = LambdaFile::read_from(&mut Cursor::new(text)).unwrap();

        assert_eq!(restart.steps_taken, 0);
        assert_eq!(restart.lambda, 0.5);
        assert_eq!(restart.half_theta_velocity, 1.0e-3);
    }

    #[test]
    fn lambda_outside_unit_interval_is_rejected() {
        let text = "Lambda          1.5\nLambda-Velocity 0.0\n";

        let error = LambdaFile::read_from(&mut Cursor::new(text)).unwrap_err();

        assert!(matches!(
            error,
            RestartError::Parse {
                line: 1,
                kind: RestartParseErrorKind::OutOfRange(_)
            }
        ));
    }

    #[test]
    fn missing_velocity_is_reported() {
        let text = "Lambda 0.2\n";

        let error = LambdaFile::read_from(&mut Cursor::new(text)).unwrap_err();

        assert!(matches!(
            error,
            RestartError::MissingRecord("Lambda-Velocity")
        ));
    }

    #[test]
    fn unknown_trailing_record_is_rejected() {
        let text = "Lambda 0.2\nLambda-Velocity 0.0\nVelocity 3\n";

        let error = LambdaFile::read_from(&mut Cursor::new(text)).unwrap_err();

        assert!(matches!(
            error,
            RestartError::Parse {
                line: 3,
                kind: RestartParseErrorKind::UnexpectedRecord { .. }
            }
        ));
    }
}
