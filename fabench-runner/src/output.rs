use anyhow::{Context, Result};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

/// Formats like numpy's `savetxt` default `%.18e`, e.g. `1.000000000000000000e+00`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0. { "inf" } else { "-inf" }.to_owned();
    }
    let formatted = format!("{value:.18e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// Appends result rows under `dir`, one file per environment, legend and result kind.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
    environment: String,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            environment: environment.into(),
        }
    }

    pub fn eval_path(&self, legend: &str) -> PathBuf {
        self.dir
            .join(format!("{}_eval_{legend}.csv", self.environment))
    }

    pub fn train_path(&self, legend: &str) -> PathBuf {
        self.dir
            .join(format!("{}_train_{legend}.csv", self.environment))
    }

    pub fn solve_path(&self, legend: &str) -> PathBuf {
        self.dir.join(format!("{}_{legend}.csv", self.environment))
    }

    pub fn times_path(&self) -> PathBuf {
        self.dir.join(format!("{}_times.csv", self.environment))
    }

    /// Opens `path` in append mode, creating it if needed, and writes one record per row. Rows
    /// may differ in length. The file is closed before returning.
    pub fn append_rows(&self, path: &Path, rows: &[Vec<f64>]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for row in rows {
            writer
                .write_record(row.iter().map(|value| format_value(*value)))
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn matches_numpy_scientific_format() {
        assert_eq!(format_value(1.), "1.000000000000000000e+00");
        assert_eq!(format_value(0.), "0.000000000000000000e+00");
        assert_eq!(format_value(-1234.5), "-1.234500000000000000e+03");
        assert_eq!(format_value(0.125), "1.250000000000000000e-01");
        assert_eq!(format_value(f64::NAN), "nan");
        assert_eq!(format_value(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn file_names_follow_environment_and_legend() {
        let writer = ResultWriter::new("out", "simplegrid");
        assert_eq!(
            writer.eval_path("Decision Tree"),
            Path::new("out/simplegrid_eval_Decision Tree.csv")
        );
        assert_eq!(
            writer.train_path("Decision Tree"),
            Path::new("out/simplegrid_train_Decision Tree.csv")
        );
        assert_eq!(
            writer.solve_path("Decision Tree"),
            Path::new("out/simplegrid_Decision Tree.csv")
        );
        assert_eq!(writer.times_path(), Path::new("out/simplegrid_times.csv"));
    }

    #[test]
    fn appends_instead_of_truncating() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = ResultWriter::new(dir.path(), "grid");
        let path = writer.times_path();
        writer.append_rows(&path, &[vec![1., 2.]])?;
        writer.append_rows(&path, &[vec![3.]])?;
        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1.000000000000000000e+00,2.000000000000000000e+00",
                "3.000000000000000000e+00",
            ]
        );
        Ok(())
    }
}
