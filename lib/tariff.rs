use std::path::Path;
use std::sync::{Arc, LazyLock};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

const RATE_COUNT: usize = 24;
const EXPECTED_TOKENS: usize = RATE_COUNT * 2;

#[derive(Debug, Error)]
pub enum TariffError {
    #[error("cannot open tariff file {path}: {source}")]
    CannotOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("token \"{0}\" is not a non-negative number")]
    BadToken(String),
    #[error("expected {EXPECTED_TOKENS} numeric tokens, found {0}")]
    WrongTokenCount(usize),
    #[error("hour {0} is outside the allowed range (0-23)")]
    HourOutOfRange(usize),
}

/// 24 hourly in-rates plus 24 hourly out-rates. Defaults to all zeros,
/// meaning "unloaded" per the data model (charges against an unloaded
/// tariff are always zero).
#[derive(Debug, Clone, PartialEq)]
pub struct Tariff {
    cost_in: [f64; RATE_COUNT],
    cost_out: [f64; RATE_COUNT],
}

impl Default for Tariff {
    fn default() -> Self {
        Tariff {
            cost_in: [0.0; RATE_COUNT],
            cost_out: [0.0; RATE_COUNT],
        }
    }
}

impl Tariff {
    pub fn in_rate(&self, hour: usize) -> Result<f64, TariffError> {
        self.cost_in
            .get(hour)
            .copied()
            .ok_or(TariffError::HourOutOfRange(hour))
    }

    pub fn out_rate(&self, hour: usize) -> Result<f64, TariffError> {
        self.cost_out
            .get(hour)
            .copied()
            .ok_or(TariffError::HourOutOfRange(hour))
    }

    /// Parses the tariff file's text contents: whitespace-separated tokens,
    /// `#` begins a line comment, exactly 48 non-negative numbers required.
    pub fn parse(contents: &str) -> Result<Self, TariffError> {
        let mut values = Vec::with_capacity(EXPECTED_TOKENS);
        for line in contents.lines() {
            let line = line.split('#').next().unwrap_or("");
            for token in line.split_whitespace() {
                let value: f64 = token
                    .parse()
                    .map_err(|_| TariffError::BadToken(token.to_string()))?;
                if value < 0.0 {
                    return Err(TariffError::BadToken(token.to_string()));
                }
                values.push(value);
            }
        }

        if values.len() != EXPECTED_TOKENS {
            return Err(TariffError::WrongTokenCount(values.len()));
        }

        let mut cost_in = [0.0; RATE_COUNT];
        let mut cost_out = [0.0; RATE_COUNT];
        cost_in.copy_from_slice(&values[..RATE_COUNT]);
        cost_out.copy_from_slice(&values[RATE_COUNT..]);

        Ok(Tariff { cost_in, cost_out })
    }
}

static TARIFF: LazyLock<Arc<RwLock<Tariff>>> =
    LazyLock::new(|| Arc::new(RwLock::new(Tariff::default())));

/// Loads a tariff file into the global table. A failed load leaves the
/// previously loaded table (or the all-zero default) intact.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load(path: impl AsRef<Path>) -> Result<(), TariffError> {
    let path = path.as_ref();
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TariffError::CannotOpen {
                path: path.display().to_string(),
                source,
            })?;

    match Tariff::parse(&contents) {
        Ok(tariff) => {
            *TARIFF.write().await = tariff;
            Ok(())
        }
        Err(err) => {
            warn!(%err, "tariff load failed, keeping previous table");
            Err(err)
        }
    }
}

pub async fn current() -> Tariff {
    TARIFF.read().await.clone()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_text() -> String {
        let mut s = String::new();
        for _ in 0..24 {
            s.push_str("0.50 ");
        }
        s.push('\n');
        for _ in 0..24 {
            s.push_str("0.25 ");
        }
        s
    }

    #[test]
    fn parses_well_formed_table() {
        let tariff = Tariff::parse(&sample_text()).unwrap();
        assert_eq!(tariff.in_rate(0).unwrap(), 0.50);
        assert_eq!(tariff.out_rate(23).unwrap(), 0.25);
    }

    #[test]
    fn ignores_comments() {
        let text = format!("# a comment\n{}\n# trailing", sample_text());
        assert!(Tariff::parse(&text).is_ok());
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert!(matches!(
            Tariff::parse("0.5 0.5 0.5"),
            Err(TariffError::WrongTokenCount(3))
        ));
    }

    #[test]
    fn rejects_negative_values() {
        let mut text = sample_text();
        text.push_str(" -1.0");
        assert!(matches!(Tariff::parse(&text), Err(TariffError::BadToken(_))));
    }

    #[test]
    fn default_is_zeroed() {
        let tariff = Tariff::default();
        assert_eq!(tariff.in_rate(5).unwrap(), 0.0);
    }

    #[test]
    fn hour_out_of_range_errors() {
        let tariff = Tariff::default();
        assert!(matches!(
            tariff.in_rate(24),
            Err(TariffError::HourOutOfRange(24))
        ));
    }
}
