use std::fmt;

use thiserror::Error;

use crate::date::{Date, DateError};
use crate::ip::{IpAddr4, IpAddressError};

pub const TRAFFIC_SLOTS: usize = 24;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("traffic vector must have exactly {TRAFFIC_SLOTS} elements, got {0}")]
    WrongTrafficLength(usize),
    #[error("traffic value {0} is negative")]
    NegativeTraffic(f64),
    #[error(transparent)]
    Ip(#[from] IpAddressError),
    #[error(transparent)]
    Date(#[from] DateError),
    #[error("record text is truncated or malformed: {0}")]
    Malformed(String),
}

fn validate_traffic(values: &[f64]) -> Result<[f64; TRAFFIC_SLOTS], RecordError> {
    if values.len() != TRAFFIC_SLOTS {
        return Err(RecordError::WrongTrafficLength(values.len()));
    }
    for &v in values {
        if v < 0.0 {
            return Err(RecordError::NegativeTraffic(v));
        }
    }
    let mut out = [0.0; TRAFFIC_SLOTS];
    out.copy_from_slice(values);
    Ok(out)
}

/// A subscriber traffic record: identity (name, ip, date) plus 24 hourly
/// in/out traffic samples in gigabytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: String,
    ip: IpAddr4,
    date: Date,
    traffic_in: [f64; TRAFFIC_SLOTS],
    traffic_out: [f64; TRAFFIC_SLOTS],
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        ip: IpAddr4,
        date: Date,
        traffic_in: &[f64],
        traffic_out: &[f64],
    ) -> Result<Self, RecordError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        Ok(Record {
            name,
            ip,
            date,
            traffic_in: validate_traffic(traffic_in)?,
            traffic_out: validate_traffic(traffic_out)?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr4 {
        self.ip
    }

    #[must_use]
    pub fn date(&self) -> Date {
        self.date
    }

    #[must_use]
    pub fn traffic_in(&self) -> &[f64; TRAFFIC_SLOTS] {
        &self.traffic_in
    }

    #[must_use]
    pub fn traffic_out(&self) -> &[f64; TRAFFIC_SLOTS] {
        &self.traffic_out
    }

    /// Parses one record from the text format: name line, ip line, date
    /// line, then 24 in-values and 24 out-values (whitespace separated,
    /// possibly spread across further lines).
    pub fn parse(lines: &mut std::str::Lines<'_>) -> Result<Self, RecordError> {
        let name = lines
            .next()
            .ok_or_else(|| RecordError::Malformed("missing name line".into()))?
            .to_string();
        let ip: IpAddr4 = lines
            .next()
            .ok_or_else(|| RecordError::Malformed("missing ip line".into()))?
            .trim()
            .parse()?;
        let date: Date = lines
            .next()
            .ok_or_else(|| RecordError::Malformed("missing date line".into()))?
            .trim()
            .parse()?;

        let mut numbers = Vec::with_capacity(TRAFFIC_SLOTS * 2);
        while numbers.len() < TRAFFIC_SLOTS * 2 {
            let line = lines
                .next()
                .ok_or_else(|| RecordError::Malformed("unexpected end of record".into()))?;
            for token in line.split_whitespace() {
                let value: f64 = token
                    .parse()
                    .map_err(|_| RecordError::Malformed(format!("bad traffic token {token}")))?;
                numbers.push(value);
                if numbers.len() == TRAFFIC_SLOTS * 2 {
                    break;
                }
            }
        }

        Record::new(
            name,
            ip,
            date,
            &numbers[..TRAFFIC_SLOTS],
            &numbers[TRAFFIC_SLOTS..],
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.ip)?;
        writeln!(f, "{}", self.date)?;
        let in_line: Vec<String> = self.traffic_in.iter().map(|v| format!("{v:.2}")).collect();
        writeln!(f, "{}", in_line.join(" "))?;
        let out_line: Vec<String> = self.traffic_out.iter().map(|v| format!("{v:.2}")).collect();
        write!(f, "{}", out_line.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> Record {
        Record::new(
            "Иванов И.И.",
            "192.168.1.1".parse().unwrap(),
            "01.01.2023".parse().unwrap(),
            &[1.0; TRAFFIC_SLOTS],
            &[0.5; TRAFFIC_SLOTS],
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_name() {
        let err = Record::new(
            "",
            IpAddr4::default(),
            Date::default(),
            &[0.0; TRAFFIC_SLOTS],
            &[0.0; TRAFFIC_SLOTS],
        );
        assert!(matches!(err, Err(RecordError::EmptyName)));
    }

    #[test]
    fn rejects_wrong_traffic_length() {
        let err = Record::new(
            "name",
            IpAddr4::default(),
            Date::default(),
            &[0.0; 10],
            &[0.0; TRAFFIC_SLOTS],
        );
        assert!(matches!(err, Err(RecordError::WrongTrafficLength(10))));
    }

    #[test]
    fn rejects_negative_traffic() {
        let mut values = [0.0; TRAFFIC_SLOTS];
        values[3] = -1.0;
        let err = Record::new(
            "name",
            IpAddr4::default(),
            Date::default(),
            &values,
            &[0.0; TRAFFIC_SLOTS],
        );
        assert!(matches!(err, Err(RecordError::NegativeTraffic(_))));
    }

    #[test]
    fn round_trips_through_text_format() {
        let record = sample();
        let text = record.to_string();
        let mut lines = text.lines();
        let parsed = Record::parse(&mut lines).unwrap();
        assert_eq!(parsed.name(), record.name());
        assert_eq!(parsed.ip(), record.ip());
        assert_eq!(parsed.date(), record.date());
        assert_eq!(parsed.traffic_in(), record.traffic_in());
    }
}
