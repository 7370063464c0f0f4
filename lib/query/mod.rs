mod tokenizer;

use thiserror::Error;

use crate::date::Date;
use crate::ip::IpAddr4;
use crate::store::{Criteria, TRAFFIC_SLOTS};

pub use tokenizer::tokenize;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unterminated quoted string")]
    UnterminatedQuote,
    #[error("parameter {0} was given more than once")]
    DuplicateParameter(&'static str),
    #[error("missing required parameter {0}")]
    MissingParameter(&'static str),
    #[error("parameter {0} is not valid for this command")]
    UnexpectedParameter(String),
    #[error("expected a value after {0}")]
    MissingValue(&'static str),
    #[error("invalid ip address: {0}")]
    BadIp(#[from] crate::ip::IpAddressError),
    #[error("invalid date: {0}")]
    BadDate(#[from] crate::date::DateError),
    #[error("expected 24 non-negative numbers for {0}, found {1}")]
    BadTrafficBlock(&'static str, usize),
    #[error("traffic value {1} for {0} is negative")]
    NegativeTrafficValue(&'static str, f64),
    #[error("SET must name at least one field to change")]
    EmptySet,
    #[error("missing filename")]
    MissingFilename,
    #[error("unexpected token \"{0}\" after END")]
    TrailingTokens(String),
}

/// The fields an `EDIT`'s `SET` clause may assign. `None` means "leave
/// unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSet {
    pub name: Option<String>,
    pub ip: Option<IpAddr4>,
    pub date: Option<Date>,
    pub traffic_in: Option<[f64; TRAFFIC_SLOTS]>,
    pub traffic_out: Option<[f64; TRAFFIC_SLOTS]>,
}

impl EditSet {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.ip.is_none()
            && self.date.is_none()
            && self.traffic_in.is_none()
            && self.traffic_out.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddParams {
    pub name: String,
    pub ip: IpAddr4,
    pub date: Date,
    pub traffic_in: Option<[f64; TRAFFIC_SLOTS]>,
    pub traffic_out: Option<[f64; TRAFFIC_SLOTS]>,
}

/// A parsed query: a tagged command with per-variant typed parameters. The
/// handler dispatches purely on this tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(AddParams),
    Select(Criteria),
    Delete(Criteria),
    Edit { criteria: Criteria, set: EditSet },
    CalculateCharges {
        criteria: Criteria,
        start: Date,
        end: Date,
    },
    PrintAll,
    Load(String),
    Save(Option<String>),
    Help,
    Exit,
    Unknown(String),
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token.to_ascii_uppercase().as_str(),
        "FIO"
            | "IP"
            | "DATE"
            | "TRAFFIC_IN"
            | "TRAFFIC_OUT"
            | "SET"
            | "START_DATE"
            | "END_DATE"
            | "END"
    )
}

/// Accumulates the generic keyword/value fields shared by several commands
/// while scanning tokens left to right. `in_set` flips true once `SET` is
/// seen and routes subsequent field tokens into `set` instead of the
/// criteria fields.
#[derive(Default)]
struct Fields {
    name: Option<String>,
    ip: Option<IpAddr4>,
    date: Option<Date>,
    start_date: Option<Date>,
    end_date: Option<Date>,
    traffic_in: Option<[f64; TRAFFIC_SLOTS]>,
    traffic_out: Option<[f64; TRAFFIC_SLOTS]>,
    set: EditSet,
    saw_set: bool,
}

fn parse_traffic_block(
    tokens: &[String],
    pos: &mut usize,
    label: &'static str,
) -> Result<[f64; TRAFFIC_SLOTS], ParseError> {
    let mut values = Vec::with_capacity(TRAFFIC_SLOTS);
    while values.len() < TRAFFIC_SLOTS {
        let Some(token) = tokens.get(*pos) else {
            return Err(ParseError::BadTrafficBlock(label, values.len()));
        };
        if is_keyword(token) {
            return Err(ParseError::BadTrafficBlock(label, values.len()));
        }
        let value: f64 = token
            .parse()
            .map_err(|_| ParseError::BadTrafficBlock(label, values.len()))?;
        if value < 0.0 {
            return Err(ParseError::NegativeTrafficValue(label, value));
        }
        values.push(value);
        *pos += 1;
    }
    let mut out = [0.0; TRAFFIC_SLOTS];
    out.copy_from_slice(&values);
    Ok(out)
}

/// Scans `tokens[start..]` for the shared `FIO/IP/DATE/TRAFFIC_IN/
/// TRAFFIC_OUT/SET/START_DATE/END_DATE` keyword grammar, allowing only the
/// keywords present in `allowed`. `END`, if present, must be the last
/// token. Returns the accumulated fields.
fn scan_fields(
    tokens: &[String],
    start: usize,
    allowed: &[&str],
    allow_set: bool,
) -> Result<Fields, ParseError> {
    let mut fields = Fields::default();
    let mut pos = start;

    while pos < tokens.len() {
        let raw = &tokens[pos];
        let upper = raw.to_ascii_uppercase();

        if upper == "END" {
            if pos != tokens.len() - 1 {
                return Err(ParseError::TrailingTokens(tokens[pos + 1].clone()));
            }
            pos += 1;
            continue;
        }

        if upper == "SET" {
            if !allow_set {
                return Err(ParseError::UnexpectedParameter(raw.clone()));
            }
            if fields.saw_set {
                return Err(ParseError::DuplicateParameter("SET"));
            }
            fields.saw_set = true;
            pos += 1;
            continue;
        }

        if !allowed.contains(&upper.as_str()) {
            return Err(ParseError::UnexpectedParameter(raw.clone()));
        }

        match upper.as_str() {
            "FIO" => {
                pos += 1;
                let value = tokens.get(pos).ok_or(ParseError::MissingValue("FIO"))?;
                let slot = if fields.saw_set {
                    &mut fields.set.name
                } else {
                    &mut fields.name
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateParameter("FIO"));
                }
                *slot = Some(value.clone());
                pos += 1;
            }
            "IP" => {
                pos += 1;
                let value = tokens.get(pos).ok_or(ParseError::MissingValue("IP"))?;
                let parsed: IpAddr4 = value.parse()?;
                let slot = if fields.saw_set {
                    &mut fields.set.ip
                } else {
                    &mut fields.ip
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateParameter("IP"));
                }
                *slot = Some(parsed);
                pos += 1;
            }
            "DATE" => {
                pos += 1;
                let value = tokens.get(pos).ok_or(ParseError::MissingValue("DATE"))?;
                let parsed: Date = value.parse()?;
                let slot = if fields.saw_set {
                    &mut fields.set.date
                } else {
                    &mut fields.date
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateParameter("DATE"));
                }
                *slot = Some(parsed);
                pos += 1;
            }
            "START_DATE" => {
                pos += 1;
                let value = tokens
                    .get(pos)
                    .ok_or(ParseError::MissingValue("START_DATE"))?;
                if fields.start_date.is_some() {
                    return Err(ParseError::DuplicateParameter("START_DATE"));
                }
                fields.start_date = Some(value.parse()?);
                pos += 1;
            }
            "END_DATE" => {
                pos += 1;
                let value = tokens
                    .get(pos)
                    .ok_or(ParseError::MissingValue("END_DATE"))?;
                if fields.end_date.is_some() {
                    return Err(ParseError::DuplicateParameter("END_DATE"));
                }
                fields.end_date = Some(value.parse()?);
                pos += 1;
            }
            "TRAFFIC_IN" => {
                pos += 1;
                let values = parse_traffic_block(tokens, &mut pos, "TRAFFIC_IN")?;
                let slot = if fields.saw_set {
                    &mut fields.set.traffic_in
                } else {
                    &mut fields.traffic_in
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateParameter("TRAFFIC_IN"));
                }
                *slot = Some(values);
            }
            "TRAFFIC_OUT" => {
                pos += 1;
                let values = parse_traffic_block(tokens, &mut pos, "TRAFFIC_OUT")?;
                let slot = if fields.saw_set {
                    &mut fields.set.traffic_out
                } else {
                    &mut fields.traffic_out
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateParameter("TRAFFIC_OUT"));
                }
                *slot = Some(values);
            }
            _ => unreachable!("checked against `allowed` above"),
        }
    }

    Ok(fields)
}

fn criteria_from_fields(fields: &Fields) -> Criteria {
    Criteria {
        name: fields.name.clone(),
        ip: fields.ip,
        date: fields.date,
    }
}

const CRITERIA_KEYWORDS: &[&str] = &["FIO", "IP", "DATE"];
const EDIT_KEYWORDS: &[&str] = &["FIO", "IP", "DATE", "TRAFFIC_IN", "TRAFFIC_OUT"];
const CHARGES_KEYWORDS: &[&str] = &["FIO", "IP", "DATE", "START_DATE", "END_DATE"];

fn parse_add(tokens: &[String]) -> Result<Command, ParseError> {
    let fields = scan_fields(tokens, 1, EDIT_KEYWORDS, false)?;
    let name = fields.name.ok_or(ParseError::MissingParameter("FIO"))?;
    let ip = fields.ip.ok_or(ParseError::MissingParameter("IP"))?;
    let date = fields.date.ok_or(ParseError::MissingParameter("DATE"))?;
    Ok(Command::Add(AddParams {
        name,
        ip,
        date,
        traffic_in: fields.traffic_in,
        traffic_out: fields.traffic_out,
    }))
}

fn parse_select(tokens: &[String]) -> Result<Command, ParseError> {
    let fields = scan_fields(tokens, 1, CRITERIA_KEYWORDS, false)?;
    let criteria = criteria_from_fields(&fields);
    if criteria.name.is_none() && criteria.ip.is_none() && criteria.date.is_none() {
        return Err(ParseError::MissingParameter("FIO|IP|DATE"));
    }
    Ok(Command::Select(criteria))
}

fn parse_delete(tokens: &[String]) -> Result<Command, ParseError> {
    let fields = scan_fields(tokens, 1, CRITERIA_KEYWORDS, false)?;
    Ok(Command::Delete(criteria_from_fields(&fields)))
}

fn parse_edit(tokens: &[String]) -> Result<Command, ParseError> {
    let fields = scan_fields(tokens, 1, EDIT_KEYWORDS, true)?;
    if !fields.saw_set {
        return Err(ParseError::MissingParameter("SET"));
    }
    if fields.set.is_empty() {
        return Err(ParseError::EmptySet);
    }
    Ok(Command::Edit {
        criteria: criteria_from_fields(&fields),
        set: fields.set,
    })
}

fn parse_calculate_charges(tokens: &[String]) -> Result<Command, ParseError> {
    let fields = scan_fields(tokens, 1, CHARGES_KEYWORDS, false)?;
    let start = fields
        .start_date
        .ok_or(ParseError::MissingParameter("START_DATE"))?;
    let end = fields
        .end_date
        .ok_or(ParseError::MissingParameter("END_DATE"))?;
    Ok(Command::CalculateCharges {
        criteria: criteria_from_fields(&fields),
        start,
        end,
    })
}

fn parse_filename(tokens: &[String]) -> Result<Option<String>, ParseError> {
    match tokens.len() {
        1 => Ok(None),
        2 => Ok(Some(tokens[1].clone())),
        _ => Err(ParseError::TrailingTokens(tokens[2].clone())),
    }
}

fn parse_load(tokens: &[String]) -> Result<Command, ParseError> {
    match parse_filename(tokens)? {
        Some(filename) => Ok(Command::Load(filename)),
        None => Err(ParseError::MissingFilename),
    }
}

fn parse_save(tokens: &[String]) -> Result<Command, ParseError> {
    Ok(Command::Save(parse_filename(tokens)?))
}

fn parse_no_args(tokens: &[String], command: Command) -> Result<Command, ParseError> {
    if tokens.len() > 1 {
        return Err(ParseError::TrailingTokens(tokens[1].clone()));
    }
    Ok(command)
}

/// Tokenizes and classifies one query line into a tagged [`Command`]. An
/// empty or whitespace-only input parses to [`Command::Unknown`] with an
/// empty string, same as an unrecognized leading keyword; the handler
/// rejects both.
pub fn parse(input: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(input)?;

    let Some(first) = tokens.first() else {
        return Ok(Command::Unknown(input.to_string()));
    };

    match first.to_ascii_uppercase().as_str() {
        "ADD" => parse_add(&tokens),
        "SELECT" => parse_select(&tokens),
        "DELETE" => parse_delete(&tokens),
        "EDIT" => parse_edit(&tokens),
        "CALCULATE_CHARGES" => parse_calculate_charges(&tokens),
        "PRINT_ALL" => parse_no_args(&tokens, Command::PrintAll),
        "LOAD" => parse_load(&tokens),
        "SAVE" => parse_save(&tokens),
        "HELP" => parse_no_args(&tokens, Command::Help),
        "EXIT" => parse_no_args(&tokens, Command::Exit),
        _ => Ok(Command::Unknown(input.to_string())),
    }
}
