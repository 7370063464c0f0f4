use tokio::net::TcpStream;
use tracing::instrument;

use crate::query::{AddParams, Command, EditSet};
use crate::response::{self, Status};
use crate::sandbox::{self, SandboxError};
use crate::store::record::RecordError;
use crate::store::{calc_for_record, Criteria, Record, Store, StoreError, TRAFFIC_SLOTS};
use crate::tariff;
use crate::transport::TransportError;

/// Data the handler needs beyond the store itself: the sandbox root and
/// sub-directory used to resolve `LOAD`/`SAVE` filenames.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub data_root: String,
    pub subdir: Option<String>,
}

/// Whether the session loop should keep reading requests on this
/// connection after this command's reply has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Break,
}

const HELP_TEXT: &str = "\
ADD FIO <name> IP <ip> DATE <date> [TRAFFIC_IN v0..v23] [TRAFFIC_OUT v0..v23] [END] - add a record
SELECT [FIO <name>] [IP <ip>] [DATE <date>] [END] - list matching records
DELETE [FIO <name>] [IP <ip>] [DATE <date>] [END] - delete matching records
EDIT [FIO <name>] [IP <ip>] [DATE <date>] SET <field> <value>... [END] - edit the first match
CALCULATE_CHARGES [criteria] START_DATE <date> END_DATE <date> [END] - sum charges over a date range
PRINT_ALL - list every record
LOAD <filename> - replace the store from a file
SAVE [filename] - write the store to a file
HELP - show this text
EXIT - end the session";

fn zero_traffic() -> [f64; TRAFFIC_SLOTS] {
    [0.0; TRAFFIC_SLOTS]
}

fn record_error_message(err: &RecordError) -> String {
    format!("invalid record: {err}")
}

async fn handle_add(
    stream: &mut TcpStream,
    store: &mut Store,
    params: AddParams,
) -> Result<(), TransportError> {
    let traffic_in = params.traffic_in.unwrap_or_else(zero_traffic);
    let traffic_out = params.traffic_out.unwrap_or_else(zero_traffic);

    match Record::new(params.name, params.ip, params.date, &traffic_in, &traffic_out) {
        Ok(record) => {
            let message = format!("added record for {}", record.name());
            store.add_record(record);
            response::send_simple(stream, Status::Ok, message).await
        }
        Err(err) => {
            response::send_error(stream, Status::BadRequest, record_error_message(&err)).await
        }
    }
}

async fn handle_select(
    stream: &mut TcpStream,
    store: &Store,
    criteria: Criteria,
) -> Result<(), TransportError> {
    let records: Vec<Record> = store
        .find_by_criteria(&criteria)
        .into_iter()
        .filter_map(|i| store.get_by_index(i).ok())
        .collect();
    let message = format!("{} record(s) matched", records.len());
    response::send_records(stream, message, &records).await
}

async fn handle_print_all(stream: &mut TcpStream, store: &Store) -> Result<(), TransportError> {
    handle_select(stream, store, Criteria::default()).await
}

async fn handle_delete(
    stream: &mut TcpStream,
    store: &mut Store,
    criteria: Criteria,
) -> Result<(), TransportError> {
    let matches = store.find_by_criteria(&criteria);
    if matches.is_empty() {
        return response::send_simple(stream, Status::Ok, "nothing matched").await;
    }
    let removed = store.delete_by_indices(&matches);
    response::send_simple(stream, Status::Ok, format!("deleted {removed} record(s)")).await
}

fn apply_edit_set(record: &Record, set: &EditSet) -> Result<Record, RecordError> {
    let name = set.name.clone().unwrap_or_else(|| record.name().to_string());
    let ip = set.ip.unwrap_or_else(|| record.ip());
    let date = set.date.unwrap_or_else(|| record.date());
    let traffic_in = set.traffic_in.unwrap_or_else(|| *record.traffic_in());
    let traffic_out = set.traffic_out.unwrap_or_else(|| *record.traffic_out());
    Record::new(name, ip, date, &traffic_in, &traffic_out)
}

async fn handle_edit(
    stream: &mut TcpStream,
    store: &mut Store,
    criteria: Criteria,
    set: EditSet,
) -> Result<(), TransportError> {
    let matches = store.find_by_criteria(&criteria);
    let Some(&index) = matches.first() else {
        return response::send_error(stream, Status::NotFound, "no record matched").await;
    };

    let before = match store.get_by_index(index) {
        Ok(record) => record,
        Err(_) => return response::send_error(stream, Status::ServerError, "index vanished").await,
    };

    let after = match apply_edit_set(&before, &set) {
        Ok(record) => record,
        Err(err) => {
            return response::send_error(stream, Status::BadRequest, record_error_message(&err))
                .await
        }
    };

    let mut message = String::new();
    if matches.len() > 1 {
        message.push_str(&format!(
            "{} records matched, editing only the first (index {index}); ",
            matches.len()
        ));
    }

    if after == before {
        message.push_str("applied no effective changes");
        return response::send_simple(stream, Status::Ok, message).await;
    }

    if store.edit_record(index, after).is_err() {
        return response::send_error(stream, Status::ServerError, "index vanished").await;
    }

    message.push_str("record updated");
    response::send_simple(stream, Status::Ok, message).await
}

async fn handle_calculate_charges(
    stream: &mut TcpStream,
    store: &Store,
    criteria: Criteria,
    start: crate::date::Date,
    end: crate::date::Date,
) -> Result<(), TransportError> {
    if start > end {
        return response::send_error(stream, Status::BadRequest, "START_DATE must not be after END_DATE")
            .await;
    }

    let indices = if criteria == Criteria::default() {
        (0..store.len()).collect::<Vec<_>>()
    } else {
        store.find_by_criteria(&criteria)
    };

    let tariff = tariff::current().await;
    let mut report = String::new();
    let mut grand_total = 0.0;
    let mut counted = 0usize;

    for index in indices {
        let Ok(record) = store.get_by_index(index) else {
            continue;
        };
        if !record.date().in_range(&start, &end) {
            continue;
        }
        let charge = calc_for_record(&record, &tariff, &start, &end);
        report.push_str(&format!("{}: {:.2}\n", record.name(), charge));
        grand_total += charge;
        counted += 1;
    }
    report.push_str(&format!("TOTAL: {grand_total:.2}"));

    response::send_frame(
        stream,
        &response::Frame {
            status: Status::Ok,
            message: format!("charged {counted} record(s)"),
            records_in_payload: counted as u32,
            total_records: counted as u32,
            payload_type: response::PayloadType::SimpleMessage,
            body: report.into_bytes(),
        },
    )
    .await
}

async fn handle_load(
    stream: &mut TcpStream,
    store: &mut Store,
    config: &HandlerConfig,
    filename: String,
) -> Result<(), TransportError> {
    let path = match sandbox::resolve(&config.data_root, config.subdir.as_deref(), &filename).await
    {
        Ok(path) => path,
        Err(err) => return send_sandbox_error(stream, &err).await,
    };

    match store.load_file(&path).await {
        Ok(skipped) => {
            response::send_simple(
                stream,
                Status::Ok,
                format!("loaded {} record(s), skipped {skipped}", store.len()),
            )
            .await
        }
        Err(err) => send_store_error(stream, &err).await,
    }
}

async fn handle_save(
    stream: &mut TcpStream,
    store: &mut Store,
    config: &HandlerConfig,
    filename: Option<String>,
) -> Result<(), TransportError> {
    let path = match filename {
        Some(name) => {
            match sandbox::resolve(&config.data_root, config.subdir.as_deref(), &name).await {
                Ok(path) => Some(path),
                Err(err) => return send_sandbox_error(stream, &err).await,
            }
        }
        None => {
            if store.current_file().is_none() {
                return response::send_error(
                    stream,
                    Status::BadRequest,
                    "no current file to save to",
                )
                .await;
            }
            None
        }
    };

    match store.save_file(path.as_deref()).await {
        Ok(()) => response::send_simple(stream, Status::Ok, "saved").await,
        Err(err) => send_store_error(stream, &err).await,
    }
}

/// Rejections from filename cleaning and the sandbox containment check
/// (spec.md §4.5 steps 3-5) are client-visible `BAD_REQUEST`s; failures
/// resolving or preparing the sandbox directory itself (steps 1-2) are
/// host-side I/O failures and surface as `SERVER_ERROR`.
async fn send_sandbox_error(
    stream: &mut TcpStream,
    err: &SandboxError,
) -> Result<(), TransportError> {
    let status = match err {
        SandboxError::CannotPrepare { .. } | SandboxError::CannotResolveRoot { .. } => {
            Status::ServerError
        }
        SandboxError::EmptyFilename
        | SandboxError::ReservedName(_)
        | SandboxError::ForbiddenCharacter
        | SandboxError::TooLong
        | SandboxError::Escape => Status::BadRequest,
    };
    response::send_error(stream, status, format!("{err}")).await
}

async fn send_store_error(stream: &mut TcpStream, err: &StoreError) -> Result<(), TransportError> {
    let status = match err {
        StoreError::NoCurrentFile => Status::BadRequest,
        _ => Status::ServerError,
    };
    response::send_error(stream, status, format!("{err}")).await
}

/// Classifies a parsed command as a write-op (needs the store's writer
/// lock) or a read-op (reader lock suffices). The session loop uses this
/// to decide which of [`dispatch_write`]/[`dispatch_read`] to call and
/// which guard to hold for the duration of dispatch+reply.
#[must_use]
pub fn is_write_op(command: &Command) -> bool {
    matches!(
        command,
        Command::Add(_)
            | Command::Delete(_)
            | Command::Edit { .. }
            | Command::Load(_)
            | Command::Save(_)
    )
}

/// Executes one write-op command against the already write-locked store,
/// sending its reply before returning. Callers must only pass commands for
/// which [`is_write_op`] is true.
#[instrument(skip(stream, store, config))]
pub async fn dispatch_write(
    stream: &mut TcpStream,
    store: &mut Store,
    config: &HandlerConfig,
    command: Command,
) -> Result<(), TransportError> {
    match command {
        Command::Add(params) => handle_add(stream, store, params).await,
        Command::Delete(criteria) => handle_delete(stream, store, criteria).await,
        Command::Edit { criteria, set } => handle_edit(stream, store, criteria, set).await,
        Command::Load(filename) => handle_load(stream, store, config, filename).await,
        Command::Save(filename) => handle_save(stream, store, config, filename).await,
        other => unreachable!("dispatch_write called with a read-op command: {other:?}"),
    }
}

/// Executes one read-op command (including `HELP`/`EXIT`/unknown queries)
/// against the already read-locked store, sending its reply before
/// returning. Callers must only pass commands for which [`is_write_op`] is
/// false.
#[instrument(skip(stream, store))]
pub async fn dispatch_read(
    stream: &mut TcpStream,
    store: &Store,
    command: Command,
    raw_query: &str,
) -> Result<ControlFlow, TransportError> {
    match command {
        Command::Select(criteria) => handle_select(stream, store, criteria).await?,
        Command::PrintAll => handle_print_all(stream, store).await?,
        Command::CalculateCharges {
            criteria,
            start,
            end,
        } => handle_calculate_charges(stream, store, criteria, start, end).await?,
        Command::Help => response::send_simple(stream, Status::Ok, HELP_TEXT).await?,
        Command::Exit => {
            response::send_simple(stream, Status::Ok, "goodbye").await?;
            return Ok(ControlFlow::Break);
        }
        Command::Unknown(raw) => {
            let echo = if raw.is_empty() { raw_query.to_string() } else { raw };
            response::send_error(
                stream,
                Status::BadRequest,
                format!("unrecognized query: {echo}"),
            )
            .await?;
        }
        other => unreachable!("dispatch_read called with a write-op command: {other:?}"),
    }

    Ok(ControlFlow::Continue)
}
