use std::fmt;

use tokio::net::TcpStream;

use crate::store::Record;
use crate::transport::{self, TransportError};

pub const CHUNK_THRESHOLD: usize = 60;
pub const CHUNK_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    MultiBegin,
    MultiChunk,
    MultiEnd,
    BadRequest,
    NotFound,
    ServerError,
}

impl Status {
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 200,
            Status::MultiBegin => 201,
            Status::MultiChunk => 202,
            Status::MultiEnd => 203,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::ServerError => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    ProviderRecordsList,
    SimpleMessage,
    ErrorInfo,
    None,
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PayloadType::ProviderRecordsList => "PROVIDER_RECORDS_LIST",
            PayloadType::SimpleMessage => "SIMPLE_MESSAGE",
            PayloadType::ErrorInfo => "ERROR_INFO",
            PayloadType::None => "NONE",
        };
        write!(f, "{label}")
    }
}

/// One wire frame's worth of header fields and body, matching §4.7's
/// `STATUS/MESSAGE/RECORDS_IN_PAYLOAD/TOTAL_RECORDS/PAYLOAD_TYPE` block
/// followed by `--DATA_BEGIN--` and the payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub status: Status,
    pub message: String,
    pub records_in_payload: u32,
    pub total_records: u32,
    pub payload_type: PayloadType,
    pub body: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "STATUS: {}\nMESSAGE: {}\nRECORDS_IN_PAYLOAD: {}\nTOTAL_RECORDS: {}\nPAYLOAD_TYPE: {}\n--DATA_BEGIN--\n",
            self.status.code(),
            self.message,
            self.records_in_payload,
            self.total_records,
            self.payload_type
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

pub async fn send_frame(stream: &mut TcpStream, frame: &Frame) -> Result<(), TransportError> {
    transport::send(stream, &frame.to_bytes()).await
}

pub async fn send_simple(
    stream: &mut TcpStream,
    status: Status,
    message: impl Into<String>,
) -> Result<(), TransportError> {
    let message = message.into();
    send_frame(
        stream,
        &Frame {
            status,
            records_in_payload: 0,
            total_records: 0,
            payload_type: PayloadType::SimpleMessage,
            body: message.clone().into_bytes(),
            message,
        },
    )
    .await
}

pub async fn send_error(
    stream: &mut TcpStream,
    status: Status,
    message: impl Into<String>,
) -> Result<(), TransportError> {
    let message = message.into();
    send_frame(
        stream,
        &Frame {
            status,
            records_in_payload: 0,
            total_records: 0,
            payload_type: PayloadType::ErrorInfo,
            body: message.clone().into_bytes(),
            message,
        },
    )
    .await
}

fn records_body(records: &[Record]) -> Vec<u8> {
    records
        .iter()
        .map(Record::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
        .into_bytes()
}

/// Sends a record-list payload, splitting it into `201/202*/203` chunks
/// once `records.len()` reaches [`CHUNK_THRESHOLD`].
pub async fn send_records(
    stream: &mut TcpStream,
    message: impl Into<String>,
    records: &[Record],
) -> Result<(), TransportError> {
    let total = records.len();
    let message = message.into();

    if total < CHUNK_THRESHOLD {
        return send_frame(
            stream,
            &Frame {
                status: Status::Ok,
                message,
                records_in_payload: total as u32,
                total_records: total as u32,
                payload_type: PayloadType::ProviderRecordsList,
                body: records_body(records),
            },
        )
        .await;
    }

    let mut chunks = records.chunks(CHUNK_SIZE);
    let first = chunks.next().unwrap_or(&[]);
    send_frame(
        stream,
        &Frame {
            status: Status::MultiBegin,
            message: message.clone(),
            records_in_payload: first.len() as u32,
            total_records: total as u32,
            payload_type: PayloadType::ProviderRecordsList,
            body: records_body(first),
        },
    )
    .await?;

    for chunk in chunks {
        send_frame(
            stream,
            &Frame {
                status: Status::MultiChunk,
                message: message.clone(),
                records_in_payload: chunk.len() as u32,
                total_records: total as u32,
                payload_type: PayloadType::ProviderRecordsList,
                body: records_body(chunk),
            },
        )
        .await?;
    }

    send_frame(
        stream,
        &Frame {
            status: Status::MultiEnd,
            message,
            records_in_payload: 0,
            total_records: total as u32,
            payload_type: PayloadType::None,
            body: Vec::new(),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn frame_header_has_expected_shape() {
        let frame = Frame {
            status: Status::Ok,
            message: "ok".to_string(),
            records_in_payload: 1,
            total_records: 1,
            payload_type: PayloadType::SimpleMessage,
            body: b"hi".to_vec(),
        };
        let bytes = frame.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("STATUS: 200\n"));
        assert!(text.contains("--DATA_BEGIN--\nhi"));
    }
}
