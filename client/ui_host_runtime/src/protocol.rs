use crate::error::TransportError;
use crate::navigation::{NavigationRequest, NavigationResponse, OperationsRequest};
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

pub const REQUEST_FRAME_CAP: usize = 262_144;
pub const RESPONSE_FRAME_CAP: usize = 8_388_608;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientEnvelope {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "navigation")]
    Navigation(NavigationRequest),
    #[serde(rename = "operations")]
    Operations(OperationsRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerEnvelope {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "navigation")]
    Navigation(NavigationResponse),
    #[serde(rename = "operations")]
    Operations { operations: Vec<Operation> },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEnvelope {
    pub fn tag(&self) -> &'static str {
        match self {
            ServerEnvelope::Pong => "pong",
            ServerEnvelope::Navigation(_) => "navigation",
            ServerEnvelope::Operations { .. } => "operations",
            ServerEnvelope::Error { .. } => "error",
        }
    }
}

/// Application-level error reply. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    pub code: String,
    pub message: String,
}

/// Typed unary call over a channel.
pub trait Service {
    const NAME: &'static str;
    type Request;
    type Response;

    fn envelope(request: &Self::Request) -> ClientEnvelope;

    /// Hands the envelope back when it is not this service's reply.
    fn reply(envelope: ServerEnvelope) -> Result<Self::Response, ServerEnvelope>;

    fn decode(envelope: ServerEnvelope) -> Result<Result<Self::Response, RemoteFault>, TransportError> {
        match envelope {
            ServerEnvelope::Error { code, message } => Ok(Err(RemoteFault { code, message })),
            other => Self::reply(other)
                .map(Ok)
                .map_err(|unexpected| TransportError::UnexpectedReply {
                    service: Self::NAME,
                    got: unexpected.tag(),
                }),
        }
    }
}

pub struct PingService;
pub struct NavigationService;
pub struct OperationService;

impl Service for PingService {
    const NAME: &'static str = "ping";
    type Request = ();
    type Response = ();

    fn envelope(_request: &()) -> ClientEnvelope {
        ClientEnvelope::Ping
    }

    fn reply(envelope: ServerEnvelope) -> Result<(), ServerEnvelope> {
        match envelope {
            ServerEnvelope::Pong => Ok(()),
            other => Err(other),
        }
    }
}

impl Service for NavigationService {
    const NAME: &'static str = "navigation";
    type Request = NavigationRequest;
    type Response = NavigationResponse;

    fn envelope(request: &NavigationRequest) -> ClientEnvelope {
        ClientEnvelope::Navigation(request.clone())
    }

    fn reply(envelope: ServerEnvelope) -> Result<NavigationResponse, ServerEnvelope> {
        match envelope {
            ServerEnvelope::Navigation(response) => Ok(response),
            other => Err(other),
        }
    }
}

impl Service for OperationService {
    const NAME: &'static str = "operations";
    type Request = OperationsRequest;
    type Response = Vec<Operation>;

    fn envelope(request: &OperationsRequest) -> ClientEnvelope {
        ClientEnvelope::Operations(request.clone())
    }

    fn reply(envelope: ServerEnvelope) -> Result<Vec<Operation>, ServerEnvelope> {
        match envelope {
            ServerEnvelope::Operations { operations } => Ok(operations),
            other => Err(other),
        }
    }
}

pub fn write_envelope<E: Serialize>(writer: &mut impl Write, envelope: &E, max_payload: usize) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(envelope)?;
    write_frame(writer, &payload, max_payload)?;
    writer.flush()?;
    Ok(())
}

pub fn read_envelope<E: for<'de> Deserialize<'de>>(reader: &mut impl Read, max_payload: usize) -> Result<E, TransportError> {
    let payload = read_frame(reader, max_payload)?;
    Ok(serde_json::from_slice(&payload)?)
}

pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}
