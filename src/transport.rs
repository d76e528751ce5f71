//! Wire format (spec §6): one framed message per freshly-opened connection.
//!
//! ```text
//! int32  kind          0 = SEND_LOG, 1 = DELETE_CONFLICT
//! body                 (NP, T) if kind=0; Appointment if kind=1
//! int32  sender_id     trailing
//! ```
//!
//! Bodies are `bincode`-encoded; the whole frame is prefixed with a u32
//! big-endian length so a stream reader knows exactly how many bytes to
//! pull off the socket before decoding (teacher and the rest of the pack
//! have no transport layer to mirror here, so this module's shape is
//! grounded in `flyingrobots-echo`'s Tokio-based `jitosd` daemon instead).

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::appointment::{Appointment, NodeId};
use crate::clock::TimeTable;
use crate::error::{CalendarError, Result};
use crate::event::EventRecord;

const KIND_SEND_LOG: u32 = 0;
const KIND_DELETE_CONFLICT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    SendLog {
        events: Vec<EventRecord>,
        time_table: TimeTable,
        sender: NodeId,
    },
    DeleteConflict {
        appt: Appointment,
        sender: NodeId,
    },
}

impl Message {
    fn kind(&self) -> u32 {
        match self {
            Message::SendLog { .. } => KIND_SEND_LOG,
            Message::DeleteConflict { .. } => KIND_DELETE_CONFLICT,
        }
    }

    fn sender(&self) -> NodeId {
        match self {
            Message::SendLog { sender, .. } => *sender,
            Message::DeleteConflict { sender, .. } => *sender,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = match self {
            Message::SendLog {
                events, time_table, ..
            } => bincode::serialize(&(events, time_table)),
            Message::DeleteConflict { appt, .. } => bincode::serialize(appt),
        }
        .map_err(|e| CalendarError::Decode(e.to_string()))?;

        let mut frame = Vec::with_capacity(8 + body.len());
        frame.extend_from_slice(&self.kind().to_be_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&(self.sender().0 as u32).to_be_bytes());
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Message> {
        if frame.len() < 8 {
            return Err(CalendarError::Decode("frame too short".to_string()));
        }
        let kind = u32::from_be_bytes(frame[0..4].try_into().unwrap());
        let sender_bytes = &frame[frame.len() - 4..];
        let sender = NodeId(u32::from_be_bytes(sender_bytes.try_into().unwrap()) as u16);
        let body = &frame[4..frame.len() - 4];

        match kind {
            KIND_SEND_LOG => {
                let (events, time_table): (Vec<EventRecord>, TimeTable) =
                    bincode::deserialize(body).map_err(|e| CalendarError::Decode(e.to_string()))?;
                Ok(Message::SendLog {
                    events,
                    time_table,
                    sender,
                })
            }
            KIND_DELETE_CONFLICT => {
                let appt: Appointment =
                    bincode::deserialize(body).map_err(|e| CalendarError::Decode(e.to_string()))?;
                Ok(Message::DeleteConflict { appt, sender })
            }
            other => Err(CalendarError::Decode(format!("unknown message kind {other}"))),
        }
    }
}

/// Opens a fresh connection to `addr`, writes one length-prefixed frame, and
/// closes it. One message per connection, per spec §6.
pub async fn send_message(addr: std::net::SocketAddr, msg: &Message) -> std::io::Result<()> {
    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    let frame = msg
        .encode()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    stream.write_u32(frame.len() as u32).await?;
    stream.write_all(&frame).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Reads exactly one length-prefixed frame off an accepted connection.
pub async fn read_message(stream: &mut tokio::net::TcpStream) -> std::io::Result<Vec<u8>> {
    let len = stream.read_u32().await?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
