//! Line-oriented stdout output for event consumers.
//!
//! - **stdout**: one JSON document per line, flushed immediately
//! - **stderr**: logs (`tracing`), never parsed
//!
//! Writes use an explicit `\n` rather than `println!` so the framing is the
//! same on every platform.

use std::io::Write;

use serde::Serialize;

use crate::client::ClientEvent;
use crate::server::ServerEvent;

/// Write `line` plus `\n` to stdout and flush.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Serialize `value` as one JSON line on stdout.
pub fn write_stdout_json<T: Serialize>(value: &T) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)?;
    write_stdout_line(&json)?;
    Ok(())
}

/// JSON shape of a server event.
pub fn server_event_json(event: &ServerEvent) -> serde_json::Value {
    use serde_json::json;

    match event {
        ServerEvent::Listening { port } => json!({ "event": "listening", "port": port }),
        ServerEvent::Stopped => json!({ "event": "stopped" }),
        ServerEvent::ConnectionUpdated(record) => {
            json!({ "event": "connection_updated", "record": record })
        }
        ServerEvent::ConnectionClosed { id } => json!({ "event": "connection_closed", "id": id }),
        ServerEvent::FrameReceived { id, payload, request } => json!({
            "event": "frame_received",
            "id": id,
            "len": payload.len(),
            "counter": request.as_ref().map(|r| r.msg_counter),
            "content": request.as_ref().map(|r| String::from_utf8_lossy(&r.content).into_owned()),
        }),
        ServerEvent::InvalidPacket { id, error } => json!({
            "event": "invalid_packet",
            "id": id,
            "reason": error.to_string(),
        }),
    }
}

/// JSON shape of a client event.
pub fn client_event_json(event: &ClientEvent) -> serde_json::Value {
    use serde_json::json;

    match event {
        ClientEvent::StatusChanged(state) => json!({ "event": "status", "state": state }),
        ClientEvent::Connected { peer } => json!({ "event": "connected", "peer": peer }),
        ClientEvent::Disconnected => json!({ "event": "disconnected" }),
        ClientEvent::TransportError { reason } => json!({ "event": "transport_error", "reason": reason }),
        ClientEvent::ResponseReceived(payload) => json!({ "event": "response", "len": payload.len() }),
        ClientEvent::AckReceived(ack) => json!({
            "event": "ack",
            "code": ack.resp_code,
            "timestamp_ms": ack.timestamp_ms,
            "cmd": ack.cmd_id,
            "interval_ms": ack.interval_override,
        }),
        ClientEvent::IntervalUpdated(ms) => json!({ "event": "interval_updated", "interval_ms": ms }),
        ClientEvent::StatisticsUpdated { sent, received } => {
            json!({ "event": "statistics", "sent": sent, "received": received })
        }
        ClientEvent::MalformedFrame(error) => json!({ "event": "malformed_frame", "reason": error.to_string() }),
        ClientEvent::MalformedAck { len } => json!({ "event": "malformed_ack", "len": len }),
        ClientEvent::SendFailed { reason } => json!({ "event": "send_failed", "reason": reason }),
        ClientEvent::ReconnectScheduled { delay } => {
            json!({ "event": "reconnect_scheduled", "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX) })
        }
        ClientEvent::ReconnectCancelled => json!({ "event": "reconnect_cancelled" }),
        ClientEvent::AckTimeout => json!({ "event": "ack_timeout" }),
    }
}
