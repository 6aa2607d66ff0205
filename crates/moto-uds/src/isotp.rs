//! ISO 15765-2 transport: segmentation and reassembly of UDS payloads
//!
//! Payloads of up to seven bytes travel in a single frame. Longer ones
//! are announced with a first frame, paced by the peer's flow control
//! frame, and continued in consecutive frames with a four-bit rolling
//! sequence number. On reception the roles flip: we answer a first frame
//! with an open flow control (continue-to-send, no block limit, no
//! minimum separation) and collect the consecutive frames.

use std::time::Duration;

use moto_link::broadcaster::Subscription;
use moto_link::{CanFrame, CanTransport, LinkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TpError;
use crate::message::TESTER_ID;

/// Upper nibble of the PCI byte.
const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;
const PCI_FLOW_CONTROL: u8 = 0x3;

/// Largest payload a first frame's 12-bit length field can announce.
pub const MAX_PAYLOAD: usize = 4095;

/// Payload bytes that fit in a single frame.
const SINGLE_FRAME_CAPACITY: usize = 7;
/// Payload bytes carried by the first frame of a multi-frame message.
const FIRST_FRAME_CAPACITY: usize = 6;
/// Payload bytes per consecutive frame.
const CONSECUTIVE_CAPACITY: usize = 7;

/// How long to wait for flow-control and consecutive frames.
const FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

fn pci_type(frame: &CanFrame) -> u8 {
    (frame.raw_data()[0] & 0xF0) >> 4
}

/// Send a raw UDS payload from `sender_id`, segmenting when needed.
pub async fn send(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    sender_id: u16,
    data: &[u8],
) -> Result<(), TpError> {
    if data.len() > MAX_PAYLOAD {
        return Err(TpError::Oversize(data.len()));
    }
    if data.len() <= SINGLE_FRAME_CAPACITY {
        return send_single_frame(cancel, transport, sender_id, data).await;
    }

    // Subscribe before the first frame goes out so the flow control
    // answer cannot slip past us.
    let mut frames = transport.subscribe_frames();
    send_first_frame(cancel, transport, sender_id, data).await?;
    let separation_time = wait_for_flow_control(cancel, &mut frames).await?;
    sleep_separation_time(cancel, separation_time).await?;
    send_consecutive_frames(cancel, transport, sender_id, data, separation_time).await
}

async fn send_single_frame(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    sender_id: u16,
    data: &[u8],
) -> Result<(), TpError> {
    let mut buf = [0u8; 8];
    buf[0] = (PCI_SINGLE << 4) | (data.len() as u8 & 0x0F);
    buf[1..1 + data.len()].copy_from_slice(data);
    let frame = CanFrame::new(sender_id, &buf[..data.len() + 1])?;
    transport.send_frame(cancel, &frame).await?;
    Ok(())
}

async fn send_first_frame(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    sender_id: u16,
    data: &[u8],
) -> Result<(), TpError> {
    let mut buf = [0u8; 8];
    buf[0] = (PCI_FIRST << 4) | ((data.len() >> 8) as u8 & 0x0F);
    buf[1] = data.len() as u8;
    buf[2..8].copy_from_slice(&data[..FIRST_FRAME_CAPACITY]);
    let frame = CanFrame::new(sender_id, &buf)?;
    transport.send_frame(cancel, &frame).await?;
    Ok(())
}

/// Wait for the peer's flow control frame and return its STmin byte.
///
/// Only the first flow control is honoured; the flow-status nibble and
/// block-size byte are read but not enforced. Frames of any other PCI
/// type (a response arriving early, for instance) are skipped.
async fn wait_for_flow_control(
    cancel: &CancellationToken,
    frames: &mut Subscription<CanFrame>,
) -> Result<u8, TpError> {
    let deadline = tokio::time::Instant::now() + FRAME_WAIT_TIMEOUT;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TpError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(TpError::FlowControlTimeout),
            frame = frames.recv() => {
                let frame = frame.ok_or(TpError::Link(LinkError::Closed))?;
                if pci_type(&frame) != PCI_FLOW_CONTROL {
                    continue;
                }
                let separation_time = frame.raw_data()[2];
                debug!(
                    st_min = format!("0x{:02X}", separation_time),
                    "flow control received"
                );
                return Ok(separation_time);
            }
        }
    }
}

/// Delay encoded by an STmin byte.
///
/// Values up to 0x7F are milliseconds, 0xF1..=0xF9 hundreds of
/// microseconds; anything else is invalid and treated as 10 ms.
fn separation_delay(st_min: u8) -> Duration {
    match st_min {
        0x00..=0x7F => Duration::from_millis(u64::from(st_min)),
        0xF1..=0xF9 => Duration::from_micros(100 * u64::from(st_min - 0xF0)),
        other => {
            warn!(
                st_min = format!("0x{:02X}", other),
                "invalid separation time received, using 10 ms"
            );
            Duration::from_millis(10)
        }
    }
}

async fn sleep_separation_time(cancel: &CancellationToken, st_min: u8) -> Result<(), TpError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TpError::Cancelled),
        _ = tokio::time::sleep(separation_delay(st_min)) => Ok(()),
    }
}

async fn send_consecutive_frames(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    sender_id: u16,
    data: &[u8],
    separation_time: u8,
) -> Result<(), TpError> {
    // Index starts at 1 and wraps 15 -> 0.
    let mut index: u8 = 1;
    for chunk in data[FIRST_FRAME_CAPACITY..].chunks(CONSECUTIVE_CAPACITY) {
        let mut buf = [0u8; 8];
        buf[0] = (PCI_CONSECUTIVE << 4) | (index & 0x0F);
        buf[1..1 + chunk.len()].copy_from_slice(chunk);
        let frame = CanFrame::new(sender_id, &buf[..chunk.len() + 1])?;
        transport.send_frame(cancel, &frame).await?;
        index = (index + 1) % 16;
        sleep_separation_time(cancel, separation_time).await?;
    }
    Ok(())
}

/// Receive one complete UDS payload, reassembling multi-frame messages.
///
/// Returns the sender's CAN id and the raw payload. Frames that are
/// neither a single nor a first frame are ignored while waiting.
pub async fn read(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
) -> Result<(u16, Vec<u8>), TpError> {
    let mut frames = transport.subscribe_frames();
    read_from(cancel, transport, &mut frames).await
}

/// Like [`read`], over a subscription the caller keeps between messages
/// so that frames arriving back-to-back are never lost.
pub async fn read_from(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    frames: &mut Subscription<CanFrame>,
) -> Result<(u16, Vec<u8>), TpError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TpError::Cancelled),
            frame = frames.recv() => {
                let frame = frame.ok_or(TpError::Link(LinkError::Closed))?;
                match pci_type(&frame) {
                    PCI_SINGLE => return Ok((frame.id(), receive_single_frame(&frame))),
                    PCI_FIRST => {
                        let data = receive_multi_frame(cancel, transport, frames, &frame).await?;
                        return Ok((frame.id(), data));
                    }
                    _ => continue,
                }
            }
        }
    }
}

fn receive_single_frame(frame: &CanFrame) -> Vec<u8> {
    // The PCI low nibble is the length; the DLC is not trusted.
    let len = usize::from(frame.raw_data()[0] & 0x0F).min(SINGLE_FRAME_CAPACITY);
    frame.raw_data()[1..1 + len].to_vec()
}

async fn receive_multi_frame(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
    frames: &mut Subscription<CanFrame>,
    first: &CanFrame,
) -> Result<Vec<u8>, TpError> {
    let raw = first.raw_data();
    let total = (usize::from(raw[0] & 0x0F) << 8) | usize::from(raw[1]);

    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(&raw[2..8]);
    data.truncate(total);

    send_flow_control(cancel, transport).await?;

    let mut expected_index: u8 = 1;
    while data.len() < total {
        let deadline = tokio::time::Instant::now() + FRAME_WAIT_TIMEOUT;
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Err(TpError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(TpError::ConsecutiveTimeout),
            frame = frames.recv() => frame.ok_or(TpError::Link(LinkError::Closed))?,
        };

        // Only consecutive frames from the peer we started with count.
        if frame.id() != first.id() || pci_type(&frame) != PCI_CONSECUTIVE {
            continue;
        }

        let index = frame.raw_data()[0] & 0x0F;
        if index != expected_index {
            return Err(TpError::UnexpectedSequence {
                expected: expected_index,
                received: index,
            });
        }

        let take = (total - data.len()).min(CONSECUTIVE_CAPACITY);
        data.extend_from_slice(&frame.raw_data()[1..1 + take]);
        expected_index = (expected_index + 1) % 16;
    }
    Ok(data)
}

/// Continue-to-send, no block-size limit, no minimum separation time.
async fn send_flow_control(
    cancel: &CancellationToken,
    transport: &dyn CanTransport,
) -> Result<(), TpError> {
    let frame = CanFrame::new(TESTER_ID, &[PCI_FLOW_CONTROL << 4, 0x00, 0x00])?;
    transport.send_frame(cancel, &frame).await?;
    Ok(())
}
