//! Serial link I/O tests over an in-memory port.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use moto_link::codec::{encode_frame, ACK, NACK};
use moto_link::{CanFrame, LinkError, SerialLink};
use parking_lot::Mutex;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct PortState {
    read_buf: Vec<u8>,
    read_pos: usize,
    write_buf: Vec<u8>,
    timeout: Duration,
}

/// In-memory serial port; clones share the same buffers so the link's
/// read and write loops each get a handle via `try_clone`.
#[derive(Clone)]
struct MemoryPort {
    state: Arc<Mutex<PortState>>,
}

impl MemoryPort {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PortState::default())),
        }
    }

    fn feed(&self, bytes: &[u8]) {
        self.state.lock().read_buf.extend_from_slice(bytes);
    }

    fn written(&self) -> Vec<u8> {
        self.state.lock().write_buf.clone()
    }
}

impl io::Read for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = {
            let mut state = self.state.lock();
            if state.read_pos < state.read_buf.len() {
                let n = buf.len().min(state.read_buf.len() - state.read_pos);
                buf[..n].copy_from_slice(&state.read_buf[state.read_pos..state.read_pos + n]);
                state.read_pos += n;
                return Ok(n);
            }
            state.timeout
        };
        std::thread::sleep(timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
    }
}

impl io::Write for MemoryPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialPort for MemoryPort {
    fn name(&self) -> Option<String> {
        Some("memory".into())
    }

    fn baud_rate(&self) -> serialport::Result<u32> {
        Ok(921_600)
    }

    fn data_bits(&self) -> serialport::Result<DataBits> {
        Ok(DataBits::Eight)
    }

    fn flow_control(&self) -> serialport::Result<FlowControl> {
        Ok(FlowControl::None)
    }

    fn parity(&self) -> serialport::Result<Parity> {
        Ok(Parity::None)
    }

    fn stop_bits(&self) -> serialport::Result<StopBits> {
        Ok(StopBits::One)
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    fn set_baud_rate(&mut self, _baud_rate: u32) -> serialport::Result<()> {
        Ok(())
    }

    fn set_data_bits(&mut self, _data_bits: DataBits) -> serialport::Result<()> {
        Ok(())
    }

    fn set_flow_control(&mut self, _flow_control: FlowControl) -> serialport::Result<()> {
        Ok(())
    }

    fn set_parity(&mut self, _parity: Parity) -> serialport::Result<()> {
        Ok(())
    }

    fn set_stop_bits(&mut self, _stop_bits: StopBits) -> serialport::Result<()> {
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn write_request_to_send(&mut self, _level: bool) -> serialport::Result<()> {
        Ok(())
    }

    fn write_data_terminal_ready(&mut self, _level: bool) -> serialport::Result<()> {
        Ok(())
    }

    fn read_clear_to_send(&mut self) -> serialport::Result<bool> {
        Ok(false)
    }

    fn read_data_set_ready(&mut self) -> serialport::Result<bool> {
        Ok(false)
    }

    fn read_ring_indicator(&mut self) -> serialport::Result<bool> {
        Ok(false)
    }

    fn read_carrier_detect(&mut self) -> serialport::Result<bool> {
        Ok(false)
    }

    fn bytes_to_read(&self) -> serialport::Result<u32> {
        let state = self.state.lock();
        Ok((state.read_buf.len() - state.read_pos) as u32)
    }

    fn bytes_to_write(&self) -> serialport::Result<u32> {
        Ok(0)
    }

    fn clear(&self, _buffer_to_clear: ClearBuffer) -> serialport::Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> serialport::Result<Box<dyn SerialPort>> {
        Ok(Box::new(self.clone()))
    }

    fn set_break(&self) -> serialport::Result<()> {
        Ok(())
    }

    fn clear_break(&self) -> serialport::Result<()> {
        Ok(())
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn test_frame() -> CanFrame {
    CanFrame::new(0x123, &[0x01, 0x02, 0x03]).unwrap()
}

#[tokio::test]
async fn send_frame_writes_encoded_stream() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();

    let frame = test_frame();
    // the bridge acknowledges once the frame shows up on the wire
    {
        let port = port.clone();
        let encoded = encode_frame(&frame);
        tokio::spawn(async move {
            wait_until(|| port.written() == encoded).await;
            port.feed(&[ACK]);
        });
    }

    link.send_frame(&root, &frame).await.unwrap();
    assert_eq!(port.written(), encode_frame(&frame));

    link.shutdown().await;
}

#[tokio::test]
async fn received_frame_is_broadcast_and_acked() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();
    let mut frames = link.subscribe_frames();

    let frame = test_frame();
    port.feed(&encode_frame(&frame));

    let received = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("frame within deadline")
        .expect("subscription open");
    assert_eq!(received, frame);

    wait_until(|| port.written() == vec![ACK]).await;

    link.shutdown().await;
}

#[tokio::test]
async fn corrupt_frame_draws_a_nack_and_reader_recovers() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();
    let mut frames = link.subscribe_frames();

    let frame = test_frame();
    let mut corrupted = encode_frame(&frame);
    corrupted[4] ^= 0xFF;
    port.feed(&corrupted);

    wait_until(|| port.written() == vec![NACK]).await;

    // the corrupt frame must not reach subscribers, and the decoder must
    // be ready for the next start marker
    port.feed(&encode_frame(&frame));
    let received = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("frame within deadline")
        .expect("subscription open");
    assert_eq!(received, frame);
    wait_until(|| port.written() == vec![NACK, ACK]).await;

    link.shutdown().await;
}

#[tokio::test]
async fn nack_triggers_retry_until_acked() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();

    let frame = test_frame();
    let encoded = encode_frame(&frame);

    // reject the first two attempts as they appear, accept the third
    {
        let port = port.clone();
        let frame_len = encoded.len();
        tokio::spawn(async move {
            for (attempt, response) in [(1, NACK), (2, NACK), (3, ACK)] {
                wait_until(|| port.written().len() >= attempt * frame_len).await;
                port.feed(&[response]);
            }
        });
    }

    link.send_frame(&root, &frame).await.unwrap();

    let expected: Vec<u8> = encoded.iter().chain(&encoded).chain(&encoded).copied().collect();
    assert_eq!(port.written(), expected);

    link.shutdown().await;
}

#[tokio::test]
async fn missing_ack_exhausts_retries() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();

    let frame = test_frame();
    let err = link.send_frame(&root, &frame).await.unwrap_err();
    assert_eq!(err, LinkError::NoAck);

    // initial attempt plus three retries
    wait_until(|| port.written().len() == 4 * encode_frame(&frame).len()).await;

    link.shutdown().await;
}

#[tokio::test]
async fn late_acknowledgement_is_not_credited_to_the_next_send() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();

    let frame = test_frame();
    assert_eq!(
        link.send_frame(&root, &frame).await.unwrap_err(),
        LinkError::NoAck
    );

    // the bridge's answer limps in after the send already gave up; it
    // must be discarded, not credited to the next frame
    port.feed(&[ACK]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        link.send_frame(&root, &frame).await.unwrap_err(),
        LinkError::NoAck
    );

    link.shutdown().await;
}

#[tokio::test]
async fn cancelled_send_returns_promptly() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port.clone()), &root).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = link.send_frame(&cancel, &test_frame()).await.unwrap_err();
    assert_eq!(err, LinkError::Cancelled);
    assert!(port.written().is_empty());

    link.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_subscriptions_and_is_idempotent() {
    let port = MemoryPort::new();
    let root = CancellationToken::new();
    let link = SerialLink::with_port(Box::new(port), &root).unwrap();
    let mut frames = link.subscribe_frames();

    link.shutdown().await;
    assert!(frames.recv().await.is_none());
    assert!(!link.is_running());

    // a second shutdown must be a no-op
    link.shutdown().await;

    let err = link.send_frame(&root, &test_frame()).await.unwrap_err();
    assert_eq!(err, LinkError::Closed);
}
