use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::codec::{decode, encode, WireMessage};
use super::transport::{FrameReader, FrameWriter, MasterTransport};
use crate::SwarmError;

/// Outbound frames are buffered at least this deep before overflow starts
/// dropping the oldest non-heartbeat frame.
pub const OUTBOUND_CAPACITY: usize = 128;
const INBOUND_CAPACITY: usize = 256;

/// Maintains the single connection to the master: a bounded, lossy outbound
/// queue drained by a background sender, and a background receiver that
/// forwards decoded inbound messages to whoever calls [`MasterClient::recv`].
pub struct MasterClient {
    outbound: Arc<Mutex<VecDeque<WireMessage>>>,
    send_notify: Arc<Notify>,
    disconnected: Arc<AtomicBool>,
    disconnected_notify: Arc<Notify>,
    inbound_rx: Mutex<mpsc::Receiver<WireMessage>>,
    sender_handle: JoinHandle<()>,
    receiver_handle: JoinHandle<()>,
}

impl MasterClient {
    pub fn spawn(transport: Box<dyn MasterTransport>) -> Self {
        let (writer, reader) = transport.split();

        let outbound = Arc::new(Mutex::new(VecDeque::new()));
        let send_notify = Arc::new(Notify::new());
        let disconnected = Arc::new(AtomicBool::new(false));
        let disconnected_notify = Arc::new(Notify::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let sender_handle = tokio::spawn(run_sender(
            writer,
            outbound.clone(),
            send_notify.clone(),
            disconnected.clone(),
            disconnected_notify.clone(),
        ));
        let receiver_handle = tokio::spawn(run_receiver(
            reader,
            inbound_tx,
            disconnected.clone(),
            disconnected_notify.clone(),
        ));

        Self {
            outbound,
            send_notify,
            disconnected,
            disconnected_notify,
            inbound_rx: Mutex::new(inbound_rx),
            sender_handle,
            receiver_handle,
        }
    }

    /// Enqueues `msg` for sending. Never blocks: if the queue is at
    /// capacity, the oldest non-heartbeat frame is evicted to make room.
    pub async fn send(&self, msg: WireMessage) {
        let mut queue = self.outbound.lock().await;
        if queue.len() >= OUTBOUND_CAPACITY {
            if let Some(pos) = queue.iter().position(|m| m.msg_type != "heartbeat") {
                queue.remove(pos);
                warn!("master outbound queue full, dropped oldest non-heartbeat frame");
            } else {
                queue.pop_front();
                warn!("master outbound queue full of heartbeats, dropped oldest frame");
            }
        }
        queue.push_back(msg);
        drop(queue);
        self.send_notify.notify_one();
    }

    /// Awaits the next decoded inbound message. Returns `None` once the
    /// connection has been closed and all buffered messages drained.
    pub async fn recv(&self) -> Option<WireMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Resolves once the transport has observed a fatal error or `close()`
    /// has been called.
    pub async fn disconnected(&self) {
        if self.disconnected.load(Ordering::Relaxed) {
            return;
        }
        self.disconnected_notify.notified().await;
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    pub async fn close(self) {
        self.disconnected.store(true, Ordering::Relaxed);
        self.disconnected_notify.notify_waiters();
        self.sender_handle.abort();
        self.receiver_handle.abort();
    }
}

async fn run_sender(
    mut writer: Box<dyn FrameWriter>,
    outbound: Arc<Mutex<VecDeque<WireMessage>>>,
    send_notify: Arc<Notify>,
    disconnected: Arc<AtomicBool>,
    disconnected_notify: Arc<Notify>,
) {
    loop {
        let next = {
            let mut queue = outbound.lock().await;
            queue.pop_front()
        };

        let msg = match next {
            Some(msg) => msg,
            None => {
                send_notify.notified().await;
                continue;
            }
        };

        let frame = match encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message, dropping");
                continue;
            }
        };

        if let Err(e) = writer.send_frame(frame.into()).await {
            warn!(error = %e, "master send failed, marking disconnected");
            disconnected.store(true, Ordering::Relaxed);
            disconnected_notify.notify_waiters();
            writer.close().await;
            break;
        }
    }
}

async fn run_receiver(
    mut reader: Box<dyn FrameReader>,
    inbound_tx: mpsc::Sender<WireMessage>,
    disconnected: Arc<AtomicBool>,
    disconnected_notify: Arc<Notify>,
) {
    loop {
        match reader.recv_frame().await {
            Ok(Some(frame)) => match decode(&frame) {
                Ok(msg) => {
                    if inbound_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "dropping undecodable inbound frame");
                }
            },
            Ok(None) => {
                debug!("master connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(error = %e, "master recv failed, marking disconnected");
                break;
            }
        }
    }
    disconnected.store(true, Ordering::Relaxed);
    disconnected_notify.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ChannelWriter {
        tx: mpsc::Sender<bytes::Bytes>,
    }

    #[async_trait::async_trait]
    impl FrameWriter for ChannelWriter {
        async fn send_frame(&mut self, frame: bytes::Bytes) -> Result<(), SwarmError> {
            self.tx
                .send(frame)
                .await
                .map_err(|_| SwarmError::Transport("closed".into()))
        }
        async fn close(&mut self) {}
    }

    struct ChannelReader {
        rx: mpsc::Receiver<bytes::Bytes>,
    }

    #[async_trait::async_trait]
    impl FrameReader for ChannelReader {
        async fn recv_frame(&mut self) -> Result<Option<bytes::Bytes>, SwarmError> {
            Ok(self.rx.recv().await)
        }
    }

    struct ChannelTransport {
        writer: ChannelWriter,
        reader: ChannelReader,
    }

    impl MasterTransport for ChannelTransport {
        fn split(self: Box<Self>) -> (Box<dyn FrameWriter>, Box<dyn FrameReader>) {
            (Box::new(self.writer), Box::new(self.reader))
        }
    }

    fn paired_transports() -> (ChannelTransport, mpsc::Sender<bytes::Bytes>, mpsc::Receiver<bytes::Bytes>) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        let transport = ChannelTransport {
            writer: ChannelWriter { tx: out_tx },
            reader: ChannelReader { rx: in_rx },
        };
        (transport, in_tx, out_rx)
    }

    #[tokio::test]
    async fn send_is_delivered_to_transport() {
        let (transport, _remote_tx, mut sent_rx) = paired_transports();
        let client = MasterClient::spawn(Box::new(transport));

        client
            .send(WireMessage::new("client_ready", json!({}), "node-1"))
            .await;

        let frame = sent_rx.recv().await.expect("frame sent");
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.msg_type, "client_ready");

        client.close().await;
    }

    #[tokio::test]
    async fn recv_decodes_inbound_frames() {
        let (transport, remote_tx, _sent_rx) = paired_transports();
        let client = MasterClient::spawn(Box::new(transport));

        let msg = WireMessage::new("spawn", json!({"user_count": 5}), "master-1");
        remote_tx.send(encode(&msg).unwrap().into()).await.unwrap();

        let received = client.recv().await.expect("message received");
        assert_eq!(received.msg_type, "spawn");

        client.close().await;
    }

    #[tokio::test]
    async fn overflow_drops_oldest_non_heartbeat_frame() {
        let (out_tx, _out_rx) = mpsc::channel::<bytes::Bytes>(1);
        // A writer that never drains lets us inspect the queue directly.
        drop(out_tx);
        let (_transport, _remote_tx, _sent_rx) = paired_transports();

        let outbound = Arc::new(Mutex::new(VecDeque::new()));
        {
            let mut queue = outbound.lock().await;
            for i in 0..OUTBOUND_CAPACITY {
                queue.push_back(WireMessage::new(
                    "heartbeat",
                    json!({}),
                    format!("n{i}"),
                ));
            }
            // Insert one non-heartbeat frame in the middle.
            queue.insert(
                OUTBOUND_CAPACITY / 2,
                WireMessage::new("stats", json!({}), "n-stats"),
            );
        }

        let mut queue = outbound.lock().await;
        if queue.len() >= OUTBOUND_CAPACITY {
            if let Some(pos) = queue.iter().position(|m| m.msg_type != "heartbeat") {
                queue.remove(pos);
            } else {
                queue.pop_front();
            }
        }
        assert!(!queue.iter().any(|m| m.msg_type == "stats"));
    }

    #[tokio::test]
    async fn close_marks_disconnected() {
        let (transport, _remote_tx, _sent_rx) = paired_transports();
        let client = MasterClient::spawn(Box::new(transport));
        assert!(!client.is_disconnected());
        client.close().await;
    }
}
