//! UDP transport mapping (RFC 3417 §2; spec.md §4.1).
//!
//! Mirrors the recv-loop-plus-event-channel shape this crate's sibling
//! services use for their own UDP/TDMoE sockets: bind once, spawn a
//! task that loops on `recv_from`, hand each datagram to the
//! registered callback. A second task ticks the timer callback on a
//! fixed interval so the dispatcher can age timeouts without its own
//! background task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::transport::{RecvCallback, TimerCallback, TransportDispatcher};
use crate::{Error, Result};

const RECV_BUFFER_SIZE: usize = 65536;

/// UDP transport binding for one local socket (spec.md §4.1).
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    recv_callback: RwLock<Option<RecvCallback>>,
    timer_callback: RwLock<Option<TimerCallback>>,
    timer_period: Duration,
    running: AtomicBool,
    shutdown: Notify,
}

impl UdpTransport {
    pub async fn bind(local_addr: SocketAddr, timer_period: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::transport(format!("failed to bind UDP socket on {}: {}", local_addr, e)))?;
        debug!(%local_addr, "UDP transport bound");
        Ok(Self {
            socket: Arc::new(socket),
            recv_callback: RwLock::new(None),
            timer_callback: RwLock::new(None),
            timer_period,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::transport(format!("failed to read local UDP address: {}", e)))
    }
}

#[async_trait]
impl TransportDispatcher for UdpTransport {
    fn register_recv_callback(&self, callback: RecvCallback) {
        *self.recv_callback.write().expect("recv_callback lock poisoned") = Some(callback);
    }

    fn register_timer_callback(&self, callback: TimerCallback) {
        *self.timer_callback.write().expect("timer_callback lock poisoned") = Some(callback);
    }

    async fn send_message(&self, _transport_domain: &str, destination: SocketAddr, wire_bytes: Vec<u8>) -> Result<()> {
        self.socket
            .send_to(&wire_bytes, destination)
            .await
            .map_err(|e| Error::transport(format!("failed to send to {}: {}", destination, e)))?;
        Ok(())
    }

    async fn run_dispatcher(self: Arc<Self>) {
        let recv_task = {
            let this = self.clone();
            tokio::spawn(async move { this.recv_loop().await })
        };
        let timer_task = {
            let this = self.clone();
            tokio::spawn(async move { this.timer_loop().await })
        };

        self.shutdown.notified().await;
        recv_task.abort();
        timer_task.abort();
    }

    async fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_waiters();
    }
}

impl UdpTransport {
    async fn recv_loop(&self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        while self.running.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, _src)) => {
                    let callback = self.recv_callback.read().expect("recv_callback lock poisoned").clone();
                    if let Some(callback) = callback {
                        callback("udp", &buf[..len]);
                    }
                }
                Err(e) => {
                    error!(error = %e, "UDP recv_from failed");
                }
            }
        }
    }

    async fn timer_loop(&self) {
        let mut ticker = tokio::time::interval(self.timer_period);
        while self.running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let callback = self.timer_callback.read().expect("timer_callback lock poisoned").clone();
            match callback {
                Some(callback) => callback(),
                None => warn!("timer tick fired with no callback registered"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let a = Arc::new(UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(60)).await.unwrap());
        let b = Arc::new(UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(60)).await.unwrap());
        let b_addr = b.local_addr().unwrap();

        let received: Arc<std::sync::Mutex<Option<Vec<u8>>>> = Arc::new(std::sync::Mutex::new(None));
        let received_clone = received.clone();
        let notify = Arc::new(Notify::new());
        let notify_clone = notify.clone();
        b.register_recv_callback(Arc::new(move |_domain, bytes| {
            *received_clone.lock().unwrap() = Some(bytes.to_vec());
            notify_clone.notify_one();
        }));

        let b_runner = b.clone();
        tokio::spawn(async move { b_runner.run_dispatcher().await });

        a.send_message("udp", b_addr, b"hello".to_vec()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), notify.notified()).await.unwrap();

        assert_eq!(received.lock().unwrap().as_deref(), Some(b"hello".as_slice()));
        b.shutdown().await;
    }

    #[tokio::test]
    async fn timer_callback_fires() {
        let t = Arc::new(UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_millis(20)).await.unwrap());
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();
        t.register_timer_callback(Arc::new(move || {
            ticks_clone.fetch_add(1, Ordering::Relaxed);
        }));

        let runner = t.clone();
        tokio::spawn(async move { runner.run_dispatcher().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        t.shutdown().await;

        assert!(ticks.load(Ordering::Relaxed) >= 2);
    }
}
