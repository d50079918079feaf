//! Listener loop and the worker pool it feeds.
//!
//! The listener owns the socket's receive side: it blocks in `recv_from`,
//! copies each datagram into a [`Request`], and queues it on a bounded
//! channel drained by a fixed pool of worker threads. Reception is ordered;
//! handling is not — two datagrams from the same sender may be dispatched
//! out of order, which the dispatcher is written to tolerate.

use anyhow::Result;
use std::io::ErrorKind;
use std::net::SocketAddrV4;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::endpoint::ChatSocket;
use crate::wire::BUFFER_SIZE;

/// One received datagram, queued for a worker.
pub struct Request {
    pub src: SocketAddrV4,
    pub payload: Vec<u8>,
}

/// Depth of the listener→worker queue. Datagrams beyond this are dropped,
/// which UDP senders must tolerate anyway.
const QUEUE_DEPTH: usize = 4096;

/// Receive datagrams until the socket is closed, dispatching each on the
/// worker pool. Returns once the socket dies and the workers have drained.
pub fn run(socket: Arc<ChatSocket>, dispatcher: Arc<Dispatcher>, workers: usize) -> Result<()> {
    let (tx, rx) = crossbeam_channel::bounded::<Request>(QUEUE_DEPTH);

    let mut handles = Vec::new();
    for i in 0..workers.max(1) {
        let rx = rx.clone();
        let dispatcher = dispatcher.clone();
        handles.push(
            std::thread::Builder::new()
                .name(format!("chat-worker-{i}"))
                .spawn(move || {
                    for req in &rx {
                        dispatcher.handle(req.src, &req.payload);
                    }
                })?,
        );
    }
    drop(rx);

    tracing::info!(port = socket.port(), workers = workers.max(1), "listener started");

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((0, _)) => continue,
            Ok((n, src)) => {
                let req = Request {
                    src,
                    payload: buf[..n].to_vec(),
                };
                if tx.try_send(req).is_err() {
                    tracing::warn!("worker queue full, dropping datagram from {src}");
                }
            }
            // ICMP-induced errors on a UDP socket are routine; keep receiving.
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted
                        | ErrorKind::WouldBlock
                        | ErrorKind::ConnectionRefused
                        | ErrorKind::ConnectionReset
                        | ErrorKind::InvalidData
                ) =>
            {
                continue;
            }
            Err(e) => {
                tracing::info!("recv loop ending: {e}");
                break;
            }
        }
    }

    drop(tx);
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
