//! Transport receive loop.
//!
//! Accumulates bytes in a growable buffer, extracts complete frames from its
//! front and hands them to the dispatcher. Corruption costs one byte: the
//! frame error is logged, the first buffered byte is dropped and scanning
//! continues until the next valid frame boundary. Leftover bytes (the prefix
//! of an incomplete frame) always survive to the next read.

use std::sync::Arc;

use sphero_protocol::{scan, FrameScan};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::robot::RobotShared;

pub(crate) async fn listener_loop(
    mut read: Box<dyn AsyncRead + Send + Unpin>,
    shared: Arc<RobotShared>,
) {
    let chunk_size = shared.settings.buffer_size();
    let response_timeout = shared.settings.response_timeout();
    let mut buf: Vec<u8> = Vec::with_capacity(chunk_size * 2);
    let mut chunk = vec![0u8; chunk_size];

    loop {
        // Drain every complete frame currently at the front of the buffer.
        loop {
            match scan(&buf) {
                Ok(FrameScan::NeedMore) => break,
                Ok(FrameScan::Frame { frame, consumed }) => {
                    buf.drain(..consumed);
                    shared.dispatch_frame(frame);
                }
                Err(err) => {
                    warn!(error = %err, "corrupt frame; dropping one byte to resynchronize");
                    buf.remove(0);
                }
            }
        }

        let result = match response_timeout {
            Some(timeout) => {
                // Checked every iteration: continuous information traffic
                // keeps the read busy, so a stale head must not depend on
                // the link going quiet.
                shared.expire_pending(timeout);
                match tokio::time::timeout(timeout, read.read(&mut chunk)).await {
                    Ok(result) => result,
                    Err(_) => {
                        shared.expire_pending(timeout);
                        continue;
                    }
                }
            }
            None => read.read(&mut chunk).await,
        };

        match result {
            Ok(0) => {
                debug!("transport reached end of stream");
                shared.transport_closed(None);
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) => {
                shared.transport_closed(Some(err));
                return;
            }
        }
    }
}
