//! Operator console input
//!
//! Lines are read on a plain OS thread and forwarded over a channel. A read
//! blocked on a terminal cannot be cancelled, and the runtime joins its own
//! blocking pool on drop, so stdin must stay off it for the process to exit
//! after a shutdown.

use std::io::{self, BufRead, BufReader};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const LINE_QUEUE_DEPTH: usize = 32;

/// Forward lines from `input` until it ends, errors, or the receiver is gone
pub fn spawn_line_reader<R>(name: &str, input: R) -> io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_QUEUE_DEPTH);
    let label = name.to_string();

    thread::Builder::new()
        .name(format!("{}-reader", name))
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Reading {} failed: {}", label, e);
                        return;
                    }
                }
            }
            debug!("{} reached end of input", label);
        })?;

    Ok(rx)
}

/// Process stdin as a line channel
pub fn stdin_lines() -> io::Result<mpsc::Receiver<String>> {
    spawn_line_reader("stdin", BufReader::new(io::stdin()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Input that never produces a byte while its sender is alive
    struct StalledInput(std_mpsc::Receiver<Vec<u8>>);

    impl Read for StalledInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order_then_close() {
        let mut lines = spawn_line_reader("test", Cursor::new("TRIGGER\nq\n")).unwrap();
        assert_eq!(lines.recv().await.as_deref(), Some("TRIGGER"));
        assert_eq!(lines.recv().await.as_deref(), Some("q"));
        assert_eq!(lines.recv().await, None);
    }

    #[test]
    fn test_runtime_drops_while_reader_is_blocked() {
        let (_keep_stalled, stalled) = std_mpsc::channel::<Vec<u8>>();
        let (done_tx, done_rx) = std_mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let mut lines =
                    spawn_line_reader("stalled", BufReader::new(StalledInput(stalled))).unwrap();
                let pending = tokio::spawn(async move { lines.recv().await });
                tokio::task::yield_now().await;
                pending.abort();
            });
            drop(runtime);
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
