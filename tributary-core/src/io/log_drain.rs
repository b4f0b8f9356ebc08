//! Background relay of a connector's diagnostic stream.

use super::BoxedRead;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Spawn a task that forwards every diagnostic line of a connector to the log.
///
/// The task ends when the stream closes; it yields the number of lines relayed.
pub fn spawn_log_drain(stderr: BoxedRead, connector: String) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut relayed = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if !line.is_empty() {
                        error!(connector = %connector, "destination > {}", line);
                        relayed += 1;
                    }
                }
                Err(e) => {
                    warn!(connector = %connector, "Stopped reading destination diagnostics: {}", e);
                    break;
                }
            }
        }

        relayed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_relays_every_line_until_eof() {
        let stderr: BoxedRead = Box::new(
            Builder::new()
                .read(b"starting\n\n")
                .read(b"invalid \xff utf8\nno trailing newline")
                .build(),
        );

        let relayed = spawn_log_drain(stderr, "dest-test".to_string())
            .await
            .unwrap();
        assert_eq!(relayed, 3);
    }

    #[tokio::test]
    async fn test_stops_on_read_error() {
        let stderr: BoxedRead = Box::new(
            Builder::new()
                .read(b"one\n")
                .read_error(std::io::Error::other("gone"))
                .build(),
        );

        let relayed = spawn_log_drain(stderr, "dest-test".to_string())
            .await
            .unwrap();
        assert_eq!(relayed, 1);
    }
}
