/// Bounded capture of child-process output streams.
///
/// Each stream is drained by its own task into its own [`BoundedOutput`];
/// the two are merged only after both tasks finish, under the same combined
/// byte budget. Nothing is ever shared between the drain tasks.

use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Line-oriented byte buffer that refuses any line that would overflow its budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedOutput {
    content: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedOutput {
    pub fn new(limit: usize) -> Self {
        Self {
            content: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append one line (newline included). Returns false once the budget is spent;
    /// every later line is refused too.
    pub fn push_line(&mut self, line: &[u8]) -> bool {
        if self.truncated {
            return false;
        }
        if self.content.len() + line.len() > self.limit {
            self.truncated = true;
            return false;
        }
        self.content.extend_from_slice(line);
        true
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Combine stdout and stderr captures, stdout first, under one budget
    pub fn merge(first: &BoundedOutput, second: &BoundedOutput, limit: usize) -> BoundedOutput {
        let mut merged = BoundedOutput::new(limit);

        for part in [first, second] {
            for line in part.content.split_inclusive(|b| *b == b'\n') {
                if !merged.push_line(line) {
                    break;
                }
            }
            if part.truncated {
                merged.truncated = true;
            }
            if merged.truncated {
                break;
            }
        }

        merged
    }

    /// Captured text with the truncation marker appended when lines were dropped
    pub fn render(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.content).into_owned();
        if self.truncated {
            text.push('\n');
            text.push_str(TRUNCATION_MARKER);
            text.push('\n');
        }
        text
    }
}

/// Read a stream to EOF line by line into a buffer bounded by `limit`.
///
/// Once the budget is exhausted the rest of the stream is read and discarded
/// so the child never blocks on a full pipe. Memory stays bounded even for a
/// single endless line.
///
/// Resolving `stop` ends the drain early and returns whatever was captured up
/// to that point, including a trailing partial line.
pub async fn drain_lines<R, S>(reader: R, limit: usize, stop: S) -> BoundedOutput
where
    R: AsyncRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    let mut reader = BufReader::new(reader);
    let mut output = BoundedOutput::new(limit);
    let mut line: Vec<u8> = Vec::new();
    let mut discarded = 0usize;

    loop {
        let (used, complete) = {
            let read = tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!("Drain stopped before EOF");
                    break;
                }
                read = reader.fill_buf() => read,
            };
            let buf = match read {
                Ok(buf) => buf,
                Err(e) => {
                    debug!(error = %e, "Stream read failed; keeping partial capture");
                    break;
                }
            };
            if buf.is_empty() {
                break;
            }

            if output.is_truncated() {
                discarded += buf.len();
                (buf.len(), false)
            } else {
                match buf.iter().position(|b| *b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&buf[..=pos]);
                        (pos + 1, true)
                    }
                    None => {
                        line.extend_from_slice(buf);
                        (buf.len(), false)
                    }
                }
            }
        };
        reader.consume(used);

        // an unterminated line longer than the budget can never fit
        if complete || line.len() > limit {
            output.push_line(&line);
            line.clear();
        }
    }

    if !line.is_empty() {
        output.push_line(&line);
    }
    if discarded > 0 {
        debug!(discarded_bytes = discarded, "Discarded output past capture budget");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_drain_keeps_lines_under_budget() {
        let input: &[u8] = b"hello\nworld\n";
        let output = drain_lines(input, 1024, pending()).await;
        assert_eq!(output.render(), "hello\nworld\n");
        assert!(!output.is_truncated());
    }

    #[tokio::test]
    async fn test_drain_keeps_trailing_partial_line() {
        let input: &[u8] = b"one\ntwo";
        let output = drain_lines(input, 1024, pending()).await;
        assert_eq!(output.render(), "one\ntwo");
    }

    #[tokio::test]
    async fn test_drain_truncates_on_line_boundary() {
        let input: &[u8] = b"aaaa\nbbbb\ncccc\n";
        let output = drain_lines(input, 12, pending()).await;
        assert!(output.is_truncated());
        assert_eq!(output.len(), 10);
        assert_eq!(output.render(), format!("aaaa\nbbbb\n\n{}\n", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_drain_bounds_single_endless_line() {
        let big = vec![b'x'; 100_000];
        let output = drain_lines(big.as_slice(), 1024, pending()).await;
        assert!(output.is_truncated());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_drain_consumes_rest_of_stream_after_truncation() {
        // a small pipe: the writer only finishes if the reader keeps draining
        let (reader, mut writer) = tokio::io::duplex(256);
        let writer_task = tokio::spawn(async move {
            for i in 0..5_000 {
                writer
                    .write_all(format!("line {}\n", i).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let output = drain_lines(reader, 512, pending()).await;
        writer_task.await.unwrap();

        assert!(output.is_truncated());
        assert!(output.len() <= 512);
    }

    #[tokio::test]
    async fn test_stopped_drain_keeps_partial_capture() {
        // the writer stays open, as a pipe held by a surviving grandchild would
        let (reader, mut writer) = tokio::io::duplex(256);
        writer.write_all(b"kept\nhalf a li").await.unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let drain = tokio::spawn(drain_lines(reader, 1024, async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(()).unwrap();
        let output = drain.await.unwrap();

        assert_eq!(output.render(), "kept\nhalf a li");
        drop(writer);
    }

    #[test]
    fn test_merge_applies_combined_budget() {
        let mut stdout = BoundedOutput::new(16);
        stdout.push_line(b"0123456789\n");
        let mut stderr = BoundedOutput::new(16);
        stderr.push_line(b"abcdefghij\n");

        let merged = BoundedOutput::merge(&stdout, &stderr, 16);
        assert!(merged.is_truncated());
        assert_eq!(merged.len(), 11);
        assert!(merged.render().starts_with("0123456789\n"));
        assert!(merged.render().contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_merge_without_overflow_keeps_both_streams() {
        let mut stdout = BoundedOutput::new(64);
        stdout.push_line(b"out\n");
        let mut stderr = BoundedOutput::new(64);
        stderr.push_line(b"err\n");

        let merged = BoundedOutput::merge(&stdout, &stderr, 64);
        assert_eq!(merged.render(), "out\nerr\n");
    }

    #[test]
    fn test_merge_carries_stream_truncation() {
        let mut stdout = BoundedOutput::new(4);
        stdout.push_line(b"toolong\n");
        let stderr = BoundedOutput::new(4);

        let merged = BoundedOutput::merge(&stdout, &stderr, 64);
        assert!(merged.is_truncated());
    }
}
