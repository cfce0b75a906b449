use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

pub const DEBUG_ENV: &str = "STUDIO_DEBUG";

/// Tees formatted log lines to stdout and to the broadcast channel behind `/api/logs`.
#[derive(Clone)]
pub(crate) struct SseMakeWriter {
    pub sender: tokio::sync::broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for SseMakeWriter {
    type Writer = SseWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SseWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct SseWriter {
    sender: tokio::sync::broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for SseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

fn max_level() -> Level {
    match std::env::var(DEBUG_ENV).as_deref() {
        Ok("1") | Ok("true") => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber. Returns the sender feeding the SSE log stream.
pub(crate) fn init_logging(suppress_stdout: bool) -> tokio::sync::broadcast::Sender<String> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(256);
    let make_writer = SseMakeWriter {
        sender: log_tx.clone(),
        suppress_stdout,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(max_level())
        .with_ansi(!suppress_stdout)
        .with_writer(make_writer)
        .finish();
    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
    log_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn writer_forwards_lines_to_subscribers() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(4);
        let make = SseMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        let mut writer = make.make_writer();
        writer.write_all(b"stage researcher started\n").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "stage researcher started\n");
    }

    #[test]
    fn writer_tolerates_missing_subscribers() {
        let (tx, _) = tokio::sync::broadcast::channel::<String>(4);
        let make = SseMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        let mut writer = make.make_writer();
        assert_eq!(writer.write(b"dropped").unwrap(), 7);
    }
}
