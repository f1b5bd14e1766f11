//! Terminal rendering of a tracked job.

use std::io::Write;

use audiogen_client::api::{StatusApi, TransportError};
use audiogen_client::tracker::TrackerListener;
use audiogen_core::status::StatusSnapshot;

/// One progress line for a snapshot, e.g.
/// `[running] 45% Generating (~11s left)`.
pub fn format_snapshot(snapshot: &StatusSnapshot) -> String {
    let mut line = format!("[{}] {}%", snapshot.status, snapshot.progress_percent());
    if !snapshot.message.is_empty() {
        line.push(' ');
        line.push_str(&snapshot.message);
    }
    if let Some(secs) = snapshot.estimated_seconds_remaining() {
        line.push_str(&format!(" (~{secs}s left)"));
    }
    line
}

/// Prints progress lines and the final result to a writer.
///
/// Consecutive identical lines are printed once. Write errors are
/// ignored; losing the terminal must not stop tracking.
pub struct ProgressPrinter<W> {
    out: W,
    api: StatusApi,
    last_line: Option<String>,
}

impl ProgressPrinter<std::io::Stdout> {
    pub fn stdout(api: StatusApi) -> Self {
        Self::new(std::io::stdout(), api)
    }
}

impl<W: Write + Send + 'static> ProgressPrinter<W> {
    pub fn new(out: W, api: StatusApi) -> Self {
        Self {
            out,
            api,
            last_line: None,
        }
    }

    fn print(&mut self, line: String) {
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send + 'static> TrackerListener for ProgressPrinter<W> {
    fn on_snapshot(&mut self, snapshot: &StatusSnapshot) {
        let line = format_snapshot(snapshot);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return;
        }
        self.last_line = Some(line.clone());
        self.print(line);
    }

    fn on_complete(&mut self, result_url: Option<String>) {
        let line = match result_url {
            Some(url) => format!("Done: {}", self.api.resolve_result_url(&url)),
            None => "Done (the server reported no result file)".to_string(),
        };
        self.print(line);
    }

    fn on_failure(&mut self, error: Option<String>) {
        let error = error.unwrap_or_else(|| "Unknown error".to_string());
        self.print(format!("Failed: {error}"));
    }

    fn on_fetch_error(&mut self, error: &TransportError) {
        tracing::debug!(error = %error, "Status fetch failed, still polling");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use audiogen_core::status::JobStatus;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn running_line_includes_estimate() {
        let snap = StatusSnapshot::new("abc", JobStatus::Running, 45).with_message("Generating");
        assert_eq!(format_snapshot(&snap), "[running] 45% Generating (~11s left)");
    }

    #[test]
    fn queued_line_has_no_estimate() {
        let snap = StatusSnapshot::new("abc", JobStatus::Queued, 0);
        assert_eq!(format_snapshot(&snap), "[queued] 0%");
    }

    #[test]
    fn printer_skips_repeats_and_resolves_result() {
        let buf = SharedBuf::default();
        let mut printer = ProgressPrinter::new(buf.clone(), StatusApi::new("http://gpu-box:8000"));

        let running = StatusSnapshot::new("abc", JobStatus::Running, 50);
        printer.on_snapshot(&running);
        printer.on_snapshot(&running);
        printer.on_complete(Some("/api/files/abc.wav".into()));

        assert_eq!(
            buf.text(),
            "[running] 50% (~10s left)\nDone: http://gpu-box:8000/api/files/abc.wav\n"
        );
    }

    #[test]
    fn failure_without_message_says_unknown() {
        let buf = SharedBuf::default();
        let mut printer = ProgressPrinter::new(buf.clone(), StatusApi::new("http://localhost:8000"));
        printer.on_failure(None);
        assert_eq!(buf.text(), "Failed: Unknown error\n");
    }
}
