use tracing::info;

/// Receives progress percentages and status lines
pub trait ProgressSink: Send {
    fn on_progress(&mut self, percent: u8);
    fn on_status(&mut self, message: &str);
}

/// Sink built from a pair of closures
pub struct FnSink<P, S> {
    progress: P,
    status: S,
}

impl<P, S> FnSink<P, S>
where
    P: FnMut(u8) + Send,
    S: FnMut(&str) + Send,
{
    pub fn new(progress: P, status: S) -> Self {
        Self { progress, status }
    }
}

impl<P, S> ProgressSink for FnSink<P, S>
where
    P: FnMut(u8) + Send,
    S: FnMut(&str) + Send,
{
    fn on_progress(&mut self, percent: u8) {
        (self.progress)(percent)
    }

    fn on_status(&mut self, message: &str) {
        (self.status)(message)
    }
}

/// Sink that writes to the log
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&mut self, percent: u8) {
        info!("📊 Progress: {}%", percent);
    }

    fn on_status(&mut self, message: &str) {
        info!("📝 {}", message);
    }
}

/// Maps pipeline milestones onto a monotonic 0-100 scale
///
/// Setup covers 0-10, clip playback 10-90, capture assembly 90-95,
/// finalize 95-100.
pub struct ProgressReporter {
    sink: Option<Box<dyn ProgressSink>>,
    last: u8,
}

const RENDER_START: f64 = 10.0;
const RENDER_END: f64 = 90.0;

impl ProgressReporter {
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self { sink: Some(sink), last: 0 }
    }

    /// Reporter that only tracks the value
    pub fn silent() -> Self {
        Self { sink: None, last: 0 }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    /// Report a percentage; values below the last report are raised to it
    pub fn progress(&mut self, percent: u8) {
        let value = percent.min(100).max(self.last);
        self.last = value;
        if let Some(sink) = self.sink.as_mut() {
            sink.on_progress(value);
        }
    }

    pub fn status(&mut self, message: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_status(message);
        }
    }

    pub fn setup(&mut self, message: &str) {
        self.progress(2);
        self.status(message);
    }

    pub fn assets_loaded(&mut self) {
        self.progress(RENDER_START as u8);
        self.status("assets ready");
    }

    /// Announce clip `index` (0-based) of `total` becoming active
    pub fn scene(&mut self, index: usize, total: usize) {
        self.status(&format!("rendering scene {}/{}", index + 1, total.max(1)));
    }

    /// Timeline position as a fraction of the total duration
    pub fn rendering(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let percent = RENDER_START + (RENDER_END - RENDER_START) * fraction;
        if percent.floor() as u8 > self.last {
            self.progress(percent.floor() as u8);
        }
    }

    pub fn finalizing(&mut self) {
        self.progress(95);
        self.status("finalizing video");
    }

    pub fn done(&mut self) {
        self.progress(100);
        self.status("done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_progress_never_decreases() {
        let sink = RecordingSink::default();
        let mut reporter = ProgressReporter::new(Box::new(sink.clone()));
        reporter.progress(40);
        reporter.progress(20);
        reporter.progress(120);
        assert_eq!(sink.progress(), vec![40, 40, 100]);
    }

    #[test]
    fn test_milestones() {
        let sink = RecordingSink::default();
        let mut reporter = ProgressReporter::new(Box::new(sink.clone()));
        reporter.setup("loading assets");
        reporter.assets_loaded();
        reporter.scene(0, 3);
        reporter.rendering(0.5);
        reporter.rendering(0.5);
        reporter.scene(1, 3);
        reporter.finalizing();
        reporter.done();

        assert_eq!(sink.progress(), vec![2, 10, 50, 95, 100]);
        let statuses = sink.statuses();
        assert!(statuses.contains(&"rendering scene 1/3".to_string()));
        assert!(statuses.contains(&"rendering scene 2/3".to_string()));
        assert_eq!(statuses.last().map(String::as_str), Some("done"));
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink::new(|p| seen.push(p), |_| {});
            sink.on_progress(7);
        }
        assert_eq!(seen, vec![7]);
    }
}
