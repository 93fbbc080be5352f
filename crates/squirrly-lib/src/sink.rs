//! Result delivery
//!
//! Output is either streamed as it is produced or persisted once the run is
//! terminal. File delivery never writes a partial capture: entries are held in
//! memory and written in one go by [`ResultSink::finish`].

use crate::cluster::{LogSource, PodOutcome};
use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Where results go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Emit as produced on the sink's writer
    Stream,
    /// Persist to an explicit path
    File(PathBuf),
    /// Persist to a generated name inside a directory
    Directory(PathBuf),
}

impl Delivery {
    /// Directory beats file; streaming is what remains when neither is given
    pub fn resolve(output_file: Option<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        match (output_dir, output_file) {
            (Some(dir), _) => Delivery::Directory(dir),
            (None, Some(file)) => Delivery::File(file),
            (None, None) => Delivery::Stream,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Delivery::Stream)
    }

    /// Destination file for persisted delivery at time `now`
    pub fn target_path(&self, now: DateTime<Local>) -> Option<PathBuf> {
        match self {
            Delivery::Stream => None,
            Delivery::File(path) => Some(path.clone()),
            Delivery::Directory(dir) => Some(dir.join(generated_file_name(now))),
        }
    }
}

/// `squirrly_analysis_YYYYMMDD_HHMMSS.txt`
pub fn generated_file_name(now: DateTime<Local>) -> String {
    format!("squirrly_analysis_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

/// Severity of a commentary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Success,
    Warning,
    Error,
}

impl Notice {
    fn tag(&self) -> &'static str {
        match self {
            Notice::Info => "[info]",
            Notice::Success => "[ok]",
            Notice::Warning => "[warn]",
            Notice::Error => "[error]",
        }
    }
}

/// Renders a notice for stream delivery
pub type Styler = fn(Notice, &str) -> String;

fn plain(notice: Notice, message: &str) -> String {
    format!("{} {}", notice.tag(), message)
}

pub struct ResultSink {
    delivery: Delivery,
    writer: Box<dyn Write + Send>,
    styler: Styler,
    buffer: Vec<String>,
}

impl ResultSink {
    /// Sink whose stream delivery goes to stdout
    pub fn stdout(delivery: Delivery) -> Self {
        Self::with_writer(delivery, Box::new(io::stdout()))
    }

    pub fn with_writer(delivery: Delivery, writer: Box<dyn Write + Send>) -> Self {
        Self {
            delivery,
            writer,
            styler: plain,
            buffer: Vec::new(),
        }
    }

    /// Style notices in stream delivery; persisted output stays plain
    pub fn with_styler(mut self, styler: Styler) -> Self {
        self.styler = styler;
        self
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// One line of stage commentary
    pub fn notice(&mut self, notice: Notice, message: &str) -> io::Result<()> {
        if self.delivery.is_stream() {
            let line = (self.styler)(notice, message);
            self.write_now(&line)
        } else {
            self.buffer.push(plain(notice, message));
            Ok(())
        }
    }

    /// Unstyled text such as a log line or the analysis body
    pub fn text(&mut self, text: &str) -> io::Result<()> {
        if self.delivery.is_stream() {
            self.write_now(text)
        } else {
            self.buffer.push(text.to_string());
            Ok(())
        }
    }

    fn write_now(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }

    /// Persist buffered output, creating parent directories as needed.
    ///
    /// Returns the written path for file delivery.
    pub fn finish(mut self) -> io::Result<Option<PathBuf>> {
        let Some(path) = self.delivery.target_path(Local::now()) else {
            self.writer.flush()?;
            return Ok(None);
        };

        ensure_parent(&path)?;
        let mut contents = self.buffer.join("\n");
        contents.push('\n');
        fs::write(&path, contents)?;
        Ok(Some(path))
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Deliver a pod's log through `sink`.
///
/// Stream delivery forwards lines while the container runs. File delivery
/// waits for the pod to terminate, then collects the whole log.
pub async fn deliver_pod_log(
    source: &dyn LogSource,
    namespace: &str,
    pod: &str,
    sink: &mut ResultSink,
) -> Result<PodOutcome> {
    if sink.delivery().is_stream() {
        let (tx, mut rx) = mpsc::channel::<String>(256);
        let forward = async {
            while let Some(line) = rx.recv().await {
                sink.text(&line)?;
            }
            Ok::<(), io::Error>(())
        };
        let (followed, forwarded) = tokio::join!(source.follow_log(namespace, pod, tx), forward);
        followed?;
        forwarded?;
        source.wait_for_completion(namespace, pod).await
    } else {
        let outcome = source.wait_for_completion(namespace, pod).await?;
        let log = source.collect_log(namespace, pod).await?;
        for line in log.lines() {
            sink.text(line)?;
        }
        Ok(outcome)
    }
}
