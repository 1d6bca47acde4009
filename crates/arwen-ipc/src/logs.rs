//! Logging across the process boundary.
//!
//! The child ships every tracing event over the log pipe as a [`LogLine`]; the
//! node re-emits each line into its own subscriber with the original target and
//! level. The node steers the child's filter by writing [`LogProfile`]s to the
//! log-profile pipe.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::callsite::{Callsite, Identifier};
use tracing::field::FieldSet;
use tracing::metadata::Kind;
use tracing::subscriber::Interest;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::bridge::codec::RecordCodec;
use crate::bridge::format::WireFormat;
use crate::bridge::protocol::{LogLine, LogProfile};

/// Lines buffered between the tracing layer and the pipe writer. Events beyond
/// this are dropped rather than blocking the VM.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Filter in effect until the node sends its first profile.
const DEFAULT_CHILD_FILTER: &str = "info";

/// What the pipe writer consumes: lines in log order, and flush markers acked
/// once every line queued before them has been written.
enum ShipItem {
    Line(LogLine),
    Flush(oneshot::Sender<()>),
}

/// Ships tracing events over an mpsc channel as [`LogLine`]s.
pub struct PipeTracingLayer {
    tx: mpsc::Sender<ShipItem>,
}

impl PipeTracingLayer {
    fn new(tx: mpsc::Sender<ShipItem>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for PipeTracingLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let _ = self.tx.try_send(ShipItem::Line(LogLine {
            target: metadata.target().to_string(),
            level: level_name(metadata.level()).to_string(),
            message: visitor.finish(),
        }));
    }
}

/// Collects the message plus any other fields as trailing `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let fields = self.fields.join(" ");
        if self.message.is_empty() {
            fields
        } else {
            format!("{} {}", self.message, fields)
        }
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

fn parse_level(level: &str) -> Level {
    match level {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Handle on the child's log pipe writer.
///
/// Lines are written by a background task. Dropping the runtime cancels it, so
/// the child calls [`ChildLogging::flush`] before it exits.
#[derive(Clone)]
pub struct ChildLogging {
    tx: mpsc::Sender<ShipItem>,
}

impl ChildLogging {
    /// Waits until every line logged before this call is on the pipe. Returns
    /// `false` if that takes longer than `timeout` or the writer is gone.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (ack, written) = oneshot::channel();
        let flushed = tokio::time::timeout(timeout, async {
            self.tx.send(ShipItem::Flush(ack)).await.ok()?;
            written.await.ok()
        })
        .await;
        matches!(flushed, Ok(Some(())))
    }
}

/// Installs the child's global subscriber: a reloadable filter, the pipe layer
/// and, with `ARWEN_LOG_STDERR=1`, a local stderr layer (JSON when
/// `LOG_FORMAT=json`). Spawns the pipe writer and the profile reader, so it must
/// run inside a tokio runtime.
pub fn init_child_tracing<W, R>(
    log: W,
    log_profile: R,
    format: WireFormat,
    max_frame_length: usize,
) -> ChildLogging
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let (filter, handle) = reload::Layer::new(EnvFilter::new(DEFAULT_CHILD_FILTER));
    let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);

    let to_stderr = std::env::var("ARWEN_LOG_STDERR").as_deref() == Ok("1");
    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    let (json_layer, plain_layer) = match (to_stderr, use_json) {
        (false, _) => (None, None),
        (true, true) => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        (true, false) => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(PipeTracingLayer::new(tx.clone()))
        .with(json_layer)
        .with(plain_layer);
    let _ = subscriber.try_init();

    tokio::spawn(ship_log_lines(
        rx,
        FramedWrite::new(log, RecordCodec::new(format, max_frame_length)),
    ));
    tokio::spawn(apply_log_profiles(
        FramedRead::new(log_profile, RecordCodec::new(format, max_frame_length)),
        handle,
    ));
    ChildLogging { tx }
}

async fn ship_log_lines<W>(
    mut rx: mpsc::Receiver<ShipItem>,
    mut writer: FramedWrite<W, RecordCodec<LogLine>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        match item {
            // `send` flushes the underlying writer before it resolves.
            ShipItem::Line(line) => {
                if writer.send(line).await.is_err() {
                    break;
                }
            }
            ShipItem::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn apply_log_profiles<R>(
    mut profiles: FramedRead<R, RecordCodec<LogProfile>>,
    handle: reload::Handle<EnvFilter, Registry>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(Ok(profile)) = profiles.next().await {
        match EnvFilter::try_new(&profile.filter) {
            Ok(filter) => {
                if handle.reload(filter).is_err() {
                    break;
                }
                tracing::debug!(filter = %profile.filter, "log profile applied");
            }
            Err(e) => {
                tracing::warn!(filter = %profile.filter, error = %e, "ignoring invalid log profile");
            }
        }
    }
}

struct ForwardedCallsite;

static FORWARDED_CALLSITE: ForwardedCallsite = ForwardedCallsite;
static FORWARDED_FIELDS: &[&str] = &["message"];
static PLACEHOLDER: Metadata<'static> = Metadata::new(
    "arwen_log",
    "arwen",
    Level::INFO,
    None,
    None,
    None,
    FieldSet::new(FORWARDED_FIELDS, Identifier(&FORWARDED_CALLSITE)),
    Kind::EVENT,
);

impl Callsite for ForwardedCallsite {
    fn set_interest(&self, _: Interest) {}

    fn metadata(&self) -> &Metadata<'_> {
        &PLACEHOLDER
    }
}

/// Re-emits a line received from the child, keeping its target and level.
///
/// Tracing metadata must be `'static`, so each distinct (target, level) pair is
/// leaked once and cached.
pub fn emit_forwarded_log(line: &LogLine) {
    type Cache = Mutex<HashMap<(String, Level), &'static Metadata<'static>>>;
    static CALLSITES: OnceLock<Cache> = OnceLock::new();

    let level = parse_level(&line.level);
    let meta: &'static Metadata<'static> = {
        let Ok(mut map) = CALLSITES.get_or_init(Default::default).lock() else {
            return;
        };
        *map.entry((line.target.clone(), level)).or_insert_with(|| {
            let target: &'static str = Box::leak(line.target.clone().into_boxed_str());
            Box::leak(Box::new(Metadata::new(
                "arwen_log",
                target,
                level,
                None,
                None,
                None,
                FieldSet::new(FORWARDED_FIELDS, Identifier(&FORWARDED_CALLSITE)),
                Kind::EVENT,
            )))
        })
    };

    let message = line.message.as_str();
    tracing::dispatcher::get_default(|dispatch| {
        if dispatch.enabled(meta) {
            let fields = meta.fields();
            if let Some(field) = fields.field("message") {
                let values = [(&field, Some(&message as &dyn tracing::Value))];
                dispatch.event(&tracing::Event::new(meta, &fields.value_set(&values)));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(f: impl FnOnce()) -> Vec<LogLine> {
        let (tx, mut rx) = mpsc::channel(16);
        let subscriber = tracing_subscriber::registry().with(PipeTracingLayer::new(tx));
        tracing::subscriber::with_default(subscriber, f);
        let mut lines = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let ShipItem::Line(line) = item {
                lines.push(line);
            }
        }
        lines
    }

    #[test]
    fn layer_keeps_target_level_and_fields() {
        let lines = capture(|| {
            tracing::warn!(target: "arwen::host", gas = 42, function = "increment", "out of gas");
        });
        assert_eq!(
            lines,
            vec![LogLine {
                target: "arwen::host".to_string(),
                level: "warn".to_string(),
                message: "out of gas gas=42 function=increment".to_string(),
            }]
        );
    }

    #[test]
    fn forwarded_lines_reappear_unchanged() {
        let line = LogLine {
            target: "arwen::contracts".to_string(),
            level: "debug".to_string(),
            message: "storage updated".to_string(),
        };
        let lines = capture(|| {
            emit_forwarded_log(&line);
            emit_forwarded_log(&line);
        });
        assert_eq!(lines, vec![line.clone(), line]);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            assert_eq!(parse_level(level_name(&level)), level);
        }
    }

    #[tokio::test]
    async fn shipped_lines_are_length_delimited_records() {
        let (tx, rx) = mpsc::channel(4);
        let (writer, reader) = tokio::io::duplex(4096);
        tokio::spawn(ship_log_lines(
            rx,
            FramedWrite::new(writer, RecordCodec::new(WireFormat::Postcard, 4096)),
        ));
        let line = LogLine {
            target: "arwen".to_string(),
            level: "info".to_string(),
            message: "ready".to_string(),
        };
        tx.send(ShipItem::Line(line.clone())).await.unwrap();
        drop(tx);

        let mut lines = FramedRead::new(reader, RecordCodec::<LogLine>::new(WireFormat::Postcard, 4096));
        assert_eq!(lines.next().await.unwrap().unwrap(), line);
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn flush_waits_for_queued_lines() {
        let (tx, rx) = mpsc::channel(16);
        let (writer, reader) = tokio::io::duplex(4096);
        tokio::spawn(ship_log_lines(
            rx,
            FramedWrite::new(writer, RecordCodec::new(WireFormat::Json, 4096)),
        ));
        let logging = ChildLogging { tx: tx.clone() };

        let subscriber = tracing_subscriber::registry().with(PipeTracingLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "arwen_ipc::child", "arwen stopped");
            tracing::error!(target: "arwen_ipc::arwen_part", "critical error, leaving loop");
        });
        assert!(logging.flush(Duration::from_secs(1)).await);

        // Everything is already in the pipe: reading never waits on the writer.
        let mut lines = FramedRead::new(reader, RecordCodec::<LogLine>::new(WireFormat::Json, 4096));
        let first = lines.next().await.unwrap().unwrap();
        let second = lines.next().await.unwrap().unwrap();
        assert_eq!(first.message, "arwen stopped");
        assert_eq!(second.level, "error");
        assert_eq!(second.message, "critical error, leaving loop");
    }

    #[tokio::test]
    async fn flush_gives_up_without_a_writer() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let logging = ChildLogging { tx };
        assert!(!logging.flush(Duration::from_millis(50)).await);
    }
}
