//! Publish side: the backpressure-aware send loop
//!
//! Rows are encoded and offered one at a time, in order. Every
//! [`OfferResult`] has a fixed reaction:
//!
//! | Outcome | Reaction |
//! |---|---|
//! | `Success` | count it, wait `pace`, next row |
//! | `BackPressured`, `AdminAction` | back off, offer the same row again |
//! | `NotConnected` | wait until connected, offer the same row again |
//! | `Closed` | stop; the session is over |
//!
//! A row that fails to encode is skipped and listed in the report. No row
//! is ever skipped because the transport was temporarily unable to take it.

use crate::cancel::{Backoff, CancelToken};
use crate::codec::{self, CodecError};
use crate::error::{RelayError, Result};
use crate::transport::{OfferResult, Publication};
use crate::types::Row;
use std::fmt;
use std::time::{Duration, Instant};

/// Send loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOptions {
    /// Pause after each row that was sent
    pub pace: Duration,
    /// Retry backoff bounds
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Only publish the first `max_rows` rows
    pub max_rows: Option<usize>,
    /// Keep the publication open this long after the last row
    pub linger: Duration,
    /// Give up on a subscriber that does not show up within this long
    pub connect_timeout: Option<Duration>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            pace: Duration::from_millis(1),
            backoff_min: Duration::from_millis(1),
            backoff_max: Duration::from_millis(100),
            max_rows: None,
            linger: Duration::ZERO,
            connect_timeout: None,
        }
    }
}

/// How a publish session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every row was sent or skipped
    Completed,
    /// Stopped by the cancel token
    Cancelled,
    /// The publication reported `Closed`
    ChannelClosed { channel: String, stream_id: i32 },
    /// No subscriber connected within the connect timeout
    ConnectTimedOut { channel: String, stream_id: i32 },
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::Cancelled => write!(f, "cancelled"),
            SessionOutcome::ChannelClosed { channel, stream_id } => {
                write!(f, "channel closed ({} stream {})", channel, stream_id)
            }
            SessionOutcome::ConnectTimedOut { channel, stream_id } => {
                write!(f, "no subscriber on {} stream {}", channel, stream_id)
            }
        }
    }
}

/// A row that could not be encoded
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    /// Zero-based position in the input
    pub row: usize,
    pub error: CodecError,
}

/// Result of a publish session
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    /// Rows delivered to the transport
    pub sent: usize,
    /// Rows that failed to encode
    pub skipped: Vec<SkippedRow>,
    /// Rows never attempted
    pub remaining: usize,
    pub back_pressured: u64,
    pub admin_actions: u64,
    pub not_connected_waits: u64,
    pub outcome: SessionOutcome,
}

impl PublishReport {
    fn new(total: usize) -> Self {
        Self {
            sent: 0,
            skipped: Vec::new(),
            remaining: total,
            back_pressured: 0,
            admin_actions: 0,
            not_connected_waits: 0,
            outcome: SessionOutcome::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == SessionOutcome::Completed
    }

    /// Turn a fatal outcome into an error, keep the report otherwise
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            SessionOutcome::Completed | SessionOutcome::Cancelled => Ok(self),
            SessionOutcome::ChannelClosed { channel, stream_id } => Err(RelayError::ChannelClosed {
                channel: channel.clone(),
                stream_id: *stream_id,
            }),
            SessionOutcome::ConnectTimedOut { channel, stream_id } => Err(RelayError::transport(
                channel.clone(),
                *stream_id,
                "no subscriber connected before the timeout",
            )),
        }
    }
}

enum Wait {
    Connected,
    Cancelled,
    TimedOut,
}

enum Delivery {
    Sent,
    Cancelled,
    Closed,
    TimedOut,
}

/// Drives one publish session over a publication
struct SendLoop<'a, P: Publication + ?Sized> {
    publication: &'a mut P,
    options: &'a PublishOptions,
    cancel: &'a CancelToken,
    backoff: Backoff,
    report: PublishReport,
}

impl<P: Publication + ?Sized> SendLoop<'_, P> {
    /// Block until a subscriber is connected, backing off between checks
    fn wait_for_connection(&mut self) -> Wait {
        let started = Instant::now();
        self.backoff.reset();

        loop {
            if self.cancel.is_cancelled() {
                return Wait::Cancelled;
            }
            if self.publication.is_connected() {
                self.backoff.reset();
                return Wait::Connected;
            }
            if self
                .options
                .connect_timeout
                .is_some_and(|timeout| started.elapsed() >= timeout)
            {
                return Wait::TimedOut;
            }
            if self.backoff.wait(self.cancel) {
                return Wait::Cancelled;
            }
        }
    }

    /// Offer one message until it is taken or the session ends
    fn deliver(&mut self, row: usize, payload: &[u8]) -> Delivery {
        loop {
            if self.cancel.is_cancelled() {
                return Delivery::Cancelled;
            }

            match self.publication.offer(payload) {
                OfferResult::Success => {
                    self.backoff.reset();
                    return Delivery::Sent;
                }
                OfferResult::BackPressured => {
                    self.report.back_pressured += 1;
                    tracing::trace!(row, "Back pressured, retrying");
                    if self.backoff.wait(self.cancel) {
                        return Delivery::Cancelled;
                    }
                }
                OfferResult::AdminAction => {
                    self.report.admin_actions += 1;
                    tracing::trace!(row, "Admin action, retrying");
                    if self.backoff.wait(self.cancel) {
                        return Delivery::Cancelled;
                    }
                }
                OfferResult::NotConnected => {
                    self.report.not_connected_waits += 1;
                    tracing::warn!(row, "Subscriber not connected, waiting");
                    match self.wait_for_connection() {
                        Wait::Connected => {
                            tracing::info!(row, "Subscriber connected, resuming");
                        }
                        Wait::Cancelled => return Delivery::Cancelled,
                        Wait::TimedOut => return Delivery::TimedOut,
                    }
                }
                OfferResult::Closed => return Delivery::Closed,
            }
        }
    }

    fn closed_outcome(&self) -> SessionOutcome {
        SessionOutcome::ChannelClosed {
            channel: self.publication.channel(),
            stream_id: self.publication.stream_id(),
        }
    }

    fn timed_out_outcome(&self) -> SessionOutcome {
        SessionOutcome::ConnectTimedOut {
            channel: self.publication.channel(),
            stream_id: self.publication.stream_id(),
        }
    }

    fn run(mut self, rows: &[Row]) -> PublishReport {
        match self.wait_for_connection() {
            Wait::Connected => {
                tracing::info!("Subscriber connected");
            }
            Wait::Cancelled => {
                self.report.outcome = SessionOutcome::Cancelled;
                return self.report;
            }
            Wait::TimedOut => {
                self.report.outcome = self.timed_out_outcome();
                return self.report;
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.report.outcome = SessionOutcome::Cancelled;
                break;
            }

            let frame = match codec::encode(row) {
                Ok(frame) => frame,
                Err(error) => {
                    tracing::warn!(row = i, "Skipping row: {}", error);
                    self.report.skipped.push(SkippedRow { row: i, error });
                    self.report.remaining -= 1;
                    continue;
                }
            };

            match self.deliver(i, frame.as_bytes()) {
                Delivery::Sent => {
                    self.report.sent += 1;
                    self.report.remaining -= 1;
                    if self.report.sent % 100 == 0 {
                        tracing::debug!(sent = self.report.sent, "Progress");
                    }
                }
                Delivery::Cancelled => {
                    self.report.outcome = SessionOutcome::Cancelled;
                    break;
                }
                Delivery::Closed => {
                    self.report.outcome = self.closed_outcome();
                    break;
                }
                Delivery::TimedOut => {
                    self.report.outcome = self.timed_out_outcome();
                    break;
                }
            }

            if self.cancel.sleep(self.options.pace) && self.report.remaining > 0 {
                self.report.outcome = SessionOutcome::Cancelled;
                break;
            }
        }

        self.report
    }
}

/// Publish `rows` over `publication` and close it
///
/// Waits for a subscriber before the first row. On completion the
/// publication lingers for `options.linger` (cut short by cancellation)
/// and is then closed whatever the outcome.
pub fn run<P: Publication + ?Sized>(
    rows: &[Row],
    publication: &mut P,
    options: &PublishOptions,
    cancel: &CancelToken,
) -> PublishReport {
    let limit = options.max_rows.map_or(rows.len(), |max| max.min(rows.len()));
    let rows = &rows[..limit];

    let channel = publication.channel();
    let stream_id = publication.stream_id();
    tracing::info!(
        channel = %channel,
        stream_id,
        rows = rows.len(),
        "Publishing, waiting for a subscriber"
    );

    let report = SendLoop {
        publication: &mut *publication,
        options,
        cancel,
        backoff: Backoff::new(options.backoff_min, options.backoff_max),
        report: PublishReport::new(rows.len()),
    }
    .run(rows);

    if report.is_completed() && !options.linger.is_zero() {
        tracing::info!("Lingering for {:?}", options.linger);
        cancel.sleep(options.linger);
    }
    publication.close();

    tracing::info!(
        channel = %channel,
        stream_id,
        sent = report.sent,
        skipped = report.skipped.len(),
        remaining = report.remaining,
        back_pressured = report.back_pressured,
        "Publish session {}",
        report.outcome
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{loopback, Subscription};

    fn row(date: &str, close: &str) -> Row {
        Row::new()
            .with("Date", date)
            .with("Close/Last", close)
            .with("Volume", "100")
            .with("Open", "$1.00")
            .with("High", "$2.00")
            .with("Low", "$0.50")
    }

    fn fast() -> PublishOptions {
        PublishOptions {
            pace: Duration::ZERO,
            backoff_min: Duration::from_micros(100),
            backoff_max: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Publication answering offers from a script, then `Success`
    struct Scripted {
        script: Vec<OfferResult>,
        offers: Vec<Vec<u8>>,
        connected: bool,
        closed: bool,
    }

    impl Scripted {
        fn new(script: Vec<OfferResult>) -> Self {
            Self {
                script,
                offers: Vec::new(),
                connected: true,
                closed: false,
            }
        }
    }

    impl Publication for Scripted {
        fn offer(&mut self, payload: &[u8]) -> OfferResult {
            self.offers.push(payload.to_vec());
            if self.script.is_empty() {
                OfferResult::Success
            } else {
                self.script.remove(0)
            }
        }

        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn channel(&self) -> String {
            "scripted".to_string()
        }

        fn stream_id(&self) -> i32 {
            7
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_all_rows_sent() {
        let rows = vec![row("1", "$1"), row("2", "$2"), row("3", "$3")];
        let mut publication = Scripted::new(vec![]);
        let report = run(&rows, &mut publication, &fast(), &CancelToken::new());

        assert!(report.is_completed());
        assert_eq!(report.sent, 3);
        assert_eq!(report.remaining, 0);
        assert!(publication.closed);
        assert_eq!(publication.offers[1], b"2,2,100,1,2,0.5");
    }

    #[test]
    fn test_back_pressure_retries_same_row() {
        let rows = vec![row("1", "$1"), row("2", "$2")];
        let mut publication =
            Scripted::new(vec![OfferResult::BackPressured, OfferResult::BackPressured]);
        let report = run(&rows, &mut publication, &fast(), &CancelToken::new());

        assert_eq!(report.sent, 2);
        assert_eq!(report.back_pressured, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(publication.offers.len(), 4);
        assert_eq!(publication.offers[0], publication.offers[2]);
    }

    #[test]
    fn test_admin_action_retries_same_row() {
        let rows = vec![row("1", "$1")];
        let mut publication = Scripted::new(vec![OfferResult::AdminAction]);
        let report = run(&rows, &mut publication, &fast(), &CancelToken::new());

        assert_eq!(report.sent, 1);
        assert_eq!(report.admin_actions, 1);
        assert_eq!(publication.offers.len(), 2);
    }

    #[test]
    fn test_closed_aborts_with_remaining() {
        let rows = vec![row("1", "$1"), row("2", "$2"), row("3", "$3")];
        let mut publication = Scripted::new(vec![OfferResult::Success, OfferResult::Closed]);
        let report = run(&rows, &mut publication, &fast(), &CancelToken::new());

        assert_eq!(report.sent, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(publication.offers.len(), 2);
        assert_eq!(
            report.outcome,
            SessionOutcome::ChannelClosed {
                channel: "scripted".to_string(),
                stream_id: 7
            }
        );
        assert!(matches!(
            report.into_result(),
            Err(RelayError::ChannelClosed { stream_id: 7, .. })
        ));
    }

    #[test]
    fn test_encode_failure_skips_row() {
        let rows = vec![
            row("1", "$1"),
            Row::new().with("Date", "2").with("Close", "1"),
            row("3", "$3"),
        ];
        let mut publication = Scripted::new(vec![]);
        let report = run(&rows, &mut publication, &fast(), &CancelToken::new());

        assert!(report.is_completed());
        assert_eq!(report.sent, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].row, 1);
        assert!(matches!(
            report.skipped[0].error,
            CodecError::MissingField { .. }
        ));
    }

    #[test]
    fn test_max_rows_limits_session() {
        let rows = vec![row("1", "$1"), row("2", "$2"), row("3", "$3")];
        let mut publication = Scripted::new(vec![]);
        let options = PublishOptions {
            max_rows: Some(2),
            ..fast()
        };
        let report = run(&rows, &mut publication, &options, &CancelToken::new());

        assert!(report.is_completed());
        assert_eq!(report.sent, 2);
        assert_eq!(publication.offers.len(), 2);
    }

    #[test]
    fn test_cancelled_while_waiting_for_subscriber() {
        let rows = vec![row("1", "$1")];
        let mut publication = Scripted::new(vec![]);
        publication.connected = false;

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run(&rows, &mut publication, &fast(), &cancel);

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(report.remaining, 1);
        assert!(publication.offers.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_connect_timeout() {
        let rows = vec![row("1", "$1")];
        let mut publication = Scripted::new(vec![]);
        publication.connected = false;
        let options = PublishOptions {
            connect_timeout: Some(Duration::from_millis(10)),
            ..fast()
        };

        let report = run(&rows, &mut publication, &options, &CancelToken::new());
        assert!(matches!(report.outcome, SessionOutcome::ConnectTimedOut { .. }));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_loopback_back_pressure_does_not_lose_rows() {
        let rows: Vec<Row> = (0..20).map(|i| row(&i.to_string(), "$1")).collect();
        let (mut publication, mut subscription) = loopback::channel(1, 2, 1024);

        let cancel = CancelToken::new();
        let consumer = std::thread::spawn(move || {
            let mut received = Vec::new();
            while received.len() < 20 {
                subscription
                    .poll(
                        &mut |f| received.push(String::from_utf8_lossy(f.bytes()).to_string()),
                        1,
                    )
                    .unwrap();
                std::thread::sleep(Duration::from_micros(200));
            }
            received
        });

        let report = run(&rows, &mut publication, &fast(), &cancel);
        let received = consumer.join().unwrap();

        assert!(report.is_completed());
        assert_eq!(report.sent, 20);
        assert!(report.back_pressured > 0);
        for (i, line) in received.iter().enumerate() {
            assert!(line.starts_with(&format!("{},", i)));
        }
    }
}
