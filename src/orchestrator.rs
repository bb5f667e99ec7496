//! Orchestrator: the poll, compare, notify loop.
//!
//! Each cycle:
//! 1. Fetches statuses changed since the cursor
//! 2. Validates the response shape
//! 3. Parses the first submission against the last emitted verdict
//! 4. Sends a message when the verdict changed
//! 5. On any failure, logs it and notifies once per distinct error
//!
//! Every cycle ends with the same fixed sleep. The stop flag is checked
//! before each cycle, after each poll returns and throughout the sleep.
//! Nothing is sent once it is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::api::ReviewApi;
use crate::dedup::ErrorDeduplicator;
use crate::error::{RelayError, Result};
use crate::notify::Notifier;
use crate::status::{Verdict, parse_status};
use crate::validate::{check_response, current_date};

/// Granularity of the interruptible sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// `homeworks` was empty.
    NoHomework,
    /// The first submission still has the last emitted verdict.
    Unchanged,
    /// A status change was sent (or attempted).
    Notified { message: String, delivered: bool },
    /// The cycle failed; `notified` is true only when a failure message
    /// was delivered.
    Failed { error: RelayError, notified: bool },
    /// The stop flag was raised while polling; nothing was sent.
    Interrupted,
}

/// Why the loop returned.
#[derive(Debug, PartialEq)]
pub enum OrchestratorResult {
    /// The stop flag was raised (Ctrl-C or SIGTERM).
    Interrupted,
}

enum Polled {
    NoHomework,
    Unchanged,
    Changed(String),
}

pub struct Orchestrator {
    api: Box<dyn ReviewApi>,
    notifier: Notifier,
    retry_period: Duration,
    cursor: i64,
    last_verdict: Option<Verdict>,
    errors: ErrorDeduplicator,
}

impl Orchestrator {
    pub fn new(
        api: Box<dyn ReviewApi>,
        notifier: Notifier,
        start_cursor: i64,
        retry_period: Duration,
    ) -> Self {
        Self {
            api,
            notifier,
            retry_period,
            cursor: start_cursor,
            last_verdict: None,
            errors: ErrorDeduplicator::new(),
        }
    }

    /// Lower bound of the next poll window.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        self.last_verdict
    }

    /// The cursor moves to the server's `current_date` after any fully
    /// successful poll, whatever the verdict.
    fn poll(&mut self) -> Result<Polled> {
        let response = self.api.homework_statuses(self.cursor)?;
        let homeworks = check_response(&response)?;

        let polled = match homeworks.first() {
            None => Polled::NoHomework,
            Some(record) => match parse_status(record, &mut self.last_verdict)? {
                Some(message) => Polled::Changed(message),
                None => Polled::Unchanged,
            },
        };

        if let Some(date) = current_date(&response) {
            debug!(from = self.cursor, to = date, "advancing poll cursor");
            self.cursor = date;
        }

        Ok(polled)
    }

    /// Run one cycle without sleeping. Never fails; failures are reported
    /// through the returned outcome and the notifier.
    pub fn run_cycle(&mut self, stop: &AtomicBool) -> CycleOutcome {
        let polled = self.poll();
        if stop.load(Ordering::Relaxed) {
            debug!(ok = polled.is_ok(), "stop raised during poll, skipping notifications");
            return CycleOutcome::Interrupted;
        }

        match polled {
            Ok(Polled::NoHomework) => {
                debug!("no homework under review");
                CycleOutcome::NoHomework
            }
            Ok(Polled::Unchanged) => {
                debug!("no new status in API response");
                CycleOutcome::Unchanged
            }
            Ok(Polled::Changed(message)) => {
                let delivered = self.notifier.send(&message);
                CycleOutcome::Notified { message, delivered }
            }
            Err(e) => {
                let notified = self.report_failure(&e);
                CycleOutcome::Failed { error: e, notified }
            }
        }
    }

    fn report_failure(&mut self, e: &RelayError) -> bool {
        error!(kind = e.kind(), error = %e, "poll cycle failed");
        if !self.errors.should_notify(e) {
            debug!(kind = e.kind(), "repeated failure, notification suppressed");
            return false;
        }
        self.notifier.send(&format!("Program failure: {e}"))
    }

    /// Poll until `stop` is raised.
    pub fn run(&mut self, stop: &AtomicBool) -> OrchestratorResult {
        info!(
            cursor = self.cursor,
            retry_period_secs = self.retry_period.as_secs(),
            "orchestrator loop starting"
        );

        loop {
            if stop.load(Ordering::Relaxed) {
                info!("stopped by signal");
                return OrchestratorResult::Interrupted;
            }

            let outcome = self.run_cycle(stop);
            debug!(outcome = ?outcome, cursor = self.cursor, "cycle finished");
            if outcome == CycleOutcome::Interrupted {
                info!("stopped by signal");
                return OrchestratorResult::Interrupted;
            }

            if !sleep_unless_stopped(self.retry_period, stop) {
                info!("stopped by signal");
                return OrchestratorResult::Interrupted;
            }
        }
    }
}

/// Sleep for `period`, waking early if `stop` is raised.
///
/// Returns false when interrupted.
fn sleep_unless_stopped(period: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + period;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::RecordingMessenger;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Sent = Arc<Mutex<Vec<(String, String)>>>;

    /// Review API that replays scripted responses and records each cursor.
    struct ScriptedApi {
        replies: Mutex<VecDeque<Result<Value>>>,
        cursors: Arc<Mutex<Vec<i64>>>,
        stop_when_drained: Option<Arc<AtomicBool>>,
    }

    impl ReviewApi for ScriptedApi {
        fn homework_statuses(&self, from_date: i64) -> Result<Value> {
            self.cursors.lock().unwrap().push(from_date);
            let mut replies = self.replies.lock().unwrap();
            let reply = replies
                .pop_front()
                .unwrap_or_else(|| Err(RelayError::InterceptedRequest("script drained".into())));
            if replies.is_empty() {
                if let Some(stop) = &self.stop_when_drained {
                    stop.store(true, Ordering::Relaxed);
                }
            }
            reply
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        sent: Sent,
        cursors: Arc<Mutex<Vec<i64>>>,
        stop: Arc<AtomicBool>,
    }

    fn harness(replies: Vec<Result<Value>>) -> Harness {
        harness_with(replies, None, None)
    }

    fn harness_with(
        replies: Vec<Result<Value>>,
        stop: Option<Arc<AtomicBool>>,
        delivery_failure: Option<&str>,
    ) -> Harness {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let api = ScriptedApi {
            replies: Mutex::new(replies.into()),
            cursors: cursors.clone(),
            stop_when_drained: stop.clone(),
        };
        let (mut messenger, sent) = RecordingMessenger::new();
        messenger.fail_with = delivery_failure.map(str::to_string);
        let notifier = Notifier::new(Box::new(messenger), "424242");
        Harness {
            orchestrator: Orchestrator::new(
                Box::new(api),
                notifier,
                500,
                Duration::from_millis(1),
            ),
            sent,
            cursors,
            stop: stop.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    fn texts(sent: &Sent) -> Vec<String> {
        sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    #[test]
    fn reviewing_status_is_notified_and_cursor_advances() {
        let mut h = harness(vec![Ok(json!({
            "homeworks": [{"homework_name": "proj1", "status": "reviewing"}],
            "current_date": 1000
        }))]);

        let outcome = h.orchestrator.run_cycle(&h.stop);

        let expected = "Status changed for submission \"proj1\". Work has been taken up for review by the reviewer.";
        assert_eq!(
            outcome,
            CycleOutcome::Notified {
                message: expected.to_string(),
                delivered: true,
            }
        );
        assert_eq!(texts(&h.sent), vec![expected.to_string()]);
        assert_eq!(h.orchestrator.cursor(), 1000);
        assert_eq!(*h.cursors.lock().unwrap(), vec![500]);
    }

    #[test]
    fn empty_homeworks_sends_nothing() {
        let mut h = harness(vec![Ok(json!({"homeworks": [], "current_date": 1000}))]);

        assert_eq!(h.orchestrator.run_cycle(&h.stop), CycleOutcome::NoHomework);
        assert!(h.sent.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.cursor(), 1000);
    }

    #[test]
    fn unchanged_status_is_not_renotified() {
        let approved = || {
            Ok(json!({
                "homeworks": [{"homework_name": "proj1", "status": "approved"}],
                "current_date": 1000
            }))
        };
        let mut h = harness(vec![approved(), approved()]);

        assert!(matches!(h.orchestrator.run_cycle(&h.stop), CycleOutcome::Notified { .. }));
        assert_eq!(h.orchestrator.run_cycle(&h.stop), CycleOutcome::Unchanged);
        assert_eq!(h.sent.lock().unwrap().len(), 1);
        assert_eq!(h.orchestrator.last_verdict(), Some(Verdict::Approved));
    }

    #[test]
    fn server_error_sends_one_failure_notification() {
        let mut h = harness(vec![Err(crate::api::status_failure(503))]);

        let outcome = h.orchestrator.run_cycle(&h.stop);

        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                error: RelayError::InterceptedRequest(
                    "endpoint unavailable, API response code: 503".to_string()
                ),
                notified: true,
            }
        );
        assert_eq!(
            texts(&h.sent),
            vec![
                "Program failure: request to review API failed: endpoint unavailable, API response code: 503"
                    .to_string()
            ]
        );
        assert_eq!(h.orchestrator.cursor(), 500);
    }

    /// Log sink shared between the test and a scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn repeated_failure_is_notified_once() {
        let mut h = harness(vec![
            Ok(json!({"current_date": 1000})),
            Ok(json!({"current_date": 1000})),
        ]);
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        let (first, second) = tracing::subscriber::with_default(subscriber, || {
            (
                h.orchestrator.run_cycle(&h.stop),
                h.orchestrator.run_cycle(&h.stop),
            )
        });

        assert!(matches!(first, CycleOutcome::Failed { notified: true, .. }));
        assert!(matches!(second, CycleOutcome::Failed { notified: false, .. }));
        assert_eq!(h.sent.lock().unwrap().len(), 1);
        assert_eq!(h.cursors.lock().unwrap().len(), 2);

        let lines = log.text();
        assert_eq!(lines.matches("poll cycle failed").count(), 2, "{lines}");
        assert_eq!(
            lines.matches("repeated failure, notification suppressed").count(),
            1,
            "{lines}"
        );
    }

    #[test]
    fn undelivered_failure_is_not_reported_as_notified() {
        let mut h = harness_with(
            vec![Err(crate::api::status_failure(502))],
            None,
            Some("chat not found"),
        );

        let outcome = h.orchestrator.run_cycle(&h.stop);

        assert!(matches!(outcome, CycleOutcome::Failed { notified: false, .. }));
        assert_eq!(h.sent.lock().unwrap().len(), 1, "delivery was attempted once");
        assert_eq!(
            h.orchestrator.errors.last(),
            Some("request to review API failed: endpoint unavailable, API response code: 502")
        );
    }

    #[test]
    fn missing_homeworks_never_sends_status_message() {
        let mut h = harness(vec![Ok(json!({"current_date": 1000}))]);

        let outcome = h.orchestrator.run_cycle(&h.stop);

        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: RelayError::MissingKey(_),
                ..
            }
        ));
        let sent = texts(&h.sent);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Program failure: "));
        assert_eq!(h.orchestrator.cursor(), 500, "cursor must not move on failure");
    }

    #[test]
    fn unknown_status_does_not_touch_verdict_or_cursor() {
        let mut h = harness(vec![
            Ok(json!({
                "homeworks": [{"homework_name": "proj1", "status": "reviewing"}],
                "current_date": 1000
            })),
            Ok(json!({
                "homeworks": [{"homework_name": "proj1", "status": "lost"}],
                "current_date": 2000
            })),
        ]);

        h.orchestrator.run_cycle(&h.stop);
        let outcome = h.orchestrator.run_cycle(&h.stop);

        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: RelayError::UnknownStatus(_),
                notified: true,
            }
        ));
        assert_eq!(h.orchestrator.last_verdict(), Some(Verdict::Reviewing));
        assert_eq!(h.orchestrator.cursor(), 1000);
        assert_eq!(*h.cursors.lock().unwrap(), vec![500, 1000]);
    }

    #[test]
    fn delivery_failure_does_not_fail_cycle() {
        let mut h = harness_with(
            vec![Ok(json!({
                "homeworks": [{"homework_name": "proj1", "status": "rejected"}],
                "current_date": 1000
            }))],
            None,
            Some("chat not found"),
        );

        let outcome = h.orchestrator.run_cycle(&h.stop);

        assert!(matches!(outcome, CycleOutcome::Notified { delivered: false, .. }));
        assert_eq!(h.orchestrator.cursor(), 1000);
        assert_eq!(h.orchestrator.last_verdict(), Some(Verdict::Rejected));
    }

    #[test]
    fn run_returns_immediately_when_already_stopped() {
        let mut h = harness(vec![]);
        let stop = AtomicBool::new(true);

        assert_eq!(h.orchestrator.run(&stop), OrchestratorResult::Interrupted);
        assert!(h.cursors.lock().unwrap().is_empty());
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn run_polls_until_interrupted() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut h = harness_with(
            vec![
                Ok(json!({
                    "homeworks": [{"homework_name": "proj1", "status": "reviewing"}],
                    "current_date": 1000
                })),
                Ok(json!({"homeworks": [], "current_date": 2000})),
                Ok(json!({
                    "homeworks": [{"homework_name": "proj1", "status": "approved"}],
                    "current_date": 3000
                })),
            ],
            Some(stop.clone()),
            None,
        );

        assert_eq!(h.orchestrator.run(&stop), OrchestratorResult::Interrupted);
        assert_eq!(*h.cursors.lock().unwrap(), vec![500, 1000, 2000]);
        // The approval arrived after the stop flag went up and is not sent.
        assert_eq!(h.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn interrupt_during_failed_poll_sends_nothing() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut h = harness_with(
            vec![Err(RelayError::InterceptedRequest("connection reset".into()))],
            Some(stop.clone()),
            None,
        );

        assert_eq!(h.orchestrator.run(&stop), OrchestratorResult::Interrupted);
        assert_eq!(*h.cursors.lock().unwrap(), vec![500]);
        assert!(h.sent.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.errors.last(), None);
    }

    #[test]
    fn cycle_reports_interrupt_instead_of_status_change() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut h = harness_with(
            vec![Ok(json!({
                "homeworks": [{"homework_name": "proj1", "status": "approved"}],
                "current_date": 1000
            }))],
            Some(stop.clone()),
            None,
        );

        assert_eq!(h.orchestrator.run_cycle(&h.stop), CycleOutcome::Interrupted);
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn sleep_wakes_on_stop() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(600), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_runs_to_deadline() {
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        assert!(sleep_unless_stopped(Duration::from_millis(20), &stop));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
