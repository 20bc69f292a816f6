//! # Test Session Controller
//!
//! Runs test cases one at a time over an exclusively owned [`Transport`]:
//! send a frame, wait for the response carrying the same sequence id, classify
//! it, and retry on timeout. Per-case problems become a [`Status`]; only a lost
//! link or a cancellation ends the session early.
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Validating -> Done
//!                        |   ^  (stale id)
//!                        |---'
//!                        |-> timeout, retries left -> Sending
//!                        |-> timeout, exhausted    -> Done (TIMEOUT)
//!                        |-> malformed             -> Done (ERROR)
//!                        '-> link lost             -> SessionAborted
//! ```

use crate::aggregator::{AbortReason, Aggregator, SessionReport};
use crate::codec::{Frame, FrameBuffer, ResponseRecord};
use crate::error::{FrameError, SessionError, TransportError};
use crate::model::{Status, TestCase, TestOutcome};
use crate::transport::Transport;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Policy knobs that apply to every case in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Sleep `n * retry_backoff` before the n-th retry.
    pub retry_backoff: Duration,
    /// Retry malformed responses like timeouts instead of failing with ERROR.
    pub retry_malformed: bool,
    /// Longest single blocking read, so cancellation is noticed quickly.
    pub abort_poll_interval: Duration,
    /// Pause before the first case, for devices that reset when the port opens.
    pub settle_time: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::ZERO,
            retry_malformed: false,
            abort_poll_interval: Duration::from_millis(50),
            settle_time: Duration::ZERO,
        }
    }
}

/// Cloneable flag that asks a running session to stop.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Sending,
    AwaitingResponse,
    Validating,
    Done,
    SessionAborted,
}

// How a single wait for a response ended.
#[derive(Debug)]
enum Awaited {
    Matched(ResponseRecord),
    TimedOut,
    Malformed(FrameError),
}

pub struct Controller<T: Transport> {
    transport: T,
    config: ControllerConfig,
    abort: AbortHandle,
    rx: FrameBuffer,
    next_sequence_id: u32,
    state: State,
    settled: bool,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ControllerConfig::default())
    }

    pub fn with_config(transport: T, config: ControllerConfig) -> Self {
        Self {
            transport,
            config,
            abort: AbortHandle::new(),
            rx: FrameBuffer::new(),
            next_sequence_id: 1,
            state: State::Idle,
            settled: false,
        }
    }

    /// A handle other threads can use to cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gives the transport back without closing it.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Closes the transport and consumes the controller.
    pub fn close(mut self) {
        self.transport.close();
    }

    fn take_sequence_id(&mut self) -> u32 {
        let id = self.next_sequence_id;
        self.next_sequence_id = self.next_sequence_id.wrapping_add(1);
        id
    }

    fn link_lost(&mut self, err: TransportError) -> SessionError {
        error!("Link lost: {}", err);
        self.state = State::SessionAborted;
        SessionError::LinkLost(err)
    }

    fn check_cancelled(&mut self) -> Result<(), SessionError> {
        if self.abort.is_aborted() {
            self.state = State::SessionAborted;
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    // Sleeps for `duration` in poll-interval slices, stopping early when the
    // session is cancelled.
    fn pause(&mut self, duration: Duration) -> Result<(), SessionError> {
        let until = Instant::now() + duration;
        let slice = self.config.abort_poll_interval.max(Duration::from_millis(1));
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep((until - now).min(slice));
        }
    }

    /// Runs one case to its terminal outcome.
    ///
    /// Timeouts and bad frames are reported through the outcome's status.
    /// `Err` means the session can not continue.
    pub fn run_case(&mut self, case: &TestCase) -> Result<TestOutcome, SessionError> {
        self.check_cancelled()?;
        if self.state == State::SessionAborted {
            return Err(SessionError::LinkLost(TransportError::Closed));
        }
        self.rx.clear();

        let mut attempts: u32 = 0;
        loop {
            if attempts > 0 && !self.config.retry_backoff.is_zero() {
                self.pause(self.config.retry_backoff * attempts)?;
            }
            attempts += 1;

            self.state = State::Sending;
            let sequence_id = self.take_sequence_id();
            let frame = Frame::new(sequence_id, case.sent_value);
            debug!(
                "Case '{}' attempt {} seq={} sent={}",
                case.id, attempts, sequence_id, case.sent_value
            );
            if let Err(e) = self.transport.write(&frame.encode()) {
                return Err(self.link_lost(e));
            }

            self.state = State::AwaitingResponse;
            let deadline = Instant::now() + case.timeout;
            let retries_left = attempts <= case.max_retries;

            match self.await_response(sequence_id, deadline)? {
                Awaited::Matched(record) => {
                    self.state = State::Validating;
                    let status = case.classify(record.received_value);
                    let outcome =
                        TestOutcome::new(case, Some(record.received_value), status, attempts);
                    info!(
                        "{} '{}': expected {} received {} ({} attempt(s))",
                        status, case.id, case.expected_value, record.received_value, attempts
                    );
                    self.state = State::Done;
                    return Ok(outcome);
                }
                Awaited::TimedOut if retries_left => {
                    warn!(
                        "Case '{}' seq={} timed out after {:?}, retrying",
                        case.id, sequence_id, case.timeout
                    );
                    self.rx.clear();
                }
                Awaited::TimedOut => {
                    info!("{} '{}' after {} attempt(s)", Status::Timeout, case.id, attempts);
                    self.state = State::Done;
                    return Ok(TestOutcome::new(case, None, Status::Timeout, attempts));
                }
                Awaited::Malformed(e) if self.config.retry_malformed && retries_left => {
                    warn!("Case '{}' got {}, retrying", case.id, e);
                    self.rx.clear();
                }
                Awaited::Malformed(e) => {
                    warn!("Case '{}' got {}", case.id, e);
                    self.rx.clear();
                    info!("{} '{}' after {} attempt(s)", Status::Error, case.id, attempts);
                    self.state = State::Done;
                    return Ok(TestOutcome::new(case, None, Status::Error, attempts));
                }
            }
        }
    }

    // Reads until a frame with `sequence_id` arrives, a bad frame shows up,
    // or `deadline` passes. Stale frames are dropped without touching the
    // deadline.
    fn await_response(
        &mut self,
        sequence_id: u32,
        deadline: Instant,
    ) -> Result<Awaited, SessionError> {
        loop {
            loop {
                match self.rx.next_record() {
                    Ok(Some(record)) if record.sequence_id == sequence_id => {
                        return Ok(Awaited::Matched(record))
                    }
                    Ok(Some(record)) => warn!(
                        "Discarding stale response seq={} (waiting for {})",
                        record.sequence_id, sequence_id
                    ),
                    Ok(None) => break,
                    Err(e) => return Ok(Awaited::Malformed(e)),
                }
            }

            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                if !self.rx.is_empty() {
                    debug!("Deadline passed with {} partial byte(s)", self.rx.len());
                }
                return Ok(Awaited::TimedOut);
            }

            let slice = deadline.min(now + self.config.abort_poll_interval);
            match self.transport.read_with_deadline(slice) {
                Ok(bytes) => {
                    trace!("Received {:02X?}", bytes);
                    self.rx.extend(&bytes);
                }
                Err(TransportError::DeadlineExceeded) => {}
                Err(e) => return Err(self.link_lost(e)),
            }
        }
    }

    /// Runs `cases` in order, feeding each outcome to `aggregator`.
    ///
    /// On abort the remaining cases, including the interrupted one, are
    /// recorded as `NotRun` and the cause is returned.
    pub fn run_session_into(
        &mut self,
        cases: &[TestCase],
        aggregator: &mut Aggregator,
    ) -> Result<(), SessionError> {
        if !self.settled && !self.config.settle_time.is_zero() {
            debug!("Waiting {:?} for the device to settle", self.config.settle_time);
            if let Err(e) = self.pause(self.config.settle_time) {
                aggregator.abort(AbortReason::from(&e), cases);
                return Err(e);
            }
        }
        self.settled = true;

        for (i, case) in cases.iter().enumerate() {
            match self.run_case(case) {
                Ok(outcome) => aggregator.record(outcome),
                Err(e) => {
                    aggregator.abort(AbortReason::from(&e), &cases[i..]);
                    return Err(e);
                }
            }
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Runs a whole session and returns its finalized report.
    pub fn run_session(&mut self, cases: &[TestCase]) -> SessionReport {
        let mut aggregator = Aggregator::new();
        if let Err(e) = self.run_session_into(cases, &mut aggregator) {
            error!("Session aborted: {}", e);
        }
        aggregator.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tolerance;
    use crate::responder::{Fault, Responder};
    use crate::transport::LoopbackTransport;
    use std::collections::VecDeque;

    const SHORT: Duration = Duration::from_millis(20);

    fn controller(responder: Responder) -> Controller<LoopbackTransport> {
        Controller::new(LoopbackTransport::new(responder))
    }

    fn case(id: &str) -> TestCase {
        TestCase::new(id, 10.0, 20.0).with_timeout(SHORT)
    }

    // A transport fed from a fixed script, for byte sequences the responder
    // can not produce on its own.
    #[derive(Default)]
    struct ScriptedTransport {
        reads: VecDeque<Result<Vec<u8>, TransportError>>,
        written: Vec<Vec<u8>>,
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn read_with_deadline(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
            match self.reads.pop_front() {
                Some(Err(TransportError::DeadlineExceeded)) | None => {
                    thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    Err(TransportError::DeadlineExceeded)
                }
                Some(r) => r,
            }
        }

        fn close(&mut self) {}
    }

    // --- Tests for classification ---

    #[test]
    fn correct_reply_passes() {
        let mut ctl = controller(Responder::doubling());
        let outcome = ctl.run_case(&case("s1")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.received_value, Some(20.0));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(ctl.state(), State::Done);
    }

    #[test]
    fn wrong_reply_fails() {
        let mut ctl = controller(Responder::doubling().then(Fault::Reply(19.0)));
        let outcome = ctl.run_case(&case("s2")).unwrap();
        assert_eq!(outcome.status, Status::Fail);
        assert_eq!(outcome.received_value, Some(19.0));
    }

    #[test]
    fn reply_within_tolerance_passes() {
        let mut ctl = controller(Responder::doubling().then(Fault::Reply(19.0)));
        let c = case("tol").with_tolerance(Tolerance::Absolute(1.0));
        assert_eq!(ctl.run_case(&c).unwrap().status, Status::Pass);
    }

    // --- Tests for timeout and retry ---

    #[test]
    fn silent_device_times_out_after_all_retries() {
        let mut ctl = controller(Responder::doubling().repeat(Fault::Drop, 3));
        let c = case("s3").with_max_retries(2);
        let start = Instant::now();
        let outcome = ctl.run_case(&c).unwrap();

        assert_eq!(outcome.status, Status::Timeout);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.received_value, None);
        assert_eq!(ctl.transport().writes(), 3);
        assert!(start.elapsed() >= SHORT * 3);
    }

    #[test]
    fn retry_succeeds_after_one_drop() {
        let mut ctl = controller(Responder::doubling().then(Fault::Drop));
        let outcome = ctl.run_case(&case("retry")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.attempts, 2);
        // Each retry carries a fresh sequence id.
        assert_eq!(ctl.transport().responder().last_sequence_id, Some(2));
    }

    #[test]
    fn zero_retries_sends_once() {
        let mut ctl = controller(Responder::doubling().then(Fault::Drop));
        let outcome = ctl.run_case(&case("once").with_max_retries(0)).unwrap();
        assert_eq!(outcome.status, Status::Timeout);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn truncated_reply_times_out_instead_of_error() {
        let mut ctl = controller(Responder::doubling().repeat(Fault::Truncate(1), 3));
        let outcome = ctl.run_case(&case("s4")).unwrap();
        assert_eq!(outcome.status, Status::Timeout);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn backoff_grows_linearly_between_retries() {
        let config = ControllerConfig {
            retry_backoff: Duration::from_millis(10),
            ..ControllerConfig::default()
        };
        let link = LoopbackTransport::new(Responder::doubling().repeat(Fault::Drop, 2));
        let mut ctl = Controller::with_config(link, config);
        let start = Instant::now();
        let outcome = ctl.run_case(&case("backoff")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.attempts, 3);
        // Two timeouts plus 10ms + 20ms of backoff.
        assert!(start.elapsed() >= SHORT * 2 + Duration::from_millis(30));
    }

    // --- Tests for correlation ---

    #[test]
    fn stale_response_is_discarded() {
        let mut ctl = controller(Responder::doubling().then(Fault::Stale));
        let outcome = ctl.run_case(&case("stale")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn stale_response_does_not_reset_deadline() {
        // A stale frame arrives, then silence: the case must still end at
        // the original deadline.
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Ok(Frame::new(99, 20.0).encode().to_vec()));
        let mut ctl = Controller::new(link);

        let start = Instant::now();
        let c = case("stale-only").with_timeout(Duration::from_millis(40)).with_max_retries(0);
        let outcome = ctl.run_case(&c).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome.status, Status::Timeout);
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(80));
    }

    #[test]
    fn late_reply_from_previous_attempt_is_ignored() {
        // Attempt 1 (seq 1) gets nothing. During attempt 2 the late reply for
        // seq 1 shows up first, followed by the real one.
        let mut bytes = Frame::new(1, 999.0).encode().to_vec();
        bytes.extend_from_slice(&Frame::new(2, 20.0).encode());
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Err(TransportError::DeadlineExceeded));
        link.reads.push_back(Ok(bytes));
        let mut ctl = Controller::new(link);

        let outcome = ctl.run_case(&case("late")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.received_value, Some(20.0));
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn late_reply_straddling_the_deadline_is_skipped() {
        // The reply to seq 1 arrives in two pieces, split by the deadline.
        // Its tail lands in front of the reply to seq 2.
        let late = Frame::new(1, 20.0).encode();
        let mut second = late[7..].to_vec();
        second.extend_from_slice(&Frame::new(2, 20.0).encode());
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Ok(late[..7].to_vec()));
        link.reads.push_back(Err(TransportError::DeadlineExceeded));
        link.reads.push_back(Ok(second));
        let mut ctl = Controller::new(link);

        let c = case("straddle").with_timeout(Duration::from_millis(30));
        let outcome = ctl.run_case(&c).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.received_value, Some(20.0));
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn line_noise_before_reply_is_skipped() {
        let mut bytes = vec![0xEE; 5];
        bytes.extend_from_slice(&Frame::new(1, 20.0).encode());
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Ok(bytes));
        let mut ctl = Controller::new(link);

        let outcome = ctl.run_case(&case("noise")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn split_reply_is_reassembled() {
        let link = LoopbackTransport::new(Responder::doubling()).with_chunk_size(3);
        let mut ctl = Controller::new(link);
        assert_eq!(ctl.run_case(&case("split")).unwrap().status, Status::Pass);
    }

    #[test]
    fn sequence_ids_increase_across_cases() {
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Ok(Frame::new(1, 20.0).encode().to_vec()));
        link.reads.push_back(Ok(Frame::new(2, 20.0).encode().to_vec()));
        let mut ctl = Controller::new(link);
        ctl.run_case(&case("a")).unwrap();
        ctl.run_case(&case("b")).unwrap();

        let ids: Vec<u32> = ctl
            .transport()
            .written
            .iter()
            .map(|w| Frame::decode(w).unwrap().sequence_id)
            .collect();
        assert_eq!(ids, [1, 2]);
    }

    // --- Tests for malformed frames ---

    #[test]
    fn malformed_reply_is_error_without_retry() {
        let mut ctl = controller(Responder::doubling().then(Fault::Corrupt));
        let outcome = ctl.run_case(&case("bad")).unwrap();
        assert_eq!(outcome.status, Status::Error);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(ctl.transport().writes(), 1);
    }

    #[test]
    fn malformed_reply_retried_when_configured() {
        let config = ControllerConfig {
            retry_malformed: true,
            ..ControllerConfig::default()
        };
        let link = LoopbackTransport::new(Responder::doubling().then(Fault::Corrupt));
        let mut ctl = Controller::with_config(link, config);
        let outcome = ctl.run_case(&case("bad-retry")).unwrap();
        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn garbage_after_error_does_not_leak_into_next_case() {
        let mut bytes = Frame::new(1, f64::NAN).encode().to_vec();
        bytes.extend_from_slice(&[0x24, 0x46, 0x53, 0x02]);
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Ok(bytes));
        link.reads.push_back(Ok(Frame::new(2, 20.0).encode().to_vec()));
        let mut ctl = Controller::new(link);

        assert_eq!(ctl.run_case(&case("a")).unwrap().status, Status::Error);
        assert_eq!(ctl.run_case(&case("b")).unwrap().status, Status::Pass);
    }

    // --- Tests for session control ---

    #[test]
    fn link_loss_aborts_session() {
        let link = LoopbackTransport::new(Responder::doubling()).disconnect_after(3);
        let mut ctl = Controller::new(link);
        let cases: Vec<_> = (1..=5).map(|i| case(&format!("c{}", i))).collect();

        let mut agg = Aggregator::new();
        let err = ctl.run_session_into(&cases, &mut agg).unwrap_err();
        assert!(matches!(err, SessionError::LinkLost(TransportError::Closed)));
        assert_eq!(ctl.state(), State::SessionAborted);

        let statuses: Vec<_> = agg.outcomes().iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            [Status::Pass, Status::Pass, Status::Pass, Status::NotRun, Status::NotRun]
        );
        assert!(agg.is_aborted());

        // Nothing else can run on a dead link.
        assert!(ctl.run_case(&case("after")).is_err());
    }

    #[test]
    fn read_error_mid_case_is_link_lost() {
        let mut link = ScriptedTransport::default();
        link.reads.push_back(Err(TransportError::Io(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ))));
        let mut ctl = Controller::new(link);
        let report = ctl.run_session(&[case("x"), case("y")]);
        assert!(matches!(report.abort_reason(), Some(AbortReason::LinkLost(_))));
        assert_eq!(report.summary().not_run, 2);
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let mut ctl = controller(Responder::doubling());
        ctl.abort_handle().abort();
        let report = ctl.run_session(&[case("a"), case("b")]);
        assert_eq!(report.abort_reason(), Some(&AbortReason::Cancelled));
        assert_eq!(report.summary().not_run, 2);
        assert_eq!(ctl.transport().writes(), 0);
    }

    #[test]
    fn cancel_from_another_thread_interrupts_wait() {
        let link = LoopbackTransport::new(Responder::doubling().repeat(Fault::Drop, 10));
        let config = ControllerConfig {
            abort_poll_interval: Duration::from_millis(10),
            ..ControllerConfig::default()
        };
        let mut ctl = Controller::with_config(link, config);
        let handle = ctl.abort_handle();
        let slow = TestCase::new("slow", 1.0, 2.0).with_timeout(Duration::from_secs(5));

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.abort();
        });
        let start = Instant::now();
        let result = ctl.run_case(&slow);
        canceller.join().unwrap();

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancel_during_backoff_sends_nothing_more() {
        let link = LoopbackTransport::new(Responder::doubling().repeat(Fault::Drop, 3));
        let config = ControllerConfig {
            retry_backoff: Duration::from_millis(200),
            abort_poll_interval: Duration::from_millis(10),
            ..ControllerConfig::default()
        };
        let mut ctl = Controller::with_config(link, config);
        let handle = ctl.abort_handle();

        // The first attempt times out after 20ms, then the backoff starts.
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            handle.abort();
        });
        let start = Instant::now();
        let result = ctl.run_case(&case("backoff-cancel"));
        canceller.join().unwrap();

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(ctl.transport().writes(), 1);
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(ctl.state(), State::SessionAborted);
    }

    #[test]
    fn cancel_during_settle_time_runs_nothing() {
        let config = ControllerConfig {
            settle_time: Duration::from_secs(5),
            abort_poll_interval: Duration::from_millis(10),
            ..ControllerConfig::default()
        };
        let mut ctl = Controller::with_config(LoopbackTransport::new(Responder::doubling()), config);
        let handle = ctl.abort_handle();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.abort();
        });
        let start = Instant::now();
        let report = ctl.run_session(&[case("a"), case("b")]);
        canceller.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(report.abort_reason(), Some(&AbortReason::Cancelled));
        assert_eq!(report.summary().not_run, 2);
        assert_eq!(ctl.transport().writes(), 0);
    }

    #[test]
    fn settle_time_applies_once() {
        let config = ControllerConfig {
            settle_time: Duration::from_millis(30),
            ..ControllerConfig::default()
        };
        let mut ctl = Controller::with_config(LoopbackTransport::new(Responder::doubling()), config);

        let start = Instant::now();
        let report = ctl.run_session(&[case("a")]);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(report.succeeded());

        let mut agg = Aggregator::new();
        let start = Instant::now();
        ctl.run_session_into(&[case("b")], &mut agg).unwrap();
        assert!(start.elapsed() < Duration::from_millis(30));
        assert_eq!(ctl.state(), State::Idle);
    }
}
