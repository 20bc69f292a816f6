//! # UART Hardware-in-the-Loop Test Harness
//!
//! This library drives an embedded device over a serial link: it sends framed
//! test vectors, waits for the correlated response under a deadline, checks the
//! device's transformation against an expected value and collects the results
//! into a report.
//!
//! ```no_run
//! use uart_hil::{Controller, Responder, LoopbackTransport, TestCase};
//!
//! let link = LoopbackTransport::new(Responder::doubling());
//! let mut controller = Controller::new(link);
//! let report = controller.run_session(&[TestCase::new("double-10", 10.0, 20.0)]);
//! assert!(report.succeeded());
//! ```

pub mod aggregator;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod report;
pub mod responder;
pub mod transport;

pub use aggregator::{AbortReason, Aggregator, ReportRecord, SessionReport, SessionSummary};
pub use codec::{Frame, FrameBuffer, ResponseRecord, FRAME_LEN};
pub use config::HarnessConfig;
pub use controller::{AbortHandle, Controller, ControllerConfig, State};
pub use error::{ConfigError, FrameError, ReportError, SessionError, TransportError};
pub use model::{Status, TestCase, TestOutcome, Tolerance};
pub use responder::{Fault, Responder};
pub use transport::{LoopbackTransport, SerialSettings, SerialTransport, Transport};
