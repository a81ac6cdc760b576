//! # Ingestion
//!
//! Byte stream to frame plumbing between a transport and the sensor core.
//!
//! Responsibilities:
//! - Encode and incrementally parse the three wire framings
//! - Own the transport and route decoded frames to one subscriber
//! - Turn the asynchronous stream into blocking request/response calls
//! - Negotiate protocol generation and component layout on connect
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{Communicator, ConnectionNegotiator, SyncedCommunicator};
//!
//! let communicator = Communicator::new(transport, Framing::Zensync);
//! let negotiated = ConnectionNegotiator::new(communicator.clone()).negotiate(921_600)?;
//!
//! let synced = SyncedCommunicator::new(communicator);
//! let bitset: u32 = synced.send_and_wait_for_result(0, 31, 31, &[])?;
//! ```
//!
//! ## Mock Testing
//!
//! ```ignore
//! use ingestion::mock::{MockTransport, SimulatedDevice};
//!
//! let device = SimulatedDevice::ig1("LPMS-IG1-RS232");
//! let transport = MockTransport::with_device("sim", device.clone());
//! ```

pub mod codec;
mod communicator;
mod config;
mod coordinator;
mod error;
mod fence;
pub mod mock;
mod negotiator;
pub mod opcodes;

// Re-exports
pub use codec::{decode_all, FrameCodec, FrameParser, ParseStatus};
pub use communicator::{Communicator, FrameSubscriber};
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use coordinator::{SyncedCommunicator, DEFAULT_IO_TIMEOUT};
pub use error::{ParseError, Result};
pub use fence::Fence;
pub use negotiator::{lookup_config, ConnectionNegotiator, Negotiated, NEGOTIATION_TIMEOUT};
