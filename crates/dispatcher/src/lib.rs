//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 每个客户端一个有界事件队列 (`EventQueue`)
//! - 每个传感器一个订阅者集合，按发出顺序多播事件
//! - 可选的事件转发 (UDP relay)，隔离慢链路，不阻塞采集线程

pub mod error;
pub mod handle;
pub mod metrics;
pub mod queue;
pub mod relay;
pub mod subscribers;

pub use contracts::{Event, EventSink};
pub use error::DispatcherError;
pub use handle::RelayHandle;
pub use metrics::{QueueMetrics, QueueSnapshot, RelayMetrics, RelaySnapshot};
pub use queue::EventQueue;
pub use relay::{encode_event, EventRelay, UdpRelaySink, RELAY_TYPE_GNSS, RELAY_TYPE_IMU};
pub use subscribers::SubscriberSet;
