//! OpenZen 指标
//!
//! 所有指标名集中在这里；各库 crate 通过下面的函数上报，不直接拼指标名。

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const FRAMES_PARSED: &str = "openzen_frames_parsed_total";
pub const RESYNC_BYTES: &str = "openzen_resync_bytes_total";
pub const EVENTS_UNCLAIMED: &str = "openzen_events_unclaimed_total";
pub const REQUEST_LATENCY: &str = "openzen_request_latency_seconds";
pub const REQUEST_TIMEOUTS: &str = "openzen_request_timeouts_total";
pub const REQUESTS_BUSY: &str = "openzen_requests_busy_total";
pub const EVENTS_DISPATCHED: &str = "openzen_events_dispatched_total";
pub const EVENTS_DROPPED: &str = "openzen_events_dropped_total";
pub const LIVE_SENSORS: &str = "openzen_live_sensors";

/// 注册指标描述，在安装 recorder 之后调用
pub fn describe() {
    describe_counter!(FRAMES_PARSED, "Frames decoded from transport bytes");
    describe_counter!(RESYNC_BYTES, Unit::Bytes, "Bytes skipped while resynchronizing a parser");
    describe_counter!(EVENTS_UNCLAIMED, "Events emitted while no queue was subscribed");
    describe_histogram!(REQUEST_LATENCY, Unit::Seconds, "Round trip of synchronous requests");
    describe_counter!(REQUEST_TIMEOUTS, "Synchronous requests that timed out");
    describe_counter!(REQUESTS_BUSY, "Synchronous requests rejected while another was outstanding");
    describe_counter!(EVENTS_DISPATCHED, "Events delivered to subscriber queues");
    describe_counter!(EVENTS_DROPPED, "Events dropped on full queues");
    describe_gauge!(LIVE_SENSORS, "Sensors currently held by the manager");
}

/// 记录一帧解析成功
pub fn record_frame_parsed(framing: &'static str) {
    counter!(FRAMES_PARSED, "framing" => framing).increment(1);
}

/// 记录重同步丢弃的字节
pub fn record_resync(framing: &'static str, skipped: u64) {
    counter!(RESYNC_BYTES, "framing" => framing).increment(skipped);
}

pub fn record_event_unclaimed() {
    counter!(EVENTS_UNCLAIMED).increment(1);
}

/// 记录同步请求往返耗时 (秒)
pub fn record_request_latency(seconds: f64) {
    histogram!(REQUEST_LATENCY).record(seconds);
}

pub fn record_request_timeout() {
    counter!(REQUEST_TIMEOUTS).increment(1);
}

pub fn record_request_busy() {
    counter!(REQUESTS_BUSY).increment(1);
}

/// 记录多播送达的事件数
pub fn record_event_dispatched(delivered: usize) {
    if delivered > 0 {
        counter!(EVENTS_DISPATCHED).increment(delivered as u64);
    }
}

pub fn record_event_dropped() {
    counter!(EVENTS_DROPPED).increment(1);
}

/// 管理器当前持有的传感器数
pub fn set_live_sensors(count: usize) {
    gauge!(LIVE_SENSORS).set(count as f64);
}
