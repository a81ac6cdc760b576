//! Stream mode control
//!
//! The firmware only answers configuration requests in command mode. Every
//! configuration exchange therefore runs inside a [`StreamGuard`]: streaming
//! is switched off on entry and the previous state is restored when the
//! guard drops, on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::ZenResult;
use ingestion::opcodes::{OpcodeV1, SET_COMMAND_MODE};
use ingestion::SyncedCommunicator;
use tracing::{debug, warn};

/// Stream mode request, identical on both generations.
const SET_STREAM_MODE: u8 = OpcodeV1::GotoStreamMode.code();

/// Shared by every properties object of one sensor.
pub struct StreamControl {
    synced: Arc<SyncedCommunicator>,
    streaming: AtomicBool,
    /// Serializes quiesced sections
    section: Mutex<()>,
}

impl StreamControl {
    /// The device is in command mode right after negotiation.
    pub fn new(synced: Arc<SyncedCommunicator>) -> Arc<Self> {
        Arc::new(Self {
            synced,
            streaming: AtomicBool::new(false),
            section: Mutex::new(()),
        })
    }

    pub fn synced(&self) -> &Arc<SyncedCommunicator> {
        &self.synced
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Switch the device mode. Returns whether a request was sent.
    pub fn set_streaming(&self, enable: bool) -> ZenResult<bool> {
        let _section = self.lock_section();
        self.switch(enable)
    }

    /// Enter command mode until the returned guard drops.
    pub fn quiesce(&self) -> ZenResult<StreamGuard<'_>> {
        let section = self.lock_section();
        let restore = self.switch(false)?;
        Ok(StreamGuard {
            control: self,
            restore,
            _section: section,
        })
    }

    fn lock_section(&self) -> MutexGuard<'_, ()> {
        self.section.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn switch(&self, enable: bool) -> ZenResult<bool> {
        if self.is_streaming() == enable {
            return Ok(false);
        }
        let function = if enable { SET_STREAM_MODE } else { SET_COMMAND_MODE };
        self.synced
            .send_and_wait_for_ack(0, function, u32::from(function), &[])?;
        self.streaming.store(enable, Ordering::Release);
        debug!(streaming = enable, "stream mode switched");
        Ok(true)
    }
}

impl std::fmt::Debug for StreamControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamControl")
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// 命令模式区间
///
/// 析构时若进入前处于流模式则恢复流模式。
#[must_use = "streaming is restored as soon as the guard drops"]
pub struct StreamGuard<'a> {
    control: &'a StreamControl,
    restore: bool,
    _section: MutexGuard<'a, ()>,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if self.restore {
            if let Err(error) = self.control.switch(true) {
                warn!(%error, "failed to restore stream mode");
            }
        }
    }
}
