//! Firmware / IAP upload
//!
//! The image is sent from a worker thread: first the page count, then the
//! image in pages of [`PAGE_LEN`] bytes, each acknowledged by the device.
//! Callers poll the upload by calling [`Uploader::update`] again with the
//! same kind.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use contracts::{AsyncStatus, ZenError, ZenResult};
use ingestion::opcodes::InternalOpcode;
use tracing::{debug, info, warn};

use crate::properties::StreamControl;

/// Bytes per page; only the last page may be shorter.
pub const PAGE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Firmware,
    Iap,
}

impl UploadKind {
    fn function(self) -> u8 {
        match self {
            Self::Firmware => InternalOpcode::UpdateFirmware.code(),
            Self::Iap => InternalOpcode::UpdateIap.code(),
        }
    }

    fn other(self) -> Self {
        match self {
            Self::Firmware => Self::Iap,
            Self::Iap => Self::Firmware,
        }
    }
}

/// Upload phases of one kind. The uploader state packs kind and phase into
/// one byte, `IDLE` when nothing runs.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Running = 1,
    Done = 2,
    /// A poller is collecting the worker result
    Reporting = 3,
}

const IDLE: u8 = 0;

impl UploadKind {
    fn state(self, phase: Phase) -> u8 {
        let base = match self {
            Self::Firmware => 0,
            Self::Iap => 3,
        };
        base + phase as u8
    }
}

/// Moves the state to `Done` on every worker exit path.
struct Done {
    state: Arc<AtomicU8>,
    kind: UploadKind,
}

impl Drop for Done {
    fn drop(&mut self) {
        // a stop() in between already reset the state
        let _ = self.state.compare_exchange(
            self.kind.state(Phase::Running),
            self.kind.state(Phase::Done),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

pub struct Uploader {
    stream: Arc<StreamControl>,
    state: Arc<AtomicU8>,
    worker: Mutex<Option<JoinHandle<ZenResult<()>>>>,
}

impl Uploader {
    pub fn new(stream: Arc<StreamControl>) -> Self {
        Self {
            stream,
            state: Arc::new(AtomicU8::new(IDLE)),
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<ZenResult<()>>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an upload or query the running one.
    ///
    /// The first call copies `data` and returns `Updating`. Later calls with
    /// the same kind return `Updating` until the worker is done, then
    /// `Finished` or `Failed` once, which also resets the uploader.
    pub fn update(&self, kind: UploadKind, data: &[u8]) -> AsyncStatus {
        let running = kind.state(Phase::Running);
        match self
            .state
            .compare_exchange(IDLE, running, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => self.start(kind, data),
            Err(current) if current == running || current == kind.state(Phase::Reporting) => {
                AsyncStatus::Updating
            }
            Err(current) if current == kind.state(Phase::Done) => self.report(kind),
            Err(_) => AsyncStatus::ThreadBusy,
        }
    }

    fn start(&self, kind: UploadKind, data: &[u8]) -> AsyncStatus {
        if data.is_empty() {
            self.state.store(IDLE, Ordering::Release);
            return AsyncStatus::InvalidArgument;
        }

        // held until the handle is stored, so report() always finds it
        let mut worker = self.worker();
        let done = Done {
            state: self.state.clone(),
            kind,
        };
        let stream = self.stream.clone();
        let image = data.to_vec();
        let spawned = thread::Builder::new()
            .name("openzen-upload".to_string())
            .spawn(move || {
                let _done = done;
                upload(&stream, kind.function(), &image)
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                AsyncStatus::Updating
            }
            Err(error) => {
                warn!(%error, "failed to spawn upload worker");
                self.state.store(IDLE, Ordering::Release);
                AsyncStatus::Failed
            }
        }
    }

    /// Only the poller that claims the `Done` state joins the worker.
    fn report(&self, kind: UploadKind) -> AsyncStatus {
        if self
            .state
            .compare_exchange(
                kind.state(Phase::Done),
                kind.state(Phase::Reporting),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return AsyncStatus::Updating;
        }
        let result = self.join();
        self.state.store(IDLE, Ordering::Release);
        match result {
            Ok(()) => AsyncStatus::Finished,
            Err(_) => AsyncStatus::Failed,
        }
    }

    fn join(&self) -> ZenResult<()> {
        match self.worker().take() {
            Some(handle) => handle.join().unwrap_or(Err(ZenError::Unknown)),
            None => Ok(()),
        }
    }

    /// Wait for a running upload to end.
    pub fn stop(&self) {
        if let Err(error) = self.join() {
            warn!(%error, "upload ended with an error");
        }
        self.state.store(IDLE, Ordering::Release);
    }
}

fn upload(stream: &StreamControl, function: u8, image: &[u8]) -> ZenResult<()> {
    let _guard = stream.quiesce()?;
    let synced = stream.synced();
    let property = u32::from(function);
    let pages = image.len().div_ceil(PAGE_LEN);

    synced.send_and_wait_for_ack(0, function, property, &(pages as u32).to_le_bytes())?;
    for (index, page) in image.chunks(PAGE_LEN).enumerate() {
        synced.send_and_wait_for_ack(0, function, property, page)?;
        debug!(page = index + 1, pages, "page uploaded");
    }
    info!(function, bytes = image.len(), pages, "upload complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ig1_rig;
    use std::time::{Duration, Instant};

    fn wait_until_done(uploader: &Uploader, kind: UploadKind) -> AsyncStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = uploader.update(kind, &[]);
            if status != AsyncStatus::Updating || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_pages() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let uploader = Uploader::new(rig.stream.clone());
        let image = vec![0xAB; 600];

        assert_eq!(uploader.update(UploadKind::Firmware, &image), AsyncStatus::Updating);
        assert_eq!(wait_until_done(&uploader, UploadKind::Firmware), AsyncStatus::Finished);

        let frames = rig.device.received();
        assert_eq!(frames.iter().map(|f| f.function).collect::<Vec<_>>(), vec![2, 2, 2, 2]);
        let lengths: Vec<usize> = frames.iter().map(|f| f.payload.len()).collect();
        assert_eq!(lengths, vec![4, 255, 255, 90]);
        assert_eq!(&frames[0].payload[..], &3u32.to_le_bytes());
    }

    #[test]
    fn test_empty_image() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let uploader = Uploader::new(rig.stream.clone());
        assert_eq!(uploader.update(UploadKind::Iap, &[]), AsyncStatus::InvalidArgument);
        assert!(rig.device.received().is_empty());
    }

    #[test]
    fn test_final_status_reported_once() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let uploader = Arc::new(Uploader::new(rig.stream.clone()));
        assert_eq!(uploader.update(UploadKind::Firmware, &[7; 10]), AsyncStatus::Updating);

        let done = UploadKind::Firmware.state(Phase::Done);
        let deadline = Instant::now() + Duration::from_secs(10);
        while uploader.state.load(Ordering::Acquire) != done {
            assert!(Instant::now() < deadline, "upload never ended");
            thread::sleep(Duration::from_millis(2));
        }

        let pollers: Vec<_> = (0..8)
            .map(|_| {
                let uploader = uploader.clone();
                thread::spawn(move || uploader.update(UploadKind::Firmware, &[]))
            })
            .collect();
        let statuses: Vec<AsyncStatus> = pollers.into_iter().map(|p| p.join().unwrap()).collect();

        assert_eq!(statuses.iter().filter(|s| **s == AsyncStatus::Finished).count(), 1, "{statuses:?}");
        assert!(!statuses.contains(&AsyncStatus::Failed));
        assert_eq!(uploader.state.load(Ordering::Acquire), IDLE);
    }

    #[test]
    fn test_exclusive_and_failed() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        rig.device.update(|state| state.silent = true);
        let uploader = Uploader::new(rig.stream.clone());

        assert_eq!(uploader.update(UploadKind::Firmware, &[1, 2, 3]), AsyncStatus::Updating);
        assert_eq!(uploader.update(UploadKind::Iap, &[1]), AsyncStatus::ThreadBusy);
        assert_eq!(wait_until_done(&uploader, UploadKind::Firmware), AsyncStatus::Failed);

        // reset after the final status
        rig.device.update(|state| state.silent = false);
        assert_eq!(uploader.update(UploadKind::Iap, &[1]), AsyncStatus::Updating);
        assert_eq!(wait_until_done(&uploader, UploadKind::Iap), AsyncStatus::Finished);
        assert_eq!(rig.device.received_functions().last(), Some(&3));
    }
}
