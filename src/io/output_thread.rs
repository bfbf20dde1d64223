//! Frame output, either inline or from a background writer thread.
//!
//! The background writer holds at most one frame in flight. Submitting a
//! frame while the previous one is still unclaimed blocks the solver until
//! the writer takes it; the written frame's buffers are handed back and
//! reused for the next submission.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use tracing::{debug, error};

use super::{Frame, FrameWriter};
use crate::error::OutputError;

#[derive(Default)]
struct Slot {
    pending: Option<Frame>,
    spare: Option<Frame>,
    done: bool,
    /// Set when the writer thread has exited.
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    /// Signalled when a frame is pending or the run is done.
    ready: Condvar,
    /// Signalled when the writer has claimed a frame or stopped.
    claimed: Condvar,
}
impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // a panic while holding the lock leaves the slot in a usable state
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct OutputThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<Result<(), OutputError>>>,
}
impl OutputThread {
    pub fn spawn(writer: FrameWriter) -> Result<Self, OutputError> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("fvflow-output".to_string())
            .spawn(move || run_writer(writer, &worker))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Hands a frame to the writer. `fill` copies the current solution into
    /// a recycled buffer.
    pub fn submit(&mut self, fill: impl FnOnce(&mut Frame)) -> Result<(), OutputError> {
        let mut slot = self.shared.lock();
        while slot.pending.is_some() && !slot.stopped {
            slot = self
                .shared
                .claimed
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if slot.stopped {
            drop(slot);
            return Err(self.join().err().unwrap_or(OutputError::WriterPanicked));
        }
        let mut frame = slot.spare.take().unwrap_or_default();
        fill(&mut frame);
        slot.pending = Some(frame);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Waits for the last frame to be written and stops the thread.
    pub fn finish(mut self) -> Result<(), OutputError> {
        {
            let mut slot = self.shared.lock();
            slot.done = true;
            self.shared.ready.notify_one();
        }
        self.join()
    }

    fn join(&mut self) -> Result<(), OutputError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| OutputError::WriterPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shared.lock().done = true;
            self.shared.ready.notify_one();
            if let Err(err) = self.join() {
                error!(%err, "output writer failed");
            }
        }
    }
}

fn run_writer(mut writer: FrameWriter, shared: &Shared) -> Result<(), OutputError> {
    let result = write_frames(&mut writer, shared);
    let finished = writer.finish();
    let mut slot = shared.lock();
    slot.stopped = true;
    shared.claimed.notify_all();
    result.and(finished)
}

fn write_frames(writer: &mut FrameWriter, shared: &Shared) -> Result<(), OutputError> {
    loop {
        let frame = {
            let mut slot = shared.lock();
            while slot.pending.is_none() && !slot.done {
                slot = shared
                    .ready
                    .wait(slot)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            match slot.pending.take() {
                Some(frame) => {
                    shared.claimed.notify_all();
                    frame
                }
                None => return Ok(()),
            }
        };
        debug!(step = frame.step, "writing frame in background");
        writer.write(&frame)?;
        shared.lock().spare = Some(frame);
    }
}

/// Where the simulation sends its frames.
pub enum OutputSink {
    Inline { writer: FrameWriter, frame: Frame },
    Background(OutputThread),
}
impl OutputSink {
    pub fn new(writer: FrameWriter, background: bool) -> Result<Self, OutputError> {
        if background {
            Ok(OutputSink::Background(OutputThread::spawn(writer)?))
        } else {
            Ok(OutputSink::Inline {
                writer,
                frame: Frame::default(),
            })
        }
    }
    pub fn submit(&mut self, fill: impl FnOnce(&mut Frame)) -> Result<(), OutputError> {
        match self {
            OutputSink::Inline { writer, frame } => {
                fill(frame);
                writer.write(frame)
            }
            OutputSink::Background(thread) => thread.submit(fill),
        }
    }
    pub fn finish(self) -> Result<(), OutputError> {
        match self {
            OutputSink::Inline { writer, .. } => writer.finish(),
            OutputSink::Background(thread) => thread.finish(),
        }
    }
}
