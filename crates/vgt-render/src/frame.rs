// SPDX-License-Identifier: CEPL-1.0
//! Per-frame gating: fence wait, acquire, record, submit, present.
//!
//! The protocol is backend-agnostic; a backend only exposes the individual
//! GPU operations through [`FrameBackend`]. Ordering between CPU and GPU is
//! carried by the slot fence, ordering between GPU stages by the slot's
//! image-acquired and render-finished semaphores.

use std::fmt;

use tracing::{debug, trace};

/// Where a frame currently is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    WaitFence,
    Acquire,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Idle => "idle",
            FramePhase::WaitFence => "wait-fence",
            FramePhase::Acquire => "acquire",
            FramePhase::Record => "record",
            FramePhase::Submit => "submit",
            FramePhase::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{phase} failed: {source:#}")]
    Backend {
        phase: FramePhase,
        #[source]
        source: anyhow::Error,
    },
    #[error("frame loop halted after a failed {0}")]
    Halted(FramePhase),
}

impl FrameError {
    pub fn phase(&self) -> FramePhase {
        match self {
            FrameError::Backend { phase, .. } | FrameError::Halted(phase) => *phase,
        }
    }
}

/// GPU operations of one frame, addressed by frame slot.
///
/// `slot` is always `< frames_in_flight`; `image` is whatever `acquire`
/// returned for the same frame.
pub trait FrameBackend {
    /// Blocks until the slot's fence is signaled.
    fn wait_fence(&mut self, slot: usize) -> anyhow::Result<()>;
    fn reset_fence(&mut self, slot: usize) -> anyhow::Result<()>;
    /// Returns the next presentable image; signals the slot's image-acquired
    /// semaphore when the image is ready.
    fn acquire(&mut self, slot: usize) -> anyhow::Result<u32>;
    /// Writes the slot's uniforms and re-records its command buffer.
    fn record(&mut self, slot: usize, image: u32) -> anyhow::Result<()>;
    /// Waits image-acquired, signals render-finished and the slot fence.
    fn submit(&mut self, slot: usize, image: u32) -> anyhow::Result<()>;
    /// Waits render-finished.
    fn present(&mut self, slot: usize, image: u32) -> anyhow::Result<()>;
    /// Blocks until the presentation engine has consumed the queue.
    fn wait_present_idle(&mut self) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub image: u32,
    /// 1-based count of completed frames.
    pub frame: u64,
}

/// Drives [`FrameBackend`] through one linear cycle per call.
///
/// Slots rotate round-robin and a slot is only touched again after its
/// fence wait, so no two overlapping submissions share a command buffer,
/// semaphore or uniform region. Any failure is final: the synchronizer
/// latches and rejects every later frame.
#[derive(Debug)]
pub struct FrameSynchronizer {
    frames_in_flight: usize,
    current: usize,
    wait_for_present: bool,
    phase: FramePhase,
    halted: Option<FramePhase>,
    completed: u64,
}

impl FrameSynchronizer {
    pub fn new(frames_in_flight: usize, wait_for_present: bool) -> Self {
        FrameSynchronizer {
            frames_in_flight: frames_in_flight.max(1),
            current: 0,
            wait_for_present,
            phase: FramePhase::Idle,
            halted: None,
            completed: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn frames_completed(&self) -> u64 {
        self.completed
    }

    pub fn run_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<FrameReport, FrameError> {
        if let Some(phase) = self.halted {
            return Err(FrameError::Halted(phase));
        }
        let slot = self.current;

        self.enter(FramePhase::WaitFence);
        let waited = backend.wait_fence(slot);
        self.check(waited)?;
        let reset = backend.reset_fence(slot);
        self.check(reset)?;

        self.enter(FramePhase::Acquire);
        let acquired = backend.acquire(slot);
        let image = self.check(acquired)?;

        self.enter(FramePhase::Record);
        let recorded = backend.record(slot, image);
        self.check(recorded)?;

        self.enter(FramePhase::Submit);
        let submitted = backend.submit(slot, image);
        self.check(submitted)?;

        self.enter(FramePhase::Present);
        let presented = backend.present(slot, image);
        self.check(presented)?;
        if self.wait_for_present {
            let idle = backend.wait_present_idle();
            self.check(idle)?;
        }

        self.enter(FramePhase::Idle);
        self.current = (slot + 1) % self.frames_in_flight;
        self.completed += 1;

        Ok(FrameReport {
            slot,
            image,
            frame: self.completed,
        })
    }

    fn enter(&mut self, phase: FramePhase) {
        trace!("frame {} slot {}: {}", self.completed + 1, self.current, phase);
        self.phase = phase;
    }

    fn check<T>(&mut self, result: anyhow::Result<T>) -> Result<T, FrameError> {
        result.map_err(|source| {
            debug!("frame halted in {}: {source:#}", self.phase);
            self.halted = Some(self.phase);
            FrameError::Backend {
                phase: self.phase,
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        WaitFence(usize),
        ResetFence(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Present(usize, u32),
        WaitPresentIdle,
    }

    /// Records every call; fails the first call whose name matches `fail_on`.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        images: u32,
        next_image: u32,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn with_images(images: u32) -> Self {
            Recorder {
                images,
                ..Default::default()
            }
        }

        fn failing(name: &'static str) -> Self {
            Recorder {
                images: 3,
                fail_on: Some(name),
                ..Default::default()
            }
        }

        fn log(&mut self, name: &'static str, call: Call) -> anyhow::Result<()> {
            self.calls.push(call);
            if self.fail_on == Some(name) {
                return Err(anyhow!("{name} returned ERROR_DEVICE_LOST"));
            }
            Ok(())
        }
    }

    impl FrameBackend for Recorder {
        fn wait_fence(&mut self, slot: usize) -> anyhow::Result<()> {
            self.log("wait_fence", Call::WaitFence(slot))
        }
        fn reset_fence(&mut self, slot: usize) -> anyhow::Result<()> {
            self.log("reset_fence", Call::ResetFence(slot))
        }
        fn acquire(&mut self, slot: usize) -> anyhow::Result<u32> {
            self.log("acquire", Call::Acquire(slot))?;
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok(image)
        }
        fn record(&mut self, slot: usize, image: u32) -> anyhow::Result<()> {
            self.log("record", Call::Record(slot, image))
        }
        fn submit(&mut self, slot: usize, image: u32) -> anyhow::Result<()> {
            self.log("submit", Call::Submit(slot, image))
        }
        fn present(&mut self, slot: usize, image: u32) -> anyhow::Result<()> {
            self.log("present", Call::Present(slot, image))
        }
        fn wait_present_idle(&mut self) -> anyhow::Result<()> {
            self.log("wait_present_idle", Call::WaitPresentIdle)
        }
    }

    #[test]
    fn one_frame_runs_the_full_cycle_in_order() {
        let mut sync = FrameSynchronizer::new(1, true);
        let mut backend = Recorder::with_images(3);

        let report = sync.run_frame(&mut backend).unwrap();

        assert_eq!(
            report,
            FrameReport {
                slot: 0,
                image: 0,
                frame: 1
            }
        );
        assert_eq!(
            backend.calls,
            vec![
                Call::WaitFence(0),
                Call::ResetFence(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
                Call::WaitPresentIdle,
            ]
        );
        assert_eq!(sync.phase(), FramePhase::Idle);
    }

    #[test]
    fn present_wait_is_optional() {
        let mut sync = FrameSynchronizer::new(1, false);
        let mut backend = Recorder::with_images(2);
        sync.run_frame(&mut backend).unwrap();
        assert!(!backend.calls.contains(&Call::WaitPresentIdle));
        assert_eq!(backend.calls.last(), Some(&Call::Present(0, 0)));
    }

    #[test]
    fn single_slot_is_reused_every_frame() {
        let mut sync = FrameSynchronizer::new(1, true);
        let mut backend = Recorder::with_images(3);
        for expected_image in [0, 1, 2, 0] {
            let report = sync.run_frame(&mut backend).unwrap();
            assert_eq!(report.slot, 0);
            assert_eq!(report.image, expected_image);
        }
        assert_eq!(sync.frames_completed(), 4);
    }

    #[test]
    fn slots_rotate_and_each_waits_its_own_fence_first() {
        let mut sync = FrameSynchronizer::new(2, false);
        let mut backend = Recorder::with_images(3);
        let slots: Vec<usize> = (0..5)
            .map(|_| sync.run_frame(&mut backend).unwrap().slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);

        // every use of a slot is preceded by a wait on that slot's fence
        for (i, call) in backend.calls.iter().enumerate() {
            if let Call::Record(slot, _) = call {
                let last_wait = backend.calls[..i]
                    .iter()
                    .rev()
                    .find_map(|c| match c {
                        Call::WaitFence(s) => Some(*s),
                        _ => None,
                    });
                assert_eq!(last_wait, Some(*slot));
            }
        }
    }

    #[test]
    fn zero_slots_is_clamped_to_one() {
        let sync = FrameSynchronizer::new(0, true);
        assert_eq!(sync.frames_in_flight(), 1);
    }

    #[test]
    fn acquire_failure_stops_before_recording() {
        let mut sync = FrameSynchronizer::new(1, true);
        let mut backend = Recorder::failing("acquire");

        let err = sync.run_frame(&mut backend).unwrap_err();

        assert_eq!(err.phase(), FramePhase::Acquire);
        assert!(err.to_string().contains("ERROR_DEVICE_LOST"), "{err}");
        assert_eq!(
            backend.calls,
            vec![Call::WaitFence(0), Call::ResetFence(0), Call::Acquire(0)]
        );
        assert!(sync.is_halted());
        assert_eq!(sync.frames_completed(), 0);
    }

    #[test]
    fn failures_are_attributed_to_their_phase() {
        for (name, phase) in [
            ("wait_fence", FramePhase::WaitFence),
            ("reset_fence", FramePhase::WaitFence),
            ("record", FramePhase::Record),
            ("submit", FramePhase::Submit),
            ("present", FramePhase::Present),
            ("wait_present_idle", FramePhase::Present),
        ] {
            let mut sync = FrameSynchronizer::new(1, true);
            let err = sync.run_frame(&mut Recorder::failing(name)).unwrap_err();
            assert_eq!(err.phase(), phase, "failing {name}");
        }
    }

    #[test]
    fn halted_synchronizer_never_touches_the_backend_again() {
        let mut sync = FrameSynchronizer::new(1, true);
        let mut backend = Recorder::failing("submit");
        sync.run_frame(&mut backend).unwrap_err();
        let calls_before = backend.calls.len();

        backend.fail_on = None;
        let err = sync.run_frame(&mut backend).unwrap_err();

        assert!(matches!(err, FrameError::Halted(FramePhase::Submit)));
        assert_eq!(backend.calls.len(), calls_before);
    }

    #[test]
    fn failed_frame_does_not_advance_the_slot() {
        let mut sync = FrameSynchronizer::new(3, false);
        let mut backend = Recorder::with_images(3);
        sync.run_frame(&mut backend).unwrap();
        backend.fail_on = Some("present");
        sync.run_frame(&mut backend).unwrap_err();
        assert_eq!(sync.current_slot(), 1);
    }
}
