//! # Frame Ring
//!
//! Frames-in-flight bookkeeping. Each slot owns a uniform upload buffer, an
//! instance storage buffer, the host arenas packed into them and a fence.
//! A slot is handed out by `begin_frame` only after its fence has signaled,
//! so buffers the GPU may still read are never overwritten.
//!
//! ```text
//! begin_frame ──▶ pack / upload / record ──▶ end_frame(submit) ──▶ next slot
//!      │                                          │
//!      └── waits on the slot fence                └── resets + submits fence
//! ```

mod diagnostics;

pub use diagnostics::FrameDiagnostics;

use crate::arena::BlockArena;
use crate::backend::{BufferUsage, FenceFactory, GpuFence, ResourceBinder, UploadTarget};
use crate::config::BindingConfig;
use crate::error::{BindingError, BindingResult, FrameWarning};
use crate::packer::UniformPacker;

/// Resources of one frame in flight
#[derive(Debug)]
pub struct FrameSlot<B, F> {
    fence: F,
    uniform_buffer: B,
    storage_buffer: B,
    /// Uniform blocks of the frame
    pub uniforms: UniformPacker,
    /// Instance streams of the frame
    pub storage: BlockArena,
    /// Recoverable problems met while building the frame
    pub diagnostics: FrameDiagnostics,
}

impl<B: Copy, F> FrameSlot<B, F> {
    /// Uniform buffer as of the last upload
    pub fn uniform_buffer(&self) -> B {
        self.uniform_buffer
    }

    /// Storage buffer as of the last upload
    pub fn storage_buffer(&self) -> B {
        self.storage_buffer
    }

    /// Fence guarding the slot
    pub fn fence(&self) -> &F {
        &self.fence
    }

    /// Record a recoverable warning
    pub fn warn(&mut self, warning: FrameWarning) {
        self.diagnostics.record(warning);
    }
}

/// Ring of frame slots
#[derive(Debug)]
pub struct FrameRing<B, F> {
    slots: Vec<FrameSlot<B, F>>,
    current: usize,
    recording: bool,
    frame_number: u64,
    log_warnings: bool,
}

impl<B, F> FrameRing<B, F>
where
    B: Copy,
    F: GpuFence,
{
    /// Create `frames_in_flight` slots with signaled fences
    pub fn new<T>(backend: &mut T, config: &BindingConfig) -> BindingResult<Self>
    where
        T: UploadTarget<Buffer = B> + FenceFactory<Fence = F>,
    {
        config.validate()?;

        let capacity = config.initial_upload_capacity;
        let mut slots = Vec::with_capacity(config.frames_in_flight);
        for _ in 0..config.frames_in_flight {
            slots.push(FrameSlot {
                fence: backend.create_fence(true)?,
                uniform_buffer: backend.create_host_buffer(BufferUsage::Uniform, capacity)?,
                storage_buffer: backend.create_host_buffer(BufferUsage::Storage, capacity)?,
                uniforms: UniformPacker::new(config.min_uniform_offset_alignment, capacity as usize),
                storage: BlockArena::new(config.min_storage_offset_alignment, capacity as usize),
                diagnostics: FrameDiagnostics::new(),
            });
        }

        log::debug!(
            "Frame ring with {} slots, {} byte upload buffers",
            slots.len(),
            capacity
        );

        Ok(Self {
            slots,
            current: 0,
            recording: false,
            frame_number: 0,
            log_warnings: config.warn_on_recoverable,
        })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next or current frame uses
    pub const fn slot_index(&self) -> usize {
        self.current
    }

    /// Frames ended so far
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Whether a frame is being recorded
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Wait for the next slot to retire and start a frame in it
    ///
    /// A fence that does not signal surfaces as an error and the slot stays
    /// unavailable.
    pub fn begin_frame<T>(&mut self, backend: &mut T) -> BindingResult<&mut FrameSlot<B, F>>
    where
        T: ResourceBinder,
    {
        if self.recording {
            return Err(BindingError::FrameInProgress(self.frame_number));
        }

        let index = self.current;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BindingError::FrameNotStarted)?;

        slot.fence.wait(u64::MAX)?;
        backend.reset_descriptor_sets(index)?;

        slot.uniforms.begin();
        slot.storage.clear();
        slot.diagnostics.clear();
        self.recording = true;

        log::trace!("Frame {} started in slot {}", self.frame_number, index);
        Ok(slot)
    }

    /// Slot of the frame being recorded
    pub fn current_slot(&mut self) -> BindingResult<&mut FrameSlot<B, F>> {
        if !self.recording {
            return Err(BindingError::FrameNotStarted);
        }
        self.slots.get_mut(self.current).ok_or(BindingError::FrameNotStarted)
    }

    /// Copy the packed uniform and storage bytes into the slot's buffers
    ///
    /// Grows a buffer first when the frame outgrew it. Returns the buffers to
    /// reference from descriptor sets.
    pub fn upload<T>(&mut self, target: &mut T) -> BindingResult<(B, B)>
    where
        T: UploadTarget<Buffer = B>,
    {
        let slot = self.current_slot()?;

        let uniform_len = slot.uniforms.len() as u64;
        slot.uniform_buffer = target.ensure_capacity(slot.uniform_buffer, BufferUsage::Uniform, uniform_len)?;
        target.upload(slot.uniform_buffer, 0, slot.uniforms.bytes())?;

        let storage_len = slot.storage.len() as u64;
        slot.storage_buffer = target.ensure_capacity(slot.storage_buffer, BufferUsage::Storage, storage_len)?;
        target.upload(slot.storage_buffer, 0, slot.storage.as_bytes())?;

        log::trace!("Uploaded {} uniform and {} storage bytes", uniform_len, storage_len);
        Ok((slot.uniform_buffer, slot.storage_buffer))
    }

    /// Submit the frame with the slot fence and advance the ring
    ///
    /// When `submit` fails the slot gets a fresh signaled fence so it can be
    /// reused, and the error is returned.
    pub fn end_frame<T, S>(&mut self, target: &mut T, submit: S) -> BindingResult<FrameDiagnostics>
    where
        T: FenceFactory<Fence = F>,
        S: FnOnce(&mut T, &F) -> BindingResult<()>,
    {
        let frame_number = self.frame_number;
        let log_warnings = self.log_warnings;
        let slot = self.current_slot()?;

        slot.fence.reset()?;
        if let Err(error) = submit(target, &slot.fence) {
            log::error!("Submission of frame {} failed: {}", frame_number, error);
            slot.fence = target.create_fence(true)?;
            self.recording = false;
            return Err(error);
        }

        let diagnostics = std::mem::take(&mut slot.diagnostics);
        if log_warnings {
            diagnostics.log_summary(frame_number);
        }

        self.current = (self.current + 1) % self.slots.len();
        self.frame_number += 1;
        self.recording = false;
        Ok(diagnostics)
    }

    /// Drop the frame being recorded; the slot fence was never reset
    pub fn abandon(&mut self) {
        if self.recording {
            log::debug!("Frame {} abandoned", self.frame_number);
            if let Some(slot) = self.slots.get_mut(self.current) {
                slot.diagnostics.clear();
            }
            self.recording = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{RecordedBuffer, RecordedFence, RecordingBackend};

    fn ring(backend: &mut RecordingBackend) -> FrameRing<RecordedBuffer, RecordedFence> {
        FrameRing::new(backend, &BindingConfig::default()).unwrap()
    }

    fn submit(backend: &mut RecordingBackend, fence: &RecordedFence) -> BindingResult<()> {
        backend.submit(fence);
        Ok(())
    }

    #[test]
    fn test_slots_rotate() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);
        assert_eq!(ring.len(), 2);

        for expected in [0, 1, 0, 1] {
            ring.begin_frame(&mut backend).unwrap();
            assert_eq!(ring.slot_index(), expected);
            ring.end_frame(&mut backend, submit).unwrap();
        }
        assert_eq!(ring.frame_number(), 4);
        assert_eq!(backend.submissions(), 4);
        // The third and fourth frames reused submitted slots
        assert_eq!(backend.fence_waits(), 2);
    }

    #[test]
    fn test_pending_slot_is_not_handed_out() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);

        for _ in 0..2 {
            ring.begin_frame(&mut backend).unwrap();
            ring.end_frame(&mut backend, submit).unwrap();
        }

        backend.set_gpu_stalled(true);
        assert!(ring.begin_frame(&mut backend).is_err());
        assert!(!ring.is_recording());
        assert!(matches!(ring.current_slot(), Err(BindingError::FrameNotStarted)));

        backend.set_gpu_stalled(false);
        assert!(ring.begin_frame(&mut backend).is_ok());
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);
        ring.begin_frame(&mut backend).unwrap();
        assert!(matches!(
            ring.begin_frame(&mut backend),
            Err(BindingError::FrameInProgress(0))
        ));
    }

    #[test]
    fn test_abandon_leaves_slot_free() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);

        ring.begin_frame(&mut backend).unwrap();
        ring.abandon();
        assert_eq!(ring.slot_index(), 0);
        assert!(ring.begin_frame(&mut backend).is_ok());
        assert_eq!(backend.submissions(), 0);
    }

    #[test]
    fn test_failed_submit_keeps_slot_usable() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);

        ring.begin_frame(&mut backend).unwrap();
        let result = ring.end_frame(&mut backend, |_, _| Err(BindingError::Backend("queue lost".to_string())));
        assert!(result.is_err());
        assert_eq!(ring.slot_index(), 0);
        assert!(ring.begin_frame(&mut backend).is_ok());
    }

    #[test]
    fn test_upload_grows_buffers() {
        let mut backend = RecordingBackend::new();
        let config = BindingConfig {
            initial_upload_capacity: 16,
            ..BindingConfig::default()
        };
        let mut ring = FrameRing::new(&mut backend, &config).unwrap();

        let slot = ring.begin_frame(&mut backend).unwrap();
        slot.storage.push_bytes(&[7; 100]);
        let (_, storage) = ring.upload(&mut backend).unwrap();

        let bytes = backend.buffer_bytes(storage).unwrap();
        assert!(bytes.len() >= 100);
        assert_eq!(bytes[99], 7);
    }

    #[test]
    fn test_warnings_are_returned_once() {
        let mut backend = RecordingBackend::new();
        let mut ring = ring(&mut backend);

        let slot = ring.begin_frame(&mut backend).unwrap();
        slot.warn(FrameWarning::LightOverflow { supplied: 6, capacity: 5 });
        let diagnostics = ring.end_frame(&mut backend, submit).unwrap();
        assert_eq!(diagnostics.light_overflows(), 1);

        ring.begin_frame(&mut backend).unwrap();
        let diagnostics = ring.end_frame(&mut backend, submit).unwrap();
        assert!(diagnostics.is_empty());
    }
}
