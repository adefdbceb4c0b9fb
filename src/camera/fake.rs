//! In-memory camera backend for tests

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use super::{CameraBackend, CameraError, CameraFrame, FacingMode, StreamRequest, VideoStream};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    Open(usize, FacingMode),
    Stop(usize),
}

#[derive(Default)]
struct State {
    events: Vec<BackendEvent>,
    active: usize,
    max_active: usize,
    next_id: usize,
    fail_next: bool,
}

/// Backend that hands out uniform grey frames of a fixed size
pub struct FakeBackend {
    state: Rc<RefCell<State>>,
    width: u32,
    height: u32,
    deliver_frames: bool,
}

impl FakeBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Rc::default(),
            width,
            height,
            deliver_frames: true,
        }
    }

    /// Streams open fine but never produce a frame
    pub fn without_frames() -> Self {
        Self {
            deliver_frames: false,
            ..Self::new(0, 0)
        }
    }

    pub fn fail_next_open(&self) {
        self.state.borrow_mut().fail_next = true;
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.borrow().events.clone()
    }

    pub fn active(&self) -> usize {
        self.state.borrow().active
    }

    pub fn max_active(&self) -> usize {
        self.state.borrow().max_active
    }
}

impl CameraBackend for FakeBackend {
    type Stream = FakeStream;

    fn open(&mut self, request: &StreamRequest) -> Result<FakeStream, CameraError> {
        let mut state = self.state.borrow_mut();
        if state.fail_next {
            state.fail_next = false;
            return Err(CameraError::Open("permission denied".to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.events.push(BackendEvent::Open(id, request.facing));
        state.active += 1;
        state.max_active = state.max_active.max(state.active);

        let frame = self.deliver_frames.then(|| CameraFrame {
            data: vec![128u8; (self.width * self.height * 4) as usize],
            width: self.width,
            height: self.height,
            frame_number: 1,
            timestamp: Instant::now(),
        });

        Ok(FakeStream {
            id,
            state: self.state.clone(),
            frame,
            stopped: false,
        })
    }
}

pub struct FakeStream {
    id: usize,
    state: Rc<RefCell<State>>,
    frame: Option<CameraFrame>,
    stopped: bool,
}

impl VideoStream for FakeStream {
    fn latest_frame(&self) -> Option<CameraFrame> {
        if self.stopped {
            return None;
        }
        self.frame.clone()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut state = self.state.borrow_mut();
        state.events.push(BackendEvent::Stop(self.id));
        state.active -= 1;
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}
