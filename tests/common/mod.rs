#![allow(dead_code)]

use capture_encoder::{
    BackendFactory, BackendKind, ContainerBackend, Error, FrameInfo, FrameSet, JobId, OpenParams,
    Rect, Result, Rgb, StatusEvent,
};
use crossbeam_channel::{Receiver, Sender};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::{fs, path::Path, sync::Arc, time::Duration};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Writes `count` solid frames of distinct colors and returns them as a set.
pub fn write_frames(dir: &Path, count: usize, width: u32, height: u32, delay: u16) -> FrameSet {
    fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let shade = (i * 255 / count.max(1)) as u8;
            let image = RgbaImage::from_pixel(width, height, Rgba([shade, 64, 255 - shade, 255]));
            let path = dir.join(format!("{i:03}.png"));
            image.save(&path).unwrap();
            FrameInfo::new(path, Rect::new(0, 0, width, height), delay)
        })
        .collect()
}

/// Receives events until `id` reaches a terminal status, returning all of them.
pub fn wait_terminal(rx: &Receiver<StatusEvent>, id: JobId) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv_timeout(TIMEOUT).expect("job did not finish in time");
        let done = event.job_id == id && event.status.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(OpenParams),
    Append {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        delay: u16,
    },
    Close,
    Quality(u8),
    Transparent(Rgb),
    DisposeKeep,
}

/// Pauses a backend after a number of appended frames until resumed.
pub struct Pause {
    pub after: usize,
    pub paused: Sender<()>,
    pub resume: Receiver<()>,
}

/// Backend factory whose backends record every call they receive.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub fail: Option<BackendKind>,
    pub positive_delay: bool,
    pub pause: Option<Arc<Pause>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(kind: BackendKind) -> Self {
        Self {
            fail: Some(kind),
            ..Self::default()
        }
    }

    /// Returns a factory pausing after `after` frames, plus the channels to
    /// observe the pause and to resume.
    pub fn pausing(after: usize) -> (Self, Receiver<()>, Sender<()>) {
        let (paused_tx, paused_rx) = crossbeam_channel::unbounded();
        let (resume_tx, resume_rx) = crossbeam_channel::unbounded();
        let factory = Self {
            pause: Some(Arc::new(Pause {
                after,
                paused: paused_tx,
                resume: resume_rx,
            })),
            ..Self::default()
        };
        (factory, paused_rx, resume_tx)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn appends(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Append { .. }))
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }
}

impl BackendFactory for RecordingFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn ContainerBackend>> {
        if self.fail == Some(kind) {
            return Err(Error::Backend(format!("{kind} rigged to fail")));
        }
        Ok(Box::new(RecordingBackend {
            calls: self.calls.clone(),
            positive_delay: self.positive_delay,
            pause: self.pause.clone(),
            appended: 0,
        }))
    }
}

struct RecordingBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    positive_delay: bool,
    pause: Option<Arc<Pause>>,
    appended: usize,
}

impl ContainerBackend for RecordingBackend {
    fn open(&mut self, params: &OpenParams) -> Result<()> {
        fs::write(&params.destination, b"recorded")?;
        self.calls.lock().push(Call::Open(params.clone()));
        Ok(())
    }

    fn append_frame(&mut self, pixels: &RgbaImage, x: u32, y: u32, delay: u16) -> Result<()> {
        self.calls.lock().push(Call::Append {
            x,
            y,
            width: pixels.width(),
            height: pixels.height(),
            delay,
        });
        self.appended += 1;
        if let Some(pause) = &self.pause {
            if self.appended == pause.after {
                pause.paused.send(()).unwrap();
                pause.resume.recv_timeout(TIMEOUT).unwrap();
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().push(Call::Close);
        Ok(())
    }

    fn requires_positive_delay(&self) -> bool {
        self.positive_delay
    }

    fn set_transparent(&mut self, color: Rgb) {
        self.calls.lock().push(Call::Transparent(color));
    }

    fn set_dispose_keep(&mut self) {
        self.calls.lock().push(Call::DisposeKeep);
    }

    fn set_quality(&mut self, quality: u8) {
        self.calls.lock().push(Call::Quality(quality));
    }
}
