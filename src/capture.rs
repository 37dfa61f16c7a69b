//! Capture worker - owns the microphone and runs one recognition job at a time
//!
//! Jobs arrive on a FIFO queue. For each job the worker opens the microphone,
//! feeds fixed-size chunks to the recognizer until it reports the utterance is
//! finalized or the capture ceiling elapses, releases the microphone, asks for
//! the transcript and hands it to the job's sink. The sink runs on the worker
//! thread; callers that own UI state must post the result back to their own
//! queue instead of touching that state here.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Recognizer input format: mono, 16 kHz, 16-bit samples
pub const SAMPLE_RATE: usize = 16000;
pub const DEFAULT_CHUNK_SAMPLES: usize = 4000;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("capture worker has stopped")]
    WorkerStopped,
}

/// Transcript of one capture; an empty string means nothing was understood
pub type CaptureResult = Result<String, CaptureError>;

/// An open microphone. Dropping it releases the device.
pub trait AudioStream {
    /// Fill `buf` with the next samples, blocking until they are available
    fn read_chunk(&mut self, buf: &mut [i16]) -> Result<(), CaptureError>;
}

pub trait Microphone: Send {
    fn open(&mut self) -> Result<Box<dyn AudioStream + '_>, CaptureError>;
}

pub trait Recognizer: Send {
    /// Start a new utterance
    fn reset(&mut self);
    /// Feed one chunk; returns true once the utterance is finalized
    fn accept_chunk(&mut self, chunk: &[i16]) -> Result<bool, CaptureError>;
    /// Transcript of the current utterance, possibly empty
    fn final_result(&mut self) -> Result<String, CaptureError>;
}

/// One pending "listen" request
pub struct CaptureJob {
    sink: Box<dyn FnOnce(CaptureResult) + Send>,
}

impl CaptureJob {
    pub fn new(sink: impl FnOnce(CaptureResult) + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    fn deliver(self, result: CaptureResult) {
        (self.sink)(result)
    }
}

pub enum Job {
    Capture(CaptureJob),
    /// Sentinel: the worker exits without servicing anything queued behind it
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    Idle = 0,
    Capturing = 1,
    Recognizing = 2,
    Delivering = 3,
}

impl From<u8> for WorkerPhase {
    fn from(v: u8) -> Self {
        match v {
            1 => WorkerPhase::Capturing,
            2 => WorkerPhase::Recognizing,
            3 => WorkerPhase::Delivering,
            _ => WorkerPhase::Idle,
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPhase::Idle => write!(f, "Idle"),
            WorkerPhase::Capturing => write!(f, "Capturing"),
            WorkerPhase::Recognizing => write!(f, "Recognizing"),
            WorkerPhase::Delivering => write!(f, "Delivering"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Wall-clock ceiling for one capture
    pub max_duration: Duration,
    /// Samples per chunk handed to the recognizer
    pub chunk_samples: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
        }
    }
}

/// Cloneable submission side of the worker's queue
#[derive(Clone)]
pub struct CaptureHandle {
    tx: flume::Sender<Job>,
    closed: Arc<Mutex<bool>>,
    phase: Arc<AtomicU8>,
}

impl CaptureHandle {
    /// Queue a job behind any already submitted
    pub fn submit(&self, job: CaptureJob) -> Result<(), CaptureError> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(CaptureError::WorkerStopped);
        }
        self.tx
            .send(Job::Capture(job))
            .map_err(|_| CaptureError::WorkerStopped)
    }

    pub fn listen(
        &self,
        sink: impl FnOnce(CaptureResult) + Send + 'static,
    ) -> Result<(), CaptureError> {
        self.submit(CaptureJob::new(sink))
    }

    /// Queue the sentinel. Later submissions fail with `WorkerStopped`.
    pub fn shutdown(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*closed {
            *closed = true;
            let _ = self.tx.send(Job::Shutdown);
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        WorkerPhase::from(self.phase.load(Ordering::SeqCst))
    }
}

pub struct CaptureWorker {
    handle: CaptureHandle,
    thread: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn spawn(
        microphone: Box<dyn Microphone>,
        recognizer: Box<dyn Recognizer>,
        settings: CaptureSettings,
    ) -> std::io::Result<Self> {
        let (tx, rx) = flume::unbounded::<Job>();
        let phase = Arc::new(AtomicU8::new(WorkerPhase::Idle as u8));
        let handle = CaptureHandle {
            tx,
            closed: Arc::new(Mutex::new(false)),
            phase: Arc::clone(&phase),
        };

        let mut state = WorkerState {
            microphone,
            recognizer,
            settings,
            phase,
        };
        let thread = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || state.run(rx))?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    /// Send the sentinel and wait for the worker to finish its current job
    pub fn join(mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Capture worker panicked");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

struct WorkerState {
    microphone: Box<dyn Microphone>,
    recognizer: Box<dyn Recognizer>,
    settings: CaptureSettings,
    phase: Arc<AtomicU8>,
}

impl WorkerState {
    fn run(&mut self, rx: flume::Receiver<Job>) {
        tracing::debug!("Capture worker started");
        while let Ok(job) = rx.recv() {
            match job {
                Job::Shutdown => break,
                Job::Capture(job) => {
                    let result = self.capture();
                    self.set_phase(WorkerPhase::Delivering);
                    job.deliver(result);
                    self.set_phase(WorkerPhase::Idle);
                }
            }
        }
        tracing::debug!("Capture worker stopped");
    }

    fn capture(&mut self) -> CaptureResult {
        let Self {
            microphone,
            recognizer,
            settings,
            phase,
        } = self;

        phase.store(WorkerPhase::Capturing as u8, Ordering::SeqCst);
        recognizer.reset();

        let mut chunk = vec![0i16; settings.chunk_samples.max(1)];
        let started = Instant::now();
        let mut chunks = 0usize;
        let finalized = {
            // Released when this block exits, on every path
            let mut stream = microphone.open()?;
            loop {
                stream.read_chunk(&mut chunk)?;
                chunks += 1;
                if recognizer.accept_chunk(&chunk)? {
                    break true;
                }
                if started.elapsed() >= settings.max_duration {
                    break false;
                }
            }
        };

        tracing::debug!(
            "Capture ended after {} chunks in {:?} ({})",
            chunks,
            started.elapsed(),
            if finalized { "finalized" } else { "ceiling" }
        );

        phase.store(WorkerPhase::Recognizing as u8, Ordering::SeqCst);
        recognizer.final_result()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct DeviceLog {
        opened: AtomicUsize,
        released: AtomicUsize,
        entries: Mutex<Vec<String>>,
    }

    impl DeviceLog {
        fn push(&self, entry: impl Into<String>) {
            self.entries.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    struct FakeMic {
        log: Arc<DeviceLog>,
        unavailable: bool,
    }

    struct FakeStream<'a> {
        log: &'a DeviceLog,
    }

    impl AudioStream for FakeStream<'_> {
        fn read_chunk(&mut self, buf: &mut [i16]) -> Result<(), CaptureError> {
            buf.fill(0);
            thread::sleep(Duration::from_millis(1));
            Ok(())
        }
    }

    impl Drop for FakeStream<'_> {
        fn drop(&mut self) {
            self.log.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Microphone for FakeMic {
        fn open(&mut self) -> Result<Box<dyn AudioStream + '_>, CaptureError> {
            if self.unavailable {
                return Err(CaptureError::MicrophoneUnavailable("busy".into()));
            }
            self.log.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream { log: &self.log }))
        }
    }

    /// Finalizes after a fixed number of chunks and returns scripted text
    struct ScriptedRecognizer {
        log: Arc<DeviceLog>,
        finalize_after: Option<usize>,
        fail_on_chunk: bool,
        seen: usize,
        texts: Vec<String>,
    }

    impl Recognizer for ScriptedRecognizer {
        fn reset(&mut self) {
            self.seen = 0;
            self.log.push("begin");
        }

        fn accept_chunk(&mut self, _chunk: &[i16]) -> Result<bool, CaptureError> {
            if self.fail_on_chunk {
                return Err(CaptureError::Recognition("model crashed".into()));
            }
            self.seen += 1;
            Ok(self.finalize_after.is_some_and(|n| self.seen >= n))
        }

        fn final_result(&mut self) -> Result<String, CaptureError> {
            Ok(if self.texts.is_empty() {
                String::new()
            } else {
                self.texts.remove(0)
            })
        }
    }

    fn spawn(
        log: &Arc<DeviceLog>,
        finalize_after: Option<usize>,
        texts: &[&str],
        max_duration: Duration,
    ) -> CaptureWorker {
        let mic = FakeMic {
            log: Arc::clone(log),
            unavailable: false,
        };
        let recognizer = ScriptedRecognizer {
            log: Arc::clone(log),
            finalize_after,
            fail_on_chunk: false,
            seen: 0,
            texts: texts.iter().map(|t| t.to_string()).collect(),
        };
        CaptureWorker::spawn(
            Box::new(mic),
            Box::new(recognizer),
            CaptureSettings {
                max_duration,
                chunk_samples: 160,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_delivers_transcript() {
        let log = Arc::new(DeviceLog::default());
        let worker = spawn(&log, Some(3), &["hello"], Duration::from_secs(5));
        let (tx, rx) = flume::bounded(1);
        worker.handle().listen(move |r| tx.send(r).unwrap()).unwrap();

        assert_eq!(rx.recv().unwrap(), Ok("hello".to_string()));
        worker.join();
        assert_eq!(log.opened.load(Ordering::SeqCst), 1);
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ceiling_bounds_capture() {
        let log = Arc::new(DeviceLog::default());
        let worker = spawn(&log, None, &[], Duration::from_millis(50));
        let (tx, rx) = flume::bounded(1);
        let started = Instant::now();
        worker.handle().listen(move |r| tx.send(r).unwrap()).unwrap();

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(String::new()));
        assert!(started.elapsed() >= Duration::from_millis(50));
        worker.join();
    }

    #[test]
    fn test_fifo_jobs_do_not_overlap() {
        let log = Arc::new(DeviceLog::default());
        let worker = spawn(&log, Some(2), &["one", "two"], Duration::from_secs(5));
        let handle = worker.handle();
        let (tx, rx) = flume::unbounded();

        for id in 1..=2 {
            let log = Arc::clone(&log);
            let tx = tx.clone();
            handle
                .listen(move |r| {
                    log.push(format!("deliver:{}", id));
                    tx.send((id, r)).unwrap();
                })
                .unwrap();
        }

        assert_eq!(rx.recv().unwrap(), (1, Ok("one".to_string())));
        assert_eq!(rx.recv().unwrap(), (2, Ok("two".to_string())));
        assert_eq!(log.entries(), ["begin", "deliver:1", "begin", "deliver:2"]);
        worker.join();
    }

    #[test]
    fn test_shutdown_rejects_later_jobs() {
        let log = Arc::new(DeviceLog::default());
        let worker = spawn(&log, Some(1), &["first"], Duration::from_secs(5));
        let handle = worker.handle();
        let (tx, rx) = flume::unbounded();

        let tx1 = tx.clone();
        handle.listen(move |r| tx1.send(r).unwrap()).unwrap();
        handle.shutdown();
        let late = handle.listen(move |r| tx.send(r).unwrap());

        assert_eq!(late, Err(CaptureError::WorkerStopped));
        assert_eq!(rx.recv().unwrap(), Ok("first".to_string()));
        worker.join();
        assert!(rx.try_recv().is_err());
        assert_eq!(log.entries(), ["begin"]);
    }

    #[test]
    fn test_mic_released_on_recognition_error() {
        let log = Arc::new(DeviceLog::default());
        let mic = FakeMic {
            log: Arc::clone(&log),
            unavailable: false,
        };
        let recognizer = ScriptedRecognizer {
            log: Arc::clone(&log),
            finalize_after: None,
            fail_on_chunk: true,
            seen: 0,
            texts: vec![],
        };
        let worker =
            CaptureWorker::spawn(Box::new(mic), Box::new(recognizer), CaptureSettings::default())
                .unwrap();
        let (tx, rx) = flume::bounded(1);
        worker.handle().listen(move |r| tx.send(r).unwrap()).unwrap();

        assert!(matches!(rx.recv().unwrap(), Err(CaptureError::Recognition(_))));
        assert_eq!(log.opened.load(Ordering::SeqCst), 1);
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
        worker.join();
    }

    #[test]
    fn test_unavailable_microphone_reported() {
        let log = Arc::new(DeviceLog::default());
        let mic = FakeMic {
            log: Arc::clone(&log),
            unavailable: true,
        };
        let recognizer = ScriptedRecognizer {
            log: Arc::clone(&log),
            finalize_after: Some(1),
            fail_on_chunk: false,
            seen: 0,
            texts: vec![],
        };
        let worker =
            CaptureWorker::spawn(Box::new(mic), Box::new(recognizer), CaptureSettings::default())
                .unwrap();
        let handle = worker.handle();
        let (tx, rx) = flume::bounded(1);
        handle.listen(move |r| tx.send(r).unwrap()).unwrap();

        assert!(matches!(
            rx.recv().unwrap(),
            Err(CaptureError::MicrophoneUnavailable(_))
        ));
        worker.join();
        assert_eq!(handle.phase(), WorkerPhase::Idle);
    }

    #[test]
    fn test_phase_from_u8() {
        assert_eq!(WorkerPhase::from(2), WorkerPhase::Recognizing);
        assert_eq!(WorkerPhase::from(99), WorkerPhase::Idle);
        assert_eq!(WorkerPhase::Capturing.to_string(), "Capturing");
    }
}
