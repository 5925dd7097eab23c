//! Shared byte counter and the throttling policy that turns it into events.
//!
//! Every worker of a job holds an `Arc<ProgressAggregator>`. Workers add the
//! length of each written buffer; the aggregator decides whether the update
//! is worth an event (100ms elapsed or the percentage moved by 1.0) and
//! keeps a throughput estimate sampled over windows of at least one second.
use crate::observer::ProgressObserver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const EMIT_INTERVAL: Duration = Duration::from_millis(100);
const EMIT_PERCENT_STEP: f64 = 1.0;
const SPEED_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// 0.0 to 100.0; stays at 0 while the total size is unknown.
    pub percent: f64,
    pub bytes_done: u64,
    /// 0 when unknown.
    pub total_bytes: u64,
    pub speed_bytes_per_sec: f64,
}

/// Rate limit for progress events.
#[derive(Debug, Default)]
pub struct Throttle {
    last_emit: Option<Instant>,
    last_percent: f64,
}

impl Throttle {
    /// Returns true (and records the emission) if an event should go out.
    pub fn should_emit(&mut self, now: Instant, percent: f64) -> bool {
        let due = match self.last_emit {
            None => true,
            Some(last) => {
                now.duration_since(last) >= EMIT_INTERVAL
                    || (percent - self.last_percent).abs() >= EMIT_PERCENT_STEP
            }
        };
        if due {
            self.last_emit = Some(now);
            self.last_percent = percent;
        }
        due
    }
}

/// Throughput estimate from counter samples taken at least a second apart.
#[derive(Debug)]
pub struct SpeedMeter {
    sample_at: Instant,
    sample_bytes: u64,
    speed: f64,
}

impl SpeedMeter {
    pub fn new(now: Instant, bytes: u64) -> Self {
        Self {
            sample_at: now,
            sample_bytes: bytes,
            speed: 0.0,
        }
    }

    pub fn sample(&mut self, now: Instant, bytes: u64) -> f64 {
        let elapsed = now.duration_since(self.sample_at);
        if elapsed >= SPEED_WINDOW {
            self.speed = bytes.saturating_sub(self.sample_bytes) as f64 / elapsed.as_secs_f64();
            self.sample_at = now;
            self.sample_bytes = bytes;
        }
        self.speed
    }
}

struct Counter {
    bytes: u64,
    total: u64,
    throttle: Throttle,
    speed: SpeedMeter,
}

impl Counter {
    fn visible_bytes(&self) -> u64 {
        if self.total > 0 {
            self.bytes.min(self.total)
        } else {
            self.bytes
        }
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.visible_bytes() as f64 * 100.0 / self.total as f64
        }
    }

    fn event(&self) -> ProgressEvent {
        ProgressEvent {
            percent: self.percent(),
            bytes_done: self.visible_bytes(),
            total_bytes: self.total,
            speed_bytes_per_sec: self.speed.speed,
        }
    }
}

pub struct ProgressAggregator {
    counter: Mutex<Counter>,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressAggregator {
    pub fn new(total: u64, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            counter: Mutex::new(Counter {
                bytes: 0,
                total,
                throttle: Throttle::default(),
                speed: SpeedMeter::new(Instant::now(), 0),
            }),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds freshly written bytes and emits an event if the throttle allows.
    pub fn add(&self, delta: u64) {
        let event = {
            let mut counter = self.lock();
            counter.bytes += delta;
            let now = Instant::now();
            let visible = counter.visible_bytes();
            counter.speed.sample(now, visible);
            let percent = counter.percent();
            counter
                .throttle
                .should_emit(now, percent)
                .then(|| counter.event())
        };
        if let Some(event) = event {
            self.observer.on_progress(&event);
        }
    }

    /// Removes bytes that were counted but did not survive on disk.
    pub fn rollback(&self, delta: u64) {
        let mut counter = self.lock();
        counter.bytes = counter.bytes.saturating_sub(delta);
    }

    /// Bytes transferred so far, clamped to the total when it is known.
    pub fn bytes_done(&self) -> u64 {
        self.lock().visible_bytes()
    }

    pub fn snapshot(&self) -> ProgressEvent {
        self.lock().event()
    }

    /// Records the final size and unconditionally emits a 100% event.
    pub fn finish(&self, final_size: u64) {
        let event = {
            let mut counter = self.lock();
            counter.total = final_size;
            counter.bytes = final_size;
            let mut event = counter.event();
            event.percent = 100.0;
            event
        };
        self.observer.on_progress(&event);
    }
}
