//! Deadline-bounded fan-out/fan-in of per-image color reductions.
//!
//! One control loop owns the [`WorkingSet`] and the received count. It waits on whichever comes
//! first: a new event from the source feed, a finished reduction, or the one-shot deadline.
//! Reductions run on the blocking pool and report back over a channel that is dropped once the
//! loop finishes, so results arriving after that point are discarded.

use crate::color::{ImageHandle, PixelColor, reduce};
use crate::error::{MosaicError, Result};
use crate::index::WorkingSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// One input delivered by a source: a decoded image or the reason it could not be produced.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Decoded { id: String, image: ImageHandle },
    Failed(MosaicError),
}

/// Why collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// All expected inputs were accounted for.
    Complete,
    /// The deadline fired first; the working set is partial.
    DeadlineElapsed,
    /// The feed closed with nothing in flight before reaching the expected count.
    FeedExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Collecting,
    Done(Finish),
}

#[derive(Debug)]
pub struct CollectOutcome {
    pub working_set: WorkingSet,
    pub expected: usize,
    pub received: usize,
    pub failures: usize,
    pub finish: Finish,
    pub elapsed: Duration,
}

impl CollectOutcome {
    /// True when fewer inputs than expected contributed, for whatever reason.
    pub fn is_partial(&self) -> bool {
        self.received < self.expected
    }
}

struct Reduced {
    id: String,
    image: ImageHandle,
    color: Result<PixelColor>,
}

#[derive(Debug, Clone)]
pub struct Collector {
    expected: usize,
    deadline: Duration,
}

impl Collector {
    pub fn new(expected: usize, deadline: Duration) -> Self {
        Self { expected, deadline }
    }

    pub fn with_default_deadline(expected: usize) -> Self {
        Self::new(expected, DEFAULT_DEADLINE)
    }

    /// Drive collection until all `expected` inputs are accounted for or the deadline fires.
    ///
    /// Decode and reduction failures count toward progress but contribute nothing. The returned
    /// set is emitted exactly once.
    pub async fn run(self, mut feed: mpsc::Receiver<SourceEvent>) -> CollectOutcome {
        let started = Instant::now();
        let timer = tokio::time::sleep(self.deadline);
        tokio::pin!(timer);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Reduced>();
        let mut set = WorkingSet::new();
        let mut received = 0usize;
        let mut failures = 0usize;
        let mut in_flight = 0usize;
        let mut feed_open = true;
        let mut state = if self.expected == 0 {
            CollectorState::Done(Finish::Complete)
        } else {
            CollectorState::Collecting
        };

        let finish = loop {
            if let CollectorState::Done(finish) = state {
                break finish;
            }
            tokio::select! {
                biased;
                _ = &mut timer => {
                    state = CollectorState::Done(Finish::DeadlineElapsed);
                }
                Some(done) = done_rx.recv() => {
                    in_flight -= 1;
                    received += 1;
                    match done.color {
                        Ok(color) => {
                            if set.insert_if_absent(color, done.image) {
                                debug!(source = %done.id, %color, "stored representative color");
                            } else {
                                debug!(source = %done.id, %color, "color already present; image dropped");
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(source = %done.id, error = %e, "color reduction failed");
                        }
                    }
                }
                event = feed.recv(), if feed_open => match event {
                    Some(SourceEvent::Decoded { id, image }) => {
                        debug!(source = %id, width = image.width(), height = image.height(), "dispatching reduction");
                        in_flight += 1;
                        let tx = done_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let color = reduce(&image);
                            // Receiver is gone once collection is done.
                            let _ = tx.send(Reduced { id, image, color });
                        });
                    }
                    Some(SourceEvent::Failed(e)) => {
                        received += 1;
                        failures += 1;
                        warn!(error = %e, "source input failed; skipping");
                    }
                    None => feed_open = false,
                },
            }

            if state == CollectorState::Collecting {
                if received >= self.expected {
                    state = CollectorState::Done(Finish::Complete);
                } else if !feed_open && in_flight == 0 {
                    state = CollectorState::Done(Finish::FeedExhausted);
                }
            }
        };
        let elapsed = started.elapsed();
        match finish {
            Finish::Complete => {
                info!(colors = set.len(), received, expected = self.expected, elapsed_ms = elapsed.as_millis(), "collection complete")
            }
            Finish::DeadlineElapsed => {
                warn!(colors = set.len(), received, expected = self.expected, in_flight, "collection deadline elapsed; returning partial working set")
            }
            Finish::FeedExhausted => {
                warn!(colors = set.len(), received, expected = self.expected, "source feed closed early; returning partial working set")
            }
        }
        CollectOutcome {
            working_set: set,
            expected: self.expected,
            received,
            failures,
            finish,
            elapsed,
        }
    }
}
