use std::collections::HashMap;

use crate::device::{EncoderId, GpuDevice, PassTimestampWrites, QuerySetId, ReadbackId};

/// Slot 0 of every frame brackets the whole frame; passes start at slot 1.
const FRAME_SLOT: u32 = 0;

/// Default number of named slots per frame, the frame slot included.
pub const DEFAULT_CAPACITY: u32 = 256;

/// GPU time spent in one named pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTiming {
    pub name: String,
    pub ms: f64,
}

/// Timings of one frame, delivered some frames after it was submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerReport {
    /// The render version of the frame these timings describe.
    pub render_version: u64,
    pub frame_ms: f64,
    pub passes: Vec<PassTiming>,
}

struct TimestampReadback {
    render_version: u64,
    ticks: Option<Vec<u64>>,
}

/// Attributes GPU time to named passes using timestamp queries.
///
/// Every slot owns two queries (begin, end). The slot table is rebuilt each
/// frame; results come back asynchronously and are matched to the frame that
/// produced them by render version, never by arrival order.
pub struct TimestampProfiler {
    capacity: u32,
    query_set: Option<QuerySetId>,
    enabled: bool,
    requested: Option<bool>,
    period_ns: f32,

    /// Whether this frame reserved the frame slot.
    frame_slot: bool,
    /// Pass names of this frame; pass `i` owns slot `i + 1`.
    passes: Vec<String>,
    overflow_warned: bool,

    /// Slot names of frames whose readback is still in flight.
    in_flight: HashMap<u64, Vec<String>>,
    tx: flume::Sender<TimestampReadback>,
    rx: flume::Receiver<TimestampReadback>,
}

impl TimestampProfiler {
    pub fn new<D: GpuDevice + ?Sized>(device: &mut D, capacity: u32, enabled: bool) -> Self {
        let capacity = capacity.max(1);
        let query_set = device.create_query_set(capacity * 2);
        if query_set.is_none() {
            log::info!("timestamp queries unavailable; gpu profiling disabled");
        }
        let (tx, rx) = flume::unbounded();

        Self {
            capacity,
            query_set,
            enabled: enabled && query_set.is_some(),
            requested: None,
            period_ns: device.timestamp_period(),
            frame_slot: false,
            passes: Vec::new(),
            overflow_warned: false,
            in_flight: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.query_set.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Requests profiling on or off from the next frame on.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.requested = Some(enabled);
    }

    /// Resets the slot table, applies a pending enable request and, when
    /// enabled, reserves slot 0 for the frame itself.
    pub fn frame_start(&mut self) {
        if let Some(enabled) = self.requested.take() {
            if enabled && !self.is_supported() {
                log::warn!("gpu profiling requested but timestamp queries are unavailable");
            }
            self.enabled = enabled && self.is_supported();
            log::debug!("gpu profiling {}", if self.enabled { "on" } else { "off" });
        }

        self.passes.clear();
        self.frame_slot = self.enabled;
    }

    fn slot_count(&self) -> u32 {
        if self.frame_slot {
            self.passes.len() as u32 + 1
        } else {
            0
        }
    }

    /// The slot for `name` in the current frame, allocated on first use.
    ///
    /// `None` while disabled, or when the frame ran out of slots; rendering is
    /// unaffected either way.
    pub fn get_slot(&mut self, name: &str) -> Option<u32> {
        if !self.enabled || !self.frame_slot {
            return None;
        }
        if let Some(index) = self.passes.iter().position(|s| s == name) {
            return Some(FRAME_SLOT + 1 + index as u32);
        }
        if self.slot_count() >= self.capacity {
            if !self.overflow_warned {
                log::warn!(
                    "profiler capacity of {} slots exhausted; pass '{name}' not timed",
                    self.capacity
                );
                self.overflow_warned = true;
            }
            return None;
        }
        self.passes.push(name.to_owned());
        Some(self.passes.len() as u32)
    }

    /// Begin/end query indices for the pass `name`.
    pub fn pass_timestamp_writes(&mut self, name: &str) -> Option<PassTimestampWrites> {
        let query_set = self.query_set?;
        let slot = self.get_slot(name)?;
        Some(PassTimestampWrites {
            query_set,
            beginning_of_pass_write_index: slot * 2,
            end_of_pass_write_index: slot * 2 + 1,
        })
    }

    /// Query written when the frame begins.
    pub fn frame_begin_query(&self) -> Option<(QuerySetId, u32)> {
        self.frame_query(FRAME_SLOT * 2)
    }

    /// Query written when the frame ends.
    pub fn frame_end_query(&self) -> Option<(QuerySetId, u32)> {
        self.frame_query(FRAME_SLOT * 2 + 1)
    }

    fn frame_query(&self, index: u32) -> Option<(QuerySetId, u32)> {
        let query_set = self.query_set?;
        (self.enabled && self.frame_slot).then_some((query_set, index))
    }

    /// Records the resolve of this frame's queries into `encoder`.
    pub fn resolve<D: GpuDevice + ?Sized>(
        &self,
        device: &mut D,
        encoder: EncoderId,
    ) -> Option<ReadbackId> {
        let query_set = self.query_set?;
        if !self.enabled || !self.frame_slot {
            return None;
        }
        Some(device.resolve_query_set(encoder, query_set, self.slot_count() * 2))
    }

    /// Starts the asynchronous readback of a resolved frame. Must run after
    /// the resolve was submitted.
    pub fn request<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        readback: ReadbackId,
        render_version: u64,
    ) {
        self.in_flight.insert(render_version, self.passes.clone());
        let tx = self.tx.clone();
        device.map_readback(
            readback,
            Box::new(move |ticks| {
                let _ = tx.send(TimestampReadback {
                    render_version,
                    ticks,
                });
            }),
        );
    }

    /// Number of frames whose timings have not arrived yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Collects every readback that completed since the last call.
    pub fn poll(&mut self) -> Vec<ProfilerReport> {
        let mut reports = Vec::new();
        for readback in self.rx.try_iter() {
            let Some(names) = self.in_flight.remove(&readback.render_version) else {
                log::debug!(
                    "timestamps for unknown render version {}",
                    readback.render_version
                );
                continue;
            };
            let Some(ticks) = readback.ticks else {
                log::debug!(
                    "timestamps for render version {} lost",
                    readback.render_version
                );
                continue;
            };
            reports.push(self.report(readback.render_version, &names, &ticks));
        }
        reports
    }

    fn report(&self, render_version: u64, names: &[String], ticks: &[u64]) -> ProfilerReport {
        let to_ms = |slot: usize| -> f64 {
            match (ticks.get(slot * 2), ticks.get(slot * 2 + 1)) {
                (Some(&begin), Some(&end)) => {
                    end.saturating_sub(begin) as f64 * f64::from(self.period_ns) / 1_000_000.0
                }
                _ => 0.0,
            }
        };

        ProfilerReport {
            render_version,
            frame_ms: to_ms(FRAME_SLOT as usize),
            passes: names
                .iter()
                .enumerate()
                .map(|(i, name)| PassTiming {
                    name: name.clone(),
                    ms: to_ms(FRAME_SLOT as usize + 1 + i),
                })
                .collect(),
        }
    }
}
