//! In-process metrics for `/health`.
//!
//! Every instrument lives in one map keyed by its rendered name, e.g.
//! `turns.completed{outcome=cancelled}`. Labels are sorted before rendering.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Histograms keep a sliding window of the latest observations.
const HISTOGRAM_WINDOW: usize = 2048;

enum Instrument {
    Counter(AtomicU64),
    /// `f64` bit pattern.
    Gauge(AtomicU64),
    Histogram(Mutex<VecDeque<f64>>),
}

impl Instrument {
    fn counter() -> Self {
        Self::Counter(AtomicU64::new(0))
    }

    fn gauge() -> Self {
        Self::Gauge(AtomicU64::new(0f64.to_bits()))
    }

    fn histogram() -> Self {
        Self::Histogram(Mutex::new(VecDeque::with_capacity(64)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub mean: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
}

impl HistogramSummary {
    fn from_window(window: &VecDeque<f64>) -> Self {
        if window.is_empty() {
            return Self::default();
        }
        let mut sorted: Vec<f64> = window.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let rank = |q: f64| sorted[((count - 1) as f64 * q).round() as usize];
        Self {
            count: count as u64,
            mean: sorted.iter().sum::<f64>() / count as f64,
            max: sorted[count - 1],
            p50: rank(0.50),
            p95: rank(0.95),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

fn metric_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted = labels.to_vec();
    sorted.sort_unstable();
    let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

#[derive(Default)]
pub struct MetricsRecorder {
    instruments: RwLock<HashMap<String, Instrument>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        self.with(name, labels, Instrument::counter, |inst| {
            if let Instrument::Counter(c) = inst {
                c.fetch_add(n, Ordering::Relaxed);
            }
        });
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.with(name, labels, Instrument::gauge, |inst| {
            if let Instrument::Gauge(g) = inst {
                g.store(value.to_bits(), Ordering::Relaxed);
            }
        });
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.with(name, labels, Instrument::histogram, |inst| {
            if let Instrument::Histogram(h) = inst {
                let mut window = h.lock();
                if window.len() == HISTOGRAM_WINDOW {
                    let _ = window.pop_front();
                }
                window.push_back(value);
            }
        });
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        match self.instruments.read().get(&metric_key(name, labels)) {
            Some(Instrument::Counter(c)) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        match self.instruments.read().get(&metric_key(name, labels)) {
            Some(Instrument::Gauge(g)) => f64::from_bits(g.load(Ordering::Relaxed)),
            _ => 0.0,
        }
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        match self.instruments.read().get(&metric_key(name, labels)) {
            Some(Instrument::Histogram(h)) => HistogramSummary::from_window(&h.lock()),
            _ => HistogramSummary::default(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snap = MetricsSnapshot::default();
        for (key, inst) in self.instruments.read().iter() {
            match inst {
                Instrument::Counter(c) => {
                    let _ = snap.counters.insert(key.clone(), c.load(Ordering::Relaxed));
                }
                Instrument::Gauge(g) => {
                    let _ = snap.gauges.insert(key.clone(), f64::from_bits(g.load(Ordering::Relaxed)));
                }
                Instrument::Histogram(h) => {
                    let _ = snap.histograms.insert(key.clone(), HistogramSummary::from_window(&h.lock()));
                }
            }
        }
        snap
    }

    /// Run `update` on the instrument for this key, creating it on first use.
    /// A key first registered as another kind is left untouched.
    fn with(&self, name: &str, labels: &[(&str, &str)], make: fn() -> Instrument, update: impl Fn(&Instrument)) {
        let key = metric_key(name, labels);
        if let Some(inst) = self.instruments.read().get(&key) {
            update(inst);
            return;
        }
        let mut instruments = self.instruments.write();
        update(instruments.entry(key).or_insert_with(make));
    }
}
