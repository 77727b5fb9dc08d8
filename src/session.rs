//! Recording-session lifecycle: start, accumulate, stop + summarise.

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::types::{Bpm, Session, SessionStatus};

/// Accumulates samples for one monitoring session at a time.
///
/// Not internally synchronised; drive it from the single event consumer
/// ([`crate::monitor::Monitor`]).
#[derive(Debug, Default)]
pub struct SessionAggregator {
    started_at: Option<DateTime<Utc>>,
    samples: Vec<f64>,
    heart_rates: Vec<Bpm>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_at(Utc::now());
    }

    /// Begin a session at `started_at`, discarding anything buffered.
    pub fn start_at(&mut self, started_at: DateTime<Utc>) {
        if self.is_active() {
            debug!("Session restarted; dropping {} buffered samples", self.samples.len());
        }
        self.started_at = Some(started_at);
        self.samples = Vec::new();
        self.heart_rates = Vec::new();
        info!("Session started at {started_at}");
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Append one sample and its heart-rate estimate.  No-op when inactive.
    pub fn on_sample(&mut self, mv: f64, bpm: Bpm) {
        if !self.is_active() {
            return;
        }
        self.samples.push(mv);
        self.heart_rates.push(bpm);
    }

    pub fn stop(&mut self) -> Option<Session> {
        self.stop_at(Utc::now())
    }

    /// End the session at `stopped_at` and summarise it.
    ///
    /// Returns `None` when inactive or when nothing was recorded.  Either way
    /// the aggregator is inactive and empty afterwards.
    pub fn stop_at(&mut self, stopped_at: DateTime<Utc>) -> Option<Session> {
        let started_at = self.started_at.take()?;
        let samples = std::mem::take(&mut self.samples);
        let heart_rates = std::mem::take(&mut self.heart_rates);

        if samples.is_empty() && heart_rates.is_empty() {
            info!("Session stopped with no samples; discarded");
            return None;
        }

        let duration_secs = (stopped_at - started_at).num_seconds().max(0) as u64;
        let avg_heart_rate = mean_bpm(&heart_rates);
        let (avg_ecg, min_ecg, max_ecg) = ecg_stats(&samples);

        let session = Session {
            id: Uuid::new_v4(),
            start_time: started_at,
            duration_secs,
            duration: format_duration(duration_secs),
            avg_ecg: round2(avg_ecg),
            min_ecg,
            max_ecg,
            avg_heart_rate,
            status: SessionStatus::from_avg_heart_rate(avg_heart_rate),
            sample_count: samples.len(),
            raw_samples: samples,
            raw_heart_rates: heart_rates,
            notes: None,
            saved_at: None,
        };
        info!(
            "Session {} stopped: {} samples over {}, avg {} bpm ({})",
            session.id, session.sample_count, session.duration, session.avg_heart_rate, session.status
        );
        Some(session)
    }
}

/// `"Xm Ys"` when at least a minute elapsed, otherwise `"Ys"`.
pub fn format_duration(secs: u64) -> String {
    let (m, s) = (secs / 60, secs % 60);
    if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

fn mean_bpm(heart_rates: &[Bpm]) -> Bpm {
    if heart_rates.is_empty() {
        return 0;
    }
    let sum: u64 = heart_rates.iter().map(|&b| b as u64).sum();
    (sum as f64 / heart_rates.len() as f64).round() as Bpm
}

/// `(mean, min, max)`; all zero for an empty slice.
fn ecg_stats(samples: &[f64]) -> (f64, f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let (sum, min, max) = samples.iter().fold(
        (0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(sum, min, max), &v| (sum + v, min.min(v), max.max(v)),
    );
    (sum / samples.len() as f64, min, max)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heart_rate::HeartRateEstimator;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:30:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn stop_without_samples_is_none() {
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        assert!(agg.stop_at(t0() + Duration::seconds(5)).is_none());
        assert!(!agg.is_active());
    }

    #[test]
    fn stop_when_never_started_is_none() {
        let mut agg = SessionAggregator::new();
        agg.on_sample(1.0, 60);
        assert_eq!(agg.sample_count(), 0);
        assert!(agg.stop().is_none());
    }

    #[test]
    fn single_sample_session() {
        let mut est = HeartRateEstimator::new();
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        let bpm = est.push(0.42);
        agg.on_sample(0.42, bpm);

        let s = agg.stop_at(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(s.min_ecg, 0.42);
        assert_eq!(s.max_ecg, 0.42);
        assert_eq!(s.avg_ecg, 0.42);
        assert_eq!(s.avg_heart_rate, bpm);
        assert_eq!(s.raw_samples, vec![0.42]);
        assert_eq!(s.sample_count, 1);
    }

    #[test]
    fn three_sample_summary() {
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        agg.on_sample(0.9, 60);
        agg.on_sample(1.1, 60);
        agg.on_sample(2.0, 66);

        let s = agg.stop_at(t0() + Duration::seconds(75)).unwrap();
        assert!((s.avg_ecg - 1.33).abs() < 1e-9);
        assert_eq!(s.min_ecg, 0.9);
        assert_eq!(s.max_ecg, 2.0);
        assert_eq!(s.avg_heart_rate, 62);
        // 62 is below the 65 bpm floor of the normal band.
        assert_eq!(s.status, SessionStatus::Low);
        assert_eq!(s.duration_secs, 75);
        assert_eq!(s.duration, "1m 15s");
        assert_eq!(s.start_time, t0());
        assert_eq!(s.raw_heart_rates, vec![60, 60, 66]);
    }

    #[test]
    fn buffers_are_drained_exactly_once() {
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        agg.on_sample(1.0, 70);
        assert!(agg.stop_at(t0()).is_some());
        assert_eq!(agg.sample_count(), 0);
        assert!(agg.stop_at(t0()).is_none());
    }

    #[test]
    fn restart_discards_previous_buffers() {
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        agg.on_sample(1.0, 70);
        agg.start_at(t0() + Duration::seconds(10));
        assert_eq!(agg.sample_count(), 0);
    }

    #[test]
    fn session_ids_are_unique() {
        let mut agg = SessionAggregator::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            agg.start_at(t0());
            agg.on_sample(1.0, 70);
            ids.push(agg.stop_at(t0()).unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn status_follows_average() {
        for (bpm, status) in [
            (64, SessionStatus::Low),
            (65, SessionStatus::Normal),
            (85, SessionStatus::Normal),
            (86, SessionStatus::Elevated),
        ] {
            let mut agg = SessionAggregator::new();
            agg.start_at(t0());
            agg.on_sample(1.0, bpm);
            assert_eq!(agg.stop_at(t0()).unwrap().status, status);
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(3_725), "62m 5s");
    }

    #[test]
    fn clock_going_backwards_yields_zero_duration() {
        let mut agg = SessionAggregator::new();
        agg.start_at(t0());
        agg.on_sample(1.0, 70);
        let s = agg.stop_at(t0() - Duration::seconds(3)).unwrap();
        assert_eq!(s.duration_secs, 0);
        assert_eq!(s.duration, "0s");
    }
}
