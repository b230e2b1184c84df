//! Snapshot metrics computed from `SimState`.
//!
//! `compute_metrics(&SimState, &RiskAssessment) -> MetricsSnapshot` samples the
//! dashboard analytics. No state mutation, no IO; the CSV helpers below take
//! a caller-supplied writer or directory.

use crate::{Aspect, RiskAssessment, RiskLevel, SimState};
use serde::Serialize;
use std::io::Write;

/// Current schema version. Bump when fields are added/removed/reordered.
const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub now_ms: u64,
    pub metrics_version: u32,

    // Fleet
    pub trains_total: u32,
    pub trains_moving: u32,
    pub trains_stopping: u32,
    pub trains_halted: u32,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,

    // Risk
    pub risk_level: RiskLevel,
    pub min_distance_km: Option<f64>,
    pub conflict_count: u32,
    pub warning_zone_count: u32,

    // Signals
    pub signals_safe: u32,
    pub signals_caution: u32,
    pub signals_danger: u32,

    pub animating: bool,
    pub global_stop_active: bool,
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn count<T>(items: impl Iterator<Item = T>) -> u32 {
    to_u32(items.count())
}

pub fn compute_metrics(state: &SimState, assessment: &RiskAssessment) -> MetricsSnapshot {
    let trains = state.trains.as_slice();
    let trains_total = count(trains.iter());
    let trains_moving = count(trains.iter().filter(|t| t.speed > 0.0));
    let speed_sum: f64 = trains.iter().map(|t| t.speed).sum();
    let avg_speed_kmh = if trains.is_empty() {
        0.0
    } else {
        speed_sum / f64::from(trains_total)
    };
    let max_speed_kmh = trains.iter().map(|t| t.speed).fold(0.0_f64, f64::max);

    MetricsSnapshot {
        now_ms: state.meta.now_ms,
        metrics_version: METRICS_VERSION,
        trains_total,
        trains_moving,
        trains_stopping: count(state.stopping.iter()),
        trains_halted: trains_total - trains_moving,
        avg_speed_kmh,
        max_speed_kmh,
        risk_level: assessment.risk_level,
        min_distance_km: assessment.min_distance_km,
        conflict_count: count(assessment.conflicts.iter()),
        warning_zone_count: count(assessment.zones.iter()),
        signals_safe: to_u32(state.signals.count(Aspect::Safe)),
        signals_caution: to_u32(state.signals.count(Aspect::Caution)),
        signals_danger: to_u32(state.signals.count(Aspect::Danger)),
        animating: state.animating,
        global_stop_active: state.global_stop.in_progress(),
    }
}

fn risk_label(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Safe => "safe",
        RiskLevel::Warning => "warning",
        RiskLevel::Danger => "danger",
    }
}

/// Write the CSV header row for metrics.
pub fn write_metrics_header(writer: &mut impl std::io::Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "now_ms,metrics_version,\
         trains_total,trains_moving,trains_stopping,trains_halted,avg_speed_kmh,max_speed_kmh,\
         risk_level,min_distance_km,conflict_count,warning_zone_count,\
         signals_safe,signals_caution,signals_danger,\
         animating,global_stop_active"
    )
}

/// Append a single metrics snapshot as a CSV row. A missing minimum
/// distance is written as an empty cell.
pub fn append_metrics_row(
    writer: &mut impl std::io::Write,
    snapshot: &MetricsSnapshot,
) -> std::io::Result<()> {
    let min_distance = snapshot
        .min_distance_km
        .map(|d| format!("{d:.2}"))
        .unwrap_or_default();
    writeln!(
        writer,
        "{},{},{},{},{},{},{:.2},{:.2},{},{},{},{},{},{},{},{},{}",
        snapshot.now_ms,
        snapshot.metrics_version,
        snapshot.trains_total,
        snapshot.trains_moving,
        snapshot.trains_stopping,
        snapshot.trains_halted,
        snapshot.avg_speed_kmh,
        snapshot.max_speed_kmh,
        risk_label(snapshot.risk_level),
        min_distance,
        snapshot.conflict_count,
        snapshot.warning_zone_count,
        snapshot.signals_safe,
        snapshot.signals_caution,
        snapshot.signals_danger,
        snapshot.animating,
        snapshot.global_stop_active,
    )
}

/// Write a collection of snapshots to a CSV file.
pub fn write_metrics_csv(path: &std::path::Path, snapshots: &[MetricsSnapshot]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_metrics_header(&mut file)?;
    for snapshot in snapshots {
        append_metrics_row(&mut file, snapshot)?;
    }
    Ok(())
}

const MAX_ROWS_PER_FILE: usize = 50_000;

/// Rotating metrics CSV writer: `metrics_000.csv`, `metrics_001.csv`, ...
/// each holding at most `max_rows` data rows.
pub struct MetricsFileWriter {
    run_dir: std::path::PathBuf,
    file_index: u32,
    rows_in_current_file: usize,
    max_rows: usize,
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    pub fn new(run_dir: std::path::PathBuf) -> std::io::Result<Self> {
        Self::with_max_rows(run_dir, MAX_ROWS_PER_FILE)
    }

    pub fn with_max_rows(run_dir: std::path::PathBuf, max_rows: usize) -> std::io::Result<Self> {
        let writer = open_csv_file(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            file_index: 0,
            rows_in_current_file: 0,
            max_rows: max_rows.max(1),
            writer,
        })
    }

    pub fn write_row(&mut self, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
        if self.rows_in_current_file >= self.max_rows {
            self.writer.flush()?;
            self.file_index += 1;
            self.writer = open_csv_file(&self.run_dir, self.file_index)?;
            self.rows_in_current_file = 0;
        }
        append_metrics_row(&mut self.writer, snapshot)?;
        self.rows_in_current_file += 1;
        Ok(())
    }

    pub fn files_written(&self) -> u32 {
        self.file_index + 1
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn open_csv_file(
    run_dir: &std::path::Path,
    index: u32,
) -> std::io::Result<std::io::BufWriter<std::fs::File>> {
    let path = run_dir.join(format!("metrics_{index:03}.csv"));
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_metrics_header(&mut writer)?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_content, base_state};
    use crate::{collision::evaluate, Side, TrackId};

    fn assessment_for(state: &SimState) -> RiskAssessment {
        let content = base_content();
        evaluate(
            state.trains.as_slice(),
            &state.oncoming,
            &content.constants,
            content.capabilities,
        )
    }

    #[test]
    fn fleet_counts_and_speeds() {
        let content = base_content();
        let state = base_state(&content);
        let m = compute_metrics(&state, &assessment_for(&state));

        assert_eq!(m.trains_total, 3);
        assert_eq!(m.trains_moving, 3);
        assert_eq!(m.trains_halted, 0);
        assert_eq!(m.trains_stopping, 0);
        assert!((m.avg_speed_kmh - 60.0).abs() < 1e-9);
        assert!((m.max_speed_kmh - 72.0).abs() < 1e-9);
        assert!(!m.global_stop_active);
    }

    #[test]
    fn signal_aspect_counts() {
        let content = base_content();
        let mut state = base_state(&content);
        state.signals.cycle(&TrackId("track-a".to_string()), Side::Right);
        let m = compute_metrics(&state, &assessment_for(&state));
        assert_eq!(
            m.signals_safe + m.signals_caution + m.signals_danger,
            u32::try_from(state.signals.len()).unwrap()
        );
        assert_eq!(m.signals_danger, u32::try_from(state.signals.count(Aspect::Danger)).unwrap());
    }

    #[test]
    fn empty_registry_averages_to_zero() {
        let content = base_content();
        let mut state = base_state(&content);
        state.trains = crate::TrainRegistry::new(Vec::new(), 120.0);
        let m = compute_metrics(&state, &assessment_for(&state));
        assert_eq!(m.trains_total, 0);
        assert!(m.avg_speed_kmh.abs() < 1e-12);
    }

    #[test]
    fn csv_row_matches_header_width() {
        let content = base_content();
        let state = base_state(&content);
        let m = compute_metrics(&state, &assessment_for(&state));

        let mut buf = Vec::new();
        write_metrics_header(&mut buf).unwrap();
        append_metrics_row(&mut buf, &m).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), lines[1].split(',').count());
    }

    #[test]
    fn writer_rotates_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = base_content();
        let state = base_state(&content);
        let m = compute_metrics(&state, &assessment_for(&state));

        let mut writer = MetricsFileWriter::with_max_rows(dir.path().to_path_buf(), 2).unwrap();
        for _ in 0..5 {
            writer.write_row(&m).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(writer.files_written(), 3);
        let last = std::fs::read_to_string(dir.path().join("metrics_002.csv")).unwrap();
        assert_eq!(last.lines().count(), 2);
    }
}
