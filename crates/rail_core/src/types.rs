//! Type definitions for `rail_core`.
//!
//! All public types, structs, enums, and ID newtypes used by the simulation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::registry::TrainRegistry;
use crate::signals::SignalController;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(TrainId);
string_id!(TrackId);
string_id!(MarkerId);
string_id!(CommandId);
string_id!(EventId);
string_id!(OperatorId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Left => "left",
            Side::Right => "right",
        })
    }
}

/// Signal aspect. Cycles `Safe → Caution → Danger → Safe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Safe,
    Caution,
    Danger,
}

impl std::fmt::Display for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Aspect::Safe => "safe",
            Aspect::Caution => "caution",
            Aspect::Danger => "danger",
        })
    }
}

/// Risk tier, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSeverity {
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Destructive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CollisionZones,
    TrackOffset,
    PerTrainStop,
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimState {
    pub meta: MetaState,
    pub trains: TrainRegistry,
    pub signals: SignalController,
    /// Approaching vehicles reported over the radio link. Static for the run.
    pub oncoming: Vec<OncomingMarker>,
    /// Trains currently under emergency deceleration.
    pub stopping: BTreeSet<TrainId>,
    pub animating: bool,
    pub global_stop: GlobalStopPhase,
    /// Scrolling offset of the track artwork, percent. Only moves with the
    /// `track_offset` capability.
    pub track_offset: f64,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    /// Simulation clock in milliseconds since start.
    pub now_ms: u64,
    pub content_version: String,
    pub motion_ticks: u64,
    pub decay_ticks: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GlobalStopPhase {
    Idle,
    Activated { started_ms: u64 },
    Braking { started_ms: u64 },
}

impl GlobalStopPhase {
    pub fn in_progress(self) -> bool {
        !matches!(self, GlobalStopPhase::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub label: String,
    pub color: String,
    pub track: TrackId,
    /// Percentage along the track, `[0, 100)`.
    pub position: f64,
    /// km/h, `[0, max_speed_kmh]`.
    pub speed: f64,
    pub direction: Direction,
    /// km to the nearest known hazard.
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    pub track: TrackId,
    pub side: Side,
    #[serde(rename = "state")]
    pub aspect: Aspect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OncomingMarker {
    pub id: MarkerId,
    pub label: String,
    pub track: TrackId,
    pub position: f64,
    pub direction: Direction,
}

// ---------------------------------------------------------------------------
// Risk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionZone {
    pub track: TrackId,
    pub start: f64,
    pub end: f64,
    pub severity: ZoneSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConflictParty {
    Train(TrainId),
    Oncoming(MarkerId),
}

/// A same-track, opposite-direction pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub track: TrackId,
    pub train_id: TrainId,
    pub other: ConflictParty,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// `None` when there is nothing to measure against.
    pub min_distance_km: Option<f64>,
    pub conflicts: Vec<Conflict>,
    pub zones: Vec<CollisionZone>,
}

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub issued_by: OperatorId,
    pub issued_at_ms: u64,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SetSpeed { train_id: TrainId, speed: f64 },
    ToggleAnimation,
    StopTrain { train_id: TrainId },
    EmergencyStopAll,
    CycleSignal { track_id: TrackId, side: Side },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CommandOutcome {
    Applied,
    Rejected(RejectReason),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

/// Why a command was absorbed as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    UnknownTrain { train_id: TrainId },
    UnknownSignal { track_id: TrackId, side: Side },
    AlreadyStopping { train_id: TrainId },
    AlreadyStopped { train_id: TrainId },
    GlobalStopInProgress,
    CapabilityDisabled { capability: Capability },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownTrain { train_id } => write!(f, "unknown train {train_id}"),
            RejectReason::UnknownSignal { track_id, side } => {
                write!(f, "no {side} signal on track {track_id}")
            }
            RejectReason::AlreadyStopping { train_id } => {
                write!(f, "train {train_id} is already stopping")
            }
            RejectReason::AlreadyStopped { train_id } => {
                write!(f, "train {train_id} is already at standstill")
            }
            RejectReason::GlobalStopInProgress => f.write_str("emergency stop already in progress"),
            RejectReason::CapabilityDisabled { capability } => {
                write!(f, "capability {capability:?} is disabled")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub at_ms: u64,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// `train_id` is `None` for the all-trains stop.
    EmergencyActivated {
        train_id: Option<TrainId>,
    },
    BrakingInProgress,
    TrainStopped {
        train_id: TrainId,
    },
    AllTrainsStopped,
    SignalUpdated {
        track_id: TrackId,
        side: Side,
        aspect: Aspect,
    },
    SpeedSet {
        train_id: TrainId,
        speed: f64,
    },
    AnimationToggled {
        animating: bool,
    },
    RiskChanged {
        from: RiskLevel,
        to: RiskLevel,
        min_distance_km: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailContent {
    pub content_version: String,
    pub scenario: ScenarioDef,
    pub constants: Constants,
    pub capabilities: Capabilities,
}

/// Seed data the simulation starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub trains: Vec<Train>,
    pub signals: Vec<SignalState>,
    #[serde(default)]
    pub oncoming: Vec<OncomingMarker>,
    #[serde(default = "default_true")]
    pub animating: bool,
}

fn default_true() -> bool {
    true
}

/// How a position that runs off the end of the track re-enters it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WrapPolicy {
    /// `position mod 100`.
    Modulo,
    /// Jump back to `offset` once the position passes `threshold`.
    Reset { threshold: f64, offset: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    pub motion_tick_ms: u64,
    pub stop_decay_tick_ms: u64,
    pub stop_decay_step_kmh: f64,
    /// Granularity of operator speed set-points.
    pub speed_step_kmh: f64,
    pub max_speed_kmh: f64,
    /// Position advances by `speed / position_divisor` percent per motion tick.
    pub position_divisor: f64,
    pub wrap: WrapPolicy,
    pub track_offset_step: f64,
    pub braking_notice_delay_ms: u64,
    pub stopped_notice_delay_ms: u64,
    /// The all-trains stop also decelerates every moving train.
    pub global_stop_brakes_all: bool,
    /// Track point that oncoming-marker distances are measured from.
    pub reference_position: f64,
    pub km_per_percent: f64,
    pub warning_distance_km: f64,
    pub danger_distance_km: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            motion_tick_ms: 50,
            stop_decay_tick_ms: 200,
            stop_decay_step_kmh: 5.0,
            speed_step_kmh: 5.0,
            max_speed_kmh: 120.0,
            position_divisor: 1000.0,
            wrap: WrapPolicy::Modulo,
            track_offset_step: 0.5,
            braking_notice_delay_ms: 2000,
            stopped_notice_delay_ms: 4000,
            global_stop_brakes_all: true,
            reference_position: 50.0,
            km_per_percent: 0.1,
            warning_distance_km: 2.0,
            danger_distance_km: 1.0,
        }
    }
}

/// Feature switches for the dashboard variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub collision_zones: bool,
    pub track_offset: bool,
    pub per_train_stop: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            collision_zones: true,
            track_offset: false,
            per_train_stop: true,
        }
    }
}

impl Capabilities {
    pub fn enabled(self, capability: Capability) -> bool {
        match capability {
            Capability::CollisionZones => self.collision_zones,
            Capability::TrackOffset => self.track_offset,
            Capability::PerTrainStop => self.per_train_stop,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only view handed to renderers. Shares the train collection with the
/// simulation; later ticks replace the simulation's copy, never this one.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub now_ms: u64,
    pub animating: bool,
    pub global_stop_active: bool,
    pub track_offset: f64,
    pub trains: TrainRegistry,
    pub signals: Vec<SignalState>,
    pub stopping: Vec<TrainId>,
    pub risk: RiskAssessment,
}
