//! Core vocabulary of the cognitive loop
//!
//! Steps, phases, engines, links, and the shared cognitive state. Everything
//! here is pure data — the live machine is in `echoloop-runtime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Length of the cognitive cycle. Every step number reduces mod 12 into [1, 12].
pub const CYCLE_LENGTH: u32 = 12;

/// Human-readable names for the 12 steps, indexed by `step - 1`.
pub const STEP_NAMES: [&str; 12] = [
    "Perception & Attention",
    "Memory Activation",
    "Action Generation",
    "Action Execution",
    "Relevance Realization (Present)",
    "Scenario Simulation",
    "Outcome Evaluation",
    "Model Update",
    "Learning Consolidation",
    "Insight Generation",
    "Relevance Realization (Future)",
    "Meta-Cognitive Reflection",
];

/// Reserved key in `StepResult::state_updates`: a string value under this key
/// sets `CognitiveState::present_commitment` instead of landing in the map.
pub const PRESENT_COMMITMENT_KEY: &str = "present_commitment";

// ---------------------------------------------------------------------------
// Arena indices
// ---------------------------------------------------------------------------

/// Index into the scheduler's engine arena. Cross-references between engines,
/// links, and triads are these indices, never owning pointers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EngineId(pub usize);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Index into the scheduler's link arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LinkId(pub usize);

/// Index into the scheduler's triad arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TriadId(pub usize);

// ---------------------------------------------------------------------------
// Steps and phases
// ---------------------------------------------------------------------------

/// Cognitive function of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// Pivotal orienting step (present commitment).
    RelevanceRealization,
    /// Actual interaction step (past performance).
    AffordanceInteraction,
    /// Virtual simulation step (future potential).
    SalienceSimulation,
}

impl StepType {
    /// Step type for a step number in [1, 12]: steps 1 and 7 are pivotal
    /// relevance realization, 2-6 affordance interaction, 8-12 salience
    /// simulation.
    pub fn for_step(step: u32) -> Self {
        match step {
            1 | 7 => StepType::RelevanceRealization,
            2..=6 => StepType::AffordanceInteraction,
            _ => StepType::SalienceSimulation,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepType::RelevanceRealization => "RelevanceRealization",
            StepType::AffordanceInteraction => "AffordanceInteraction",
            StepType::SalienceSimulation => "SalienceSimulation",
        };
        write!(f, "{}", name)
    }
}

/// One of the three phases of the 12-step cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Steps 1-4: reactive, action-oriented.
    Expressive,
    /// Steps 5-8: introspective, evaluation-oriented.
    Reflective,
    /// Steps 9-12: anticipatory, simulation-oriented.
    Anticipatory,
}

impl Phase {
    /// Phase for a step number in [1, 12].
    pub fn for_step(step: u32) -> Self {
        match step {
            1..=4 => Phase::Expressive,
            5..=8 => Phase::Reflective,
            _ => Phase::Anticipatory,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Phase::Expressive => 0,
            Phase::Reflective => 1,
            Phase::Anticipatory => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Expressive => "Expressive",
            Phase::Reflective => "Reflective",
            Phase::Anticipatory => "Anticipatory",
        };
        write!(f, "{}", name)
    }
}

/// Human-readable name for a step number in [1, 12].
pub fn step_name(step: u32) -> &'static str {
    STEP_NAMES[((step - 1) % CYCLE_LENGTH) as usize]
}

// ---------------------------------------------------------------------------
// Engine specialization
// ---------------------------------------------------------------------------

/// Cognitive role of an engine. Assigned cyclically by engine index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specialization {
    Perception,
    Action,
    Reflection,
    Anticipation,
}

impl Specialization {
    pub fn for_index(index: usize) -> Self {
        match index % 4 {
            0 => Specialization::Perception,
            1 => Specialization::Action,
            2 => Specialization::Reflection,
            _ => Specialization::Anticipation,
        }
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Specialization::Perception => "Perception",
            Specialization::Action => "Action",
            Specialization::Reflection => "Reflection",
            Specialization::Anticipation => "Anticipation",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Step results and task history
// ---------------------------------------------------------------------------

/// What a `StepHandler` hands back to the scheduler for merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    /// Key/value updates merged into shared state, last-writer-wins per key.
    pub state_updates: HashMap<String, serde_json::Value>,
    /// Insight texts appended to the bounded insight list.
    pub insights: Vec<String>,
    /// Load reported by the handler, folded into the shared load by EMA.
    pub cognitive_load: f64,
}

impl StepResult {
    /// The result recorded when a handler errors or times out. The step still
    /// completes with it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.success && self.state_updates.is_empty() && self.insights.is_empty()
    }
}

/// One completed handler invocation in an engine's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub step: u32,
    pub step_type: StepType,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Link messages
// ---------------------------------------------------------------------------

/// A message sent over a link between two engines. Delivery is best-effort:
/// a full queue drops the message and bumps the link's drop counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkMessage {
    pub from: EngineId,
    pub to: EngineId,
    pub kind: String,
    pub content: String,
    pub priority: f64,
    pub timestamp: DateTime<Utc>,
}

impl LinkMessage {
    pub fn new(from: EngineId, to: EngineId, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: kind.into(),
            content: content.into(),
            priority: 0.5,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared cognitive state
// ---------------------------------------------------------------------------

/// An insight with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    pub engine: EngineId,
    pub step: u32,
    pub timestamp: DateTime<Utc>,
}

/// Working-memory bag shared by all engines.
///
/// Owned exclusively by the scheduler; engines only ever receive clones and
/// submit `StepResult`s back. All mutation goes through [`CognitiveState::apply`],
/// which the scheduler calls under its state lock in engine-id ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveState {
    /// Bounded insight list — oldest evicted past `insight_retention`.
    pub insights: VecDeque<Insight>,
    pub state_updates: HashMap<String, serde_json::Value>,
    pub cognitive_load: f64,
    pub present_commitment: Option<String>,
    insight_retention: usize,
}

impl CognitiveState {
    pub fn new(insight_retention: usize) -> Self {
        Self {
            insights: VecDeque::new(),
            state_updates: HashMap::new(),
            cognitive_load: 0.0,
            present_commitment: None,
            insight_retention: insight_retention.max(1),
        }
    }

    /// Merge one engine's result. Per key last-writer-wins; the reserved
    /// `present_commitment` key updates the commitment field instead.
    pub fn apply(&mut self, engine: EngineId, step: u32, result: &StepResult) {
        for (key, value) in &result.state_updates {
            if key == PRESENT_COMMITMENT_KEY {
                if let Some(text) = value.as_str() {
                    self.present_commitment = Some(text.to_string());
                }
                continue;
            }
            self.state_updates.insert(key.clone(), value.clone());
        }

        for text in &result.insights {
            self.insights.push_back(Insight {
                text: text.clone(),
                engine,
                step,
                timestamp: Utc::now(),
            });
            while self.insights.len() > self.insight_retention {
                self.insights.pop_front();
            }
        }

        if result.success {
            self.cognitive_load = self.cognitive_load * 0.8 + result.cognitive_load * 0.2;
        }
    }

    pub fn insight_retention(&self) -> usize {
        self.insight_retention
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Per-engine counters surfaced in [`Metrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub id: EngineId,
    pub specialization: Specialization,
    pub steps_processed: u64,
    pub performance: f64,
}

/// Aggregate scheduler metrics. Cheap to clone; `Scheduler::metrics` returns
/// a point-in-time copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_steps: u64,
    pub total_cycles: u64,
    pub current_step: u32,
    pub handler_errors: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    /// Cumulative handler latency per step index, `[step - 1]`.
    pub step_latency_ms: [u64; CYCLE_LENGTH as usize],
    pub engines: Vec<EngineMetrics>,
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_type_mapping_covers_the_cycle() {
        assert_eq!(StepType::for_step(1), StepType::RelevanceRealization);
        assert_eq!(StepType::for_step(7), StepType::RelevanceRealization);
        for step in 2..=6 {
            assert_eq!(StepType::for_step(step), StepType::AffordanceInteraction);
        }
        for step in 8..=12 {
            assert_eq!(StepType::for_step(step), StepType::SalienceSimulation);
        }
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(Phase::for_step(1), Phase::Expressive);
        assert_eq!(Phase::for_step(4), Phase::Expressive);
        assert_eq!(Phase::for_step(5), Phase::Reflective);
        assert_eq!(Phase::for_step(8), Phase::Reflective);
        assert_eq!(Phase::for_step(9), Phase::Anticipatory);
        assert_eq!(Phase::for_step(12), Phase::Anticipatory);
    }

    #[test]
    fn specialization_cycles_by_index() {
        assert_eq!(Specialization::for_index(0), Specialization::Perception);
        assert_eq!(Specialization::for_index(3), Specialization::Anticipation);
        assert_eq!(Specialization::for_index(4), Specialization::Perception);
    }

    #[test]
    fn insights_are_bounded() {
        let mut state = CognitiveState::new(3);
        let result = StepResult {
            success: true,
            insights: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..Default::default()
        };
        state.apply(EngineId(0), 1, &result);
        assert_eq!(state.insights.len(), 3);
        // Oldest evicted first
        assert_eq!(state.insights.front().unwrap().text, "b");
        assert_eq!(state.insights.back().unwrap().text, "d");
    }

    #[test]
    fn present_commitment_key_is_reserved() {
        let mut state = CognitiveState::new(8);
        let mut updates = HashMap::new();
        updates.insert(
            PRESENT_COMMITMENT_KEY.to_string(),
            serde_json::json!("focus on the build"),
        );
        updates.insert("other".to_string(), serde_json::json!(42));
        let result = StepResult {
            success: true,
            state_updates: updates,
            ..Default::default()
        };
        state.apply(EngineId(1), 5, &result);

        assert_eq!(state.present_commitment.as_deref(), Some("focus on the build"));
        assert!(!state.state_updates.contains_key(PRESENT_COMMITMENT_KEY));
        assert_eq!(state.state_updates["other"], serde_json::json!(42));
    }

    #[test]
    fn cognitive_state_serialization_roundtrip() {
        let mut state = CognitiveState::new(5);
        state.apply(
            EngineId(2),
            9,
            &StepResult {
                success: true,
                insights: vec!["echo".into()],
                cognitive_load: 0.5,
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        let restored: CognitiveState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.insights.len(), 1);
        assert_eq!(restored.insight_retention(), 5);
    }
}
