//! Rule engine, layer 1 of the decision pipeline
//!
//! Rules are fixed predicate → fixed-response pairs evaluated per packet,
//! ordered by priority, each with its own cooldown. A firing rule short-
//! circuits the LLM tiers entirely, which is what keeps safety-critical
//! coaching cues (back rounding, knee cave) inside the latency budget.
//!
//! Engine state is per session and owned by that session's decision task.
//! A mode change resets the engine completely: cooldowns stamped under one
//! mode must not suppress rules of another.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use redi_core::{JointName, LightLevel, MovementPhase, PerceptionPacket, SessionMode};

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Form,
    Safety,
    Encouragement,
    Alert,
}

/// A single coaching rule
pub struct Rule {
    pub id: &'static str,
    pub name: &'static str,
    pub modes: &'static [SessionMode],
    pub predicate: fn(&PerceptionPacket) -> bool,
    pub response: &'static str,
    /// Higher fires first
    pub priority: i32,
    pub cooldown_ms: u64,
    pub category: RuleCategory,
}

/// Outcome of one rule evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Fixed response of the fired rule, if any
    pub response: Option<String>,
    pub rule_id: Option<&'static str>,
    /// When a rule fired, the LLM tiers are skipped
    pub skip_ai: bool,
}

impl RuleOutcome {
    fn silent() -> Self {
        Self {
            response: None,
            rule_id: None,
            skip_ai: false,
        }
    }

    pub fn triggered(&self) -> bool {
        self.response.is_some()
    }
}

fn spine_angle(packet: &PerceptionPacket) -> Option<f32> {
    packet.pose.as_ref().map(|p| p.angles.spine_angle)
}

fn spine_rounding(packet: &PerceptionPacket) -> bool {
    spine_angle(packet).is_some_and(|a| a > 20.0)
}

fn knee_cave(packet: &PerceptionPacket) -> bool {
    let Some(pose) = &packet.pose else {
        return false;
    };
    let inward_left = match (pose.joint(JointName::LeftKnee), pose.joint(JointName::LeftAnkle)) {
        (Some(knee), Some(ankle)) => knee.x > ankle.x + 0.02,
        _ => false,
    };
    let inward_right = match (
        pose.joint(JointName::RightKnee),
        pose.joint(JointName::RightAnkle),
    ) {
        (Some(knee), Some(ankle)) => knee.x < ankle.x - 0.02,
        _ => false,
    };
    inward_left || inward_right
}

fn good_rep(packet: &PerceptionPacket) -> bool {
    let clean_spine = spine_angle(packet).is_some_and(|a| a < 15.0);
    packet
        .movement
        .as_ref()
        .is_some_and(|m| m.phase == MovementPhase::Transition && m.is_repetitive)
        && clean_spine
}

fn full_lockout(packet: &PerceptionPacket) -> bool {
    packet
        .movement
        .as_ref()
        .is_some_and(|m| m.phase == MovementPhase::Isometric)
        && packet
            .pose
            .as_ref()
            .is_some_and(crate::pose_math::is_locked_out)
}

fn shallow_squat(packet: &PerceptionPacket) -> bool {
    packet
        .movement
        .as_ref()
        .is_some_and(|m| m.phase == MovementPhase::Transition && m.is_repetitive)
        && packet.pose.as_ref().is_some_and(|pose| {
            crate::pose_math::squat_depth(pose) == Some(crate::pose_math::SquatDepth::AboveParallel)
        })
}

fn posture_slump(packet: &PerceptionPacket) -> bool {
    spine_angle(packet).is_some_and(|a| a > 30.0)
}

fn dark_room(packet: &PerceptionPacket) -> bool {
    packet.light_level == LightLevel::Dark
}

fn wrist_tension(packet: &PerceptionPacket) -> bool {
    let Some(pose) = &packet.pose else {
        return false;
    };
    let tense = |wrist, elbow| match (pose.joint(wrist), pose.joint(elbow)) {
        (Some(w), Some(e)) => (w.y - e.y).abs() > 0.15,
        _ => false,
    };
    tense(JointName::LeftWrist, JointName::LeftElbow)
        || tense(JointName::RightWrist, JointName::RightElbow)
}

const SPORTS: &[SessionMode] = &[SessionMode::Sports];
const STUDYING: &[SessionMode] = &[SessionMode::Studying];
const MUSIC: &[SessionMode] = &[SessionMode::Music];

/// The built-in rule set. `general`, `meeting`, `assembly`, `monitoring`,
/// and `cooking` carry no rules and fall straight through to triage.
pub static RULES: &[Rule] = &[
    Rule {
        id: "spine-rounding",
        name: "Spine rounding",
        modes: SPORTS,
        predicate: spine_rounding,
        response: "Back rounding",
        priority: 10,
        cooldown_ms: 5_000,
        category: RuleCategory::Form,
    },
    Rule {
        id: "knee-cave",
        name: "Knee cave",
        modes: SPORTS,
        predicate: knee_cave,
        response: "Knees out",
        priority: 9,
        cooldown_ms: 3_000,
        category: RuleCategory::Form,
    },
    Rule {
        id: "shallow-squat",
        name: "Shallow squat",
        modes: SPORTS,
        predicate: shallow_squat,
        response: "Deeper",
        priority: 7,
        cooldown_ms: 8_000,
        category: RuleCategory::Form,
    },
    Rule {
        id: "good-rep",
        name: "Good rep",
        modes: SPORTS,
        predicate: good_rep,
        response: "Good",
        priority: 3,
        cooldown_ms: 10_000,
        category: RuleCategory::Encouragement,
    },
    Rule {
        id: "full-lockout",
        name: "Full lockout",
        modes: SPORTS,
        predicate: full_lockout,
        response: "Full lockout",
        priority: 2,
        cooldown_ms: 10_000,
        category: RuleCategory::Encouragement,
    },
    Rule {
        id: "posture-slump",
        name: "Posture slump",
        modes: STUDYING,
        predicate: posture_slump,
        response: "Sit up straight",
        priority: 5,
        cooldown_ms: 60_000,
        category: RuleCategory::Form,
    },
    Rule {
        id: "dark-room",
        name: "Dark room",
        modes: STUDYING,
        predicate: dark_room,
        response: "More light would help",
        priority: 4,
        cooldown_ms: 120_000,
        category: RuleCategory::Alert,
    },
    Rule {
        id: "wrist-tension",
        name: "Wrist tension",
        modes: MUSIC,
        predicate: wrist_tension,
        response: "Relax wrists",
        priority: 6,
        cooldown_ms: 15_000,
        category: RuleCategory::Form,
    },
];

/// Per-session rule engine state
pub struct RuleEngine {
    last_fired: HashMap<&'static str, u64>,
    rep_counter: u32,
    set_counter: u32,
    last_form_check_ms: Option<u64>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            last_fired: HashMap::new(),
            rep_counter: 0,
            set_counter: 0,
            last_form_check_ms: None,
        }
    }

    /// Evaluate rules applicable to `mode` against one packet.
    ///
    /// Rules are considered in stable priority order (highest first);
    /// the first rule outside its cooldown whose predicate holds fires,
    /// stamps its cooldown, and short-circuits the rest.
    pub fn evaluate(
        &mut self,
        packet: &PerceptionPacket,
        mode: SessionMode,
        now_ms: u64,
    ) -> RuleOutcome {
        let mut applicable: Vec<&Rule> =
            RULES.iter().filter(|r| r.modes.contains(&mode)).collect();
        applicable.sort_by_key(|r| std::cmp::Reverse(r.priority));

        for rule in applicable {
            if let Some(&last) = self.last_fired.get(rule.id) {
                if now_ms.saturating_sub(last) < rule.cooldown_ms {
                    continue;
                }
            }
            let fired = catch_unwind(AssertUnwindSafe(|| (rule.predicate)(packet)));
            match fired {
                Ok(true) => {
                    self.last_fired.insert(rule.id, now_ms);
                    if rule.category == RuleCategory::Form {
                        self.last_form_check_ms = Some(now_ms);
                    }
                    tracing::debug!(rule = rule.id, priority = rule.priority, "rule fired");
                    return RuleOutcome {
                        response: Some(rule.response.to_string()),
                        rule_id: Some(rule.id),
                        skip_ai: true,
                    };
                }
                Ok(false) => {}
                Err(_) => {
                    tracing::warn!(rule = rule.id, "rule predicate panicked; skipping");
                }
            }
        }

        RuleOutcome::silent()
    }

    /// Advance the rep counter from the packet's movement analysis.
    ///
    /// Returns true when the device-reported count exceeds the stored
    /// counter (a new rep completed).
    pub fn update_reps(&mut self, packet: &PerceptionPacket) -> bool {
        let Some(movement) = &packet.movement else {
            return false;
        };
        if !movement.is_repetitive {
            return false;
        }
        match movement.rep_count {
            Some(count) if count > self.rep_counter => {
                self.rep_counter = count;
                true
            }
            _ => false,
        }
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_counter
    }

    pub fn set_count(&self) -> u32 {
        self.set_counter
    }

    /// Close the current set and bump the set counter
    pub fn complete_set(&mut self) {
        self.set_counter += 1;
        self.rep_counter = 0;
    }

    /// Whether any cooldown is currently stamped (used by tests and
    /// diagnostics; cleared by [`RuleEngine::reset`]).
    pub fn has_active_cooldowns(&self) -> bool {
        !self.last_fired.is_empty()
    }

    /// Full reset on mode change: cooldowns, rep and set counters.
    pub fn reset(&mut self) {
        self.last_fired.clear();
        self.rep_counter = 0;
        self.set_counter = 0;
        self.last_form_check_ms = None;
    }
}
