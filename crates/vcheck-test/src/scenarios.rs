//! End-to-end liveness scenarios
//!
//! Each scenario plays scripted users through the engine simulator until a
//! session succeeds or the attempt budget is gone, then checks the runs
//! against the rules every session must obey.

use vcheck_core::{LivenessConfig, VCheckResult};
use vcheck_liveness::{LivenessEvent, SessionOutcome};

use crate::{EngineSimulator, ScriptedUser, SessionRun, SimulationConfig};

// ============================================================================
// REPORT
// ============================================================================

/// Runs of one scenario plus any rule violations found in them
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub runs: Vec<SessionRun>,
    pub violations: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        self.runs.iter().map(|run| run.outcome).collect()
    }

    pub fn final_outcome(&self) -> Option<SessionOutcome> {
        self.runs.last().map(|run| run.outcome)
    }
}

/// Play users from `user_for` until success, at most `max_sessions` times
pub fn run_scenario<F>(
    config: LivenessConfig,
    simulation: SimulationConfig,
    max_sessions: usize,
    mut user_for: F,
) -> VCheckResult<ScenarioReport>
where
    F: FnMut(u32) -> ScriptedUser,
{
    let mut sim = EngineSimulator::new(config, simulation)?;
    let runs = sim.run_attempts(max_sessions, |attempt| user_for(attempt.get()))?;
    let violations = check_runs(&runs, sim.events(), sim.engine().config().max_attempts);
    Ok(ScenarioReport { runs, violations })
}

fn check_runs(runs: &[SessionRun], events: &[LivenessEvent], max_attempts: u32) -> Vec<String> {
    let mut violations = Vec::new();

    for (i, run) in runs.iter().enumerate() {
        // Only a completed session hands off a video
        if run.outcome.is_success() != run.video.is_some() {
            violations.push(format!("run {i}: outcome {:?} with video {:?}", run.outcome, run.video));
        }
        if run.recorded > run.frames {
            violations.push(format!("run {i}: recorded {} of {} frames", run.recorded, run.frames));
        }
        if run.attempt.get() > max_attempts {
            violations.push(format!("run {i}: attempt {} beyond budget {max_attempts}", run.attempt));
        }
        if matches!(run.outcome, SessionOutcome::Completed { fail_open: true }) && run.attempt.get() != max_attempts {
            violations.push(format!("run {i}: failed open on attempt {}", run.attempt));
        }
    }

    // Attempts advance only on premature ends
    for pair in runs.windows(2) {
        let expected = match pair[0].outcome {
            SessionOutcome::PrematureEnd(_) => pair[0].attempt.next(),
            _ => pair[0].attempt,
        };
        if pair[1].attempt != expected {
            violations.push(format!(
                "attempt went from {} to {} after {:?}",
                pair[0].attempt, pair[1].attempt, pair[0].outcome
            ));
        }
    }

    let ended = events
        .iter()
        .filter(|event| matches!(event, LivenessEvent::SessionEnded { .. }))
        .count();
    if ended != runs.len() {
        violations.push(format!("{ended} SessionEnded events for {} sessions", runs.len()));
    }

    violations
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// A cooperative user passes on the first try
pub fn scenario_cooperative(seed: u64) -> VCheckResult<ScenarioReport> {
    run_scenario(LivenessConfig::default(), SimulationConfig::default(), 1, |_| {
        ScriptedUser::cooperative(seed)
    })
}

/// The room is too dark on every attempt; the last attempt fails open
pub fn scenario_dark_room() -> VCheckResult<ScenarioReport> {
    run_scenario(LivenessConfig::default(), SimulationConfig::default(), 10, |attempt| {
        ScriptedUser::in_the_dark(attempt as u64)
    })
}

/// Someone joins in on the first attempt, then the user performs alone
pub fn scenario_company_then_alone() -> VCheckResult<ScenarioReport> {
    run_scenario(LivenessConfig::default(), SimulationConfig::default(), 3, |attempt| {
        if attempt == 1 {
            ScriptedUser::with_company(11)
        } else {
            ScriptedUser::cooperative(12)
        }
    })
}

/// The user never moves; every session runs into the deadline
pub fn scenario_repeated_timeouts(sessions: usize) -> VCheckResult<ScenarioReport> {
    run_scenario(LivenessConfig::default(), SimulationConfig::default(), sessions, |attempt| {
        ScriptedUser::idle(attempt as u64)
    })
}

/// A camera with irregular frame spacing
pub fn scenario_jittery_camera(seed: u64) -> VCheckResult<ScenarioReport> {
    let simulation = SimulationConfig {
        frame_jitter_ms: 30,
        seed,
        ..SimulationConfig::default()
    };
    run_scenario(LivenessConfig::default(), simulation, 1, |_| ScriptedUser::cooperative(seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vcheck_liveness::ObstacleType;

    fn single(mut user: ScriptedUser) -> SessionRun {
        let mut sim = EngineSimulator::new(LivenessConfig::default(), SimulationConfig::default()).unwrap();
        sim.run_session(&mut user).unwrap()
    }

    #[test]
    fn test_cooperative_scenario() {
        let report = scenario_cooperative(5).unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.outcomes(), vec![SessionOutcome::Completed { fail_open: false }]);
    }

    #[test]
    fn test_terminal_obstacles_end_sessions() {
        assert_eq!(
            single(ScriptedUser::in_the_dark(1)).outcome,
            SessionOutcome::PrematureEnd(ObstacleType::LowBrightness)
        );
        assert_eq!(
            single(ScriptedUser::with_company(2)).outcome,
            SessionOutcome::PrematureEnd(ObstacleType::MultipleFaces)
        );
        assert_eq!(
            single(ScriptedUser::walks_away(3)).outcome,
            SessionOutcome::PrematureEnd(ObstacleType::NoOrPartialFace)
        );
    }

    #[test]
    fn test_dark_session_ends_on_twentieth_frame() {
        let run = single(ScriptedUser::in_the_dark(4));
        assert_eq!(run.frames, 20);
        assert!(run.video.is_none());
    }

    #[test]
    fn test_over_rotation_only_warns() {
        let mut sim = EngineSimulator::new(LivenessConfig::default(), SimulationConfig::default()).unwrap();
        let run = sim.run_session(&mut ScriptedUser::over_rotates(6)).unwrap();
        assert_eq!(run.outcome, SessionOutcome::TimedOut);

        let yaw_warnings = sim
            .events()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    LivenessEvent::ObstacleRaised {
                        obstacle: ObstacleType::YawAngleExceeded,
                        terminal: false,
                        ..
                    }
                )
            })
            .count();
        // Each over-rotated frame extends the same warning window
        assert_eq!(yaw_warnings, 1);
    }

    #[test]
    fn test_dark_room_fails_open_on_fifth_attempt() {
        let report = scenario_dark_room().unwrap();
        assert!(report.passed(), "{:?}", report.violations);

        let outcomes = report.outcomes();
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes[..4]
            .iter()
            .all(|o| *o == SessionOutcome::PrematureEnd(ObstacleType::LowBrightness)));
        assert_eq!(outcomes[4], SessionOutcome::Completed { fail_open: true });
        assert_eq!(report.runs[4].attempt.get(), 5);
    }

    #[test]
    fn test_retry_after_company() {
        let report = scenario_company_then_alone().unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(
            report.outcomes(),
            vec![
                SessionOutcome::PrematureEnd(ObstacleType::MultipleFaces),
                SessionOutcome::Completed { fail_open: false },
            ]
        );
        assert_eq!(report.runs[1].attempt.get(), 2);
    }

    #[test]
    fn test_timeouts_keep_attempt_number() {
        let report = scenario_repeated_timeouts(3).unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.outcomes(), vec![SessionOutcome::TimedOut; 3]);
        assert!(report.runs.iter().all(|run| run.attempt.get() == 1));
    }

    #[test]
    fn test_jittery_camera_still_completes() {
        let report = scenario_jittery_camera(17).unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.final_outcome(), Some(SessionOutcome::Completed { fail_open: false }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_cooperative_users_complete(seed in any::<u64>()) {
            let report = scenario_cooperative(seed).unwrap();
            prop_assert!(report.passed(), "{:?}", report.violations);
            prop_assert_eq!(report.final_outcome(), Some(SessionOutcome::Completed { fail_open: false }));
        }
    }
}
