//! Routing policy engine.
//!
//! A pure function over the service policy row, the routing counters and the
//! current time, producing the candidate-query plan `call_next` executes.
//! The store runs the plan's pools in order, first match wins; within each
//! pool the priority-fairness preference decides which class filter is tried
//! first.

use chrono::{DateTime, Duration, Utc};

/// Per-service policy row. Absent rows behave as [`ServicePolicy::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePolicy {
    pub no_show_grace_seconds: i32,
    pub return_to_queue: bool,
    pub appointment_ratio_percent: i32,
    pub appointment_window_size: i32,
    pub appointment_boost_minutes: i32,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            no_show_grace_seconds: 0,
            return_to_queue: false,
            appointment_ratio_percent: 0,
            appointment_window_size: 10,
            appointment_boost_minutes: 0,
        }
    }
}

/// Per-service routing counters, row-locked during `call_next`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingState {
    pub priority_streak: i32,
    pub appointment_served: i32,
    pub total_served: i32,
}

/// One candidate pool of the selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePool {
    /// Appointment tickets, optionally restricted to `scheduled_at <= cutoff`.
    Appointment { cutoff: Option<DateTime<Utc>> },
    /// Oldest non-appointment waiting ticket.
    WalkIn,
}

/// Which priority class is tried first within each pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassPreference {
    /// The streak limit was hit: regular tickets first, then any.
    RegularFirst,
    /// Normal operation: non-regular tickets first, then any.
    PriorityFirst,
}

/// The plan `call_next` executes, first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    pub pools: Vec<CandidatePool>,
    pub preference: ClassPreference,
    /// Normalized sliding-window size for the post-call state update.
    pub window: i32,
}

/// Appointment quota inside one window: `round(ratio% × window / 100)`.
#[must_use]
pub fn appointment_target(ratio_percent: i32, window: i32) -> i32 {
    if ratio_percent <= 0 || window <= 0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let target = (f64::from(ratio_percent) * f64::from(window) / 100.0).round() as i32;
    target
}

fn normalize_window(value: i32) -> i32 {
    if value <= 0 {
        10
    } else {
        value
    }
}

/// Build the candidate plan for one `call_next` invocation.
///
/// Pool order: boost (appointments scheduled within the boost cutoff), ratio
/// (appointments while the window quota is unmet), walk-ins, then any
/// appointment as a fallback. A stored `total_served` at or past the window
/// counts as a fresh window.
#[must_use]
pub fn plan_call(
    policy: Option<&ServicePolicy>,
    state: &RoutingState,
    now: DateTime<Utc>,
    priority_streak_limit: i32,
) -> CallPlan {
    let default_policy = ServicePolicy::default();
    let policy = policy.unwrap_or(&default_policy);

    let window = normalize_window(policy.appointment_window_size);
    let target = appointment_target(policy.appointment_ratio_percent, window);

    let mut appointment_served = state.appointment_served;
    if state.total_served >= window {
        appointment_served = 0;
    }

    let mut pools = Vec::with_capacity(3);
    if policy.appointment_boost_minutes > 0 {
        let cutoff = now + Duration::minutes(i64::from(policy.appointment_boost_minutes));
        pools.push(CandidatePool::Appointment {
            cutoff: Some(cutoff),
        });
    }

    let ratio_pass = policy.appointment_ratio_percent > 0 && appointment_served < target;
    if ratio_pass {
        pools.push(CandidatePool::Appointment { cutoff: None });
    }

    pools.push(CandidatePool::WalkIn);

    // The ratio pass already covers the unrestricted appointment query; only
    // add the fallback when it would run a different query.
    if !ratio_pass {
        pools.push(CandidatePool::Appointment { cutoff: None });
    }

    let preference = if state.priority_streak >= priority_streak_limit {
        ClassPreference::RegularFirst
    } else {
        ClassPreference::PriorityFirst
    };

    CallPlan {
        pools,
        preference,
        window,
    }
}

/// Advance the routing counters after a ticket was assigned.
///
/// The streak resets on a `regular` ticket and grows otherwise; both window
/// counters reset once `total_served` reaches the window (sliding reset).
#[must_use]
pub fn advance_state(
    state: &RoutingState,
    priority_class: &str,
    is_appointment: bool,
    window: i32,
) -> RoutingState {
    let priority_streak = if priority_class == "regular" {
        0
    } else if priority_class.is_empty() {
        state.priority_streak
    } else {
        state.priority_streak + 1
    };

    let mut total_served = state.total_served + 1;
    let mut appointment_served = state.appointment_served + i32::from(is_appointment);
    if window > 0 && total_served >= window {
        total_served = 0;
        appointment_served = 0;
    }

    RoutingState {
        priority_streak,
        appointment_served,
        total_served,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(ratio: i32, window: i32, boost: i32) -> ServicePolicy {
        ServicePolicy {
            appointment_ratio_percent: ratio,
            appointment_window_size: window,
            appointment_boost_minutes: boost,
            ..ServicePolicy::default()
        }
    }

    #[test]
    fn absent_policy_defaults_to_walk_in_then_appointment() {
        let plan = plan_call(None, &RoutingState::default(), Utc::now(), 3);
        assert_eq!(
            plan.pools,
            vec![
                CandidatePool::WalkIn,
                CandidatePool::Appointment { cutoff: None }
            ]
        );
        assert_eq!(plan.preference, ClassPreference::PriorityFirst);
        assert_eq!(plan.window, 10);
    }

    #[test]
    fn full_ratio_prefers_appointments() {
        let p = policy(100, 5, 0);
        let plan = plan_call(Some(&p), &RoutingState::default(), Utc::now(), 3);
        assert_eq!(
            plan.pools,
            vec![
                CandidatePool::Appointment { cutoff: None },
                CandidatePool::WalkIn,
            ]
        );
    }

    #[test]
    fn met_quota_skips_the_ratio_pass() {
        let p = policy(40, 5, 0);
        // target = round(40 * 5 / 100) = 2
        let state = RoutingState {
            appointment_served: 2,
            total_served: 3,
            ..RoutingState::default()
        };
        let plan = plan_call(Some(&p), &state, Utc::now(), 3);
        assert_eq!(
            plan.pools,
            vec![
                CandidatePool::WalkIn,
                CandidatePool::Appointment { cutoff: None }
            ]
        );
    }

    #[test]
    fn boost_pass_comes_first_with_cutoff() {
        let now = Utc::now();
        let p = policy(0, 5, 60);
        let plan = plan_call(Some(&p), &RoutingState::default(), now, 3);
        assert_eq!(plan.pools.len(), 3);
        match plan.pools[0] {
            CandidatePool::Appointment { cutoff: Some(cutoff) } => {
                assert_eq!(cutoff, now + Duration::minutes(60));
            }
            ref other => panic!("expected boost pool, got {other:?}"),
        }
        assert_eq!(plan.pools[1], CandidatePool::WalkIn);
        assert_eq!(plan.pools[2], CandidatePool::Appointment { cutoff: None });
    }

    #[test]
    fn stale_window_counts_as_fresh() {
        let p = policy(50, 4, 0);
        // target = 2; the stored counters already filled a whole window, so
        // the quota comparison restarts from zero.
        let state = RoutingState {
            appointment_served: 2,
            total_served: 4,
            ..RoutingState::default()
        };
        let plan = plan_call(Some(&p), &state, Utc::now(), 3);
        assert_eq!(plan.pools[0], CandidatePool::Appointment { cutoff: None });
    }

    #[test]
    fn streak_limit_flips_the_preference() {
        let state = RoutingState {
            priority_streak: 3,
            ..RoutingState::default()
        };
        let plan = plan_call(None, &state, Utc::now(), 3);
        assert_eq!(plan.preference, ClassPreference::RegularFirst);

        let below = RoutingState {
            priority_streak: 2,
            ..RoutingState::default()
        };
        let plan = plan_call(None, &below, Utc::now(), 3);
        assert_eq!(plan.preference, ClassPreference::PriorityFirst);
    }

    #[test]
    fn target_rounds_half_up() {
        assert_eq!(appointment_target(100, 5), 5);
        assert_eq!(appointment_target(50, 5), 3); // 2.5 rounds away from zero
        assert_eq!(appointment_target(30, 10), 3);
        assert_eq!(appointment_target(0, 10), 0);
        assert_eq!(appointment_target(50, 0), 0);
    }

    #[test]
    fn advance_resets_streak_on_regular() {
        let state = RoutingState {
            priority_streak: 2,
            appointment_served: 1,
            total_served: 3,
        };
        let next = advance_state(&state, "regular", false, 10);
        assert_eq!(next.priority_streak, 0);
        assert_eq!(next.total_served, 4);
        assert_eq!(next.appointment_served, 1);
    }

    #[test]
    fn advance_grows_streak_on_priority() {
        let state = RoutingState::default();
        let next = advance_state(&state, "priority", true, 10);
        assert_eq!(next.priority_streak, 1);
        assert_eq!(next.appointment_served, 1);
        assert_eq!(next.total_served, 1);
    }

    #[test]
    fn advance_slides_the_window() {
        let state = RoutingState {
            priority_streak: 0,
            appointment_served: 2,
            total_served: 4,
        };
        let next = advance_state(&state, "regular", true, 5);
        assert_eq!(next.total_served, 0);
        assert_eq!(next.appointment_served, 0);
    }

    #[test]
    fn scenario_ratio_state_after_first_call() {
        // Policy {ratio=100, window=5}: serving one appointment lands the
        // counters at total=1, appointment=1, streak=0.
        let next = advance_state(&RoutingState::default(), "regular", true, 5);
        assert_eq!(
            next,
            RoutingState {
                priority_streak: 0,
                appointment_served: 1,
                total_served: 1
            }
        );
    }
}
