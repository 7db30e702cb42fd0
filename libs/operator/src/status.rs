//! Component-health rollup and condition bookkeeping (§4.1 key algorithm,
//! §4.6). The pipeline's observe/project phases are built around this
//! type: every fetched dependency maps to one [`ComponentHealth`], and
//! [`rollup`] folds the set into the template's overall [`TemplatePhase`].

use crate::crd::common::{Condition, ConditionStatus, TemplatePhase};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Ready,
    Progressing,
    Pending,
    Degraded,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentHealth {
    pub component: &'static str,
    pub state: HealthState,
    pub reason: String,
    pub message: String,
    /// True when this component's bad state is caused solely by a
    /// downstream template component (e.g. the model descriptor looks
    /// unready only because it is itself waiting on this template) —
    /// excluded from the rollup to avoid the cyclic model/template
    /// deadlock called out in §9.
    pub caused_by_downstream_template: bool,
}

impl ComponentHealth {
    pub fn ready(component: &'static str) -> Self {
        Self {
            component,
            state: HealthState::Ready,
            reason: "Ready".to_owned(),
            message: String::new(),
            caused_by_downstream_template: false,
        }
    }

    pub fn pending(component: &'static str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            component,
            state: HealthState::Pending,
            reason: reason.to_owned(),
            message: message.into(),
            caused_by_downstream_template: false,
        }
    }

    pub fn progressing(component: &'static str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            component,
            state: HealthState::Progressing,
            reason: reason.to_owned(),
            message: message.into(),
            caused_by_downstream_template: false,
        }
    }

    pub fn degraded(component: &'static str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            component,
            state: HealthState::Degraded,
            reason: reason.to_owned(),
            message: message.into(),
            caused_by_downstream_template: false,
        }
    }

    pub fn failed(component: &'static str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            component,
            state: HealthState::Failed,
            reason: reason.to_owned(),
            message: message.into(),
            caused_by_downstream_template: false,
        }
    }

    /// Maps a fetch result's error onto a `ComponentHealth`, distinguishing
    /// infrastructure failures (→ Degraded, per the rollup rule) from
    /// well-formed not-found results (→ Pending/Failed, left to the
    /// caller to pick based on whether the name is user-supplied).
    pub fn from_fetch_error(component: &'static str, error: &Error) -> Self {
        if error.is_infrastructure_failure() {
            Self::degraded(component, "InfrastructureFailure", error.to_string())
        } else {
            Self::pending(component, "MissingUpstreamDependency", error.to_string())
        }
    }
}

/// Folds the per-component health set into the overall template phase,
/// per §4.1's rollup algorithm (evaluated in this exact priority order).
pub fn rollup(components: &[ComponentHealth]) -> TemplatePhase {
    if components
        .iter()
        .any(|c| c.state == HealthState::Degraded)
    {
        return TemplatePhase::Degraded;
    }
    if let Some(c) = components.iter().find(|c| {
        matches!(c.state, HealthState::Failed) && !c.caused_by_downstream_template
    }) {
        return match c.state {
            HealthState::Failed => TemplatePhase::Failed,
            _ => unreachable!(),
        };
    }
    if components
        .iter()
        .any(|c| matches!(c.state, HealthState::Pending | HealthState::Progressing))
    {
        return TemplatePhase::Progressing;
    }
    TemplatePhase::Ready
}

/// Builds (or updates) a condition list, enforcing §4.6's non-regression
/// rule: a positive (`True`) condition is never flipped back to `False` by
/// a stale observation unless the caller explicitly allows it by passing
/// `force`.
pub fn upsert_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    force: bool,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let regressing = existing.status == ConditionStatus::True && status != ConditionStatus::True;
        if regressing && !force {
            return;
        }
        if existing.status != status || existing.reason != reason || existing.message != message {
            existing.status = status;
            existing.reason = reason.to_owned();
            existing.message = message.to_owned();
            existing.last_transition_time = chrono::Utc::now().to_rfc3339();
        }
    } else {
        conditions.push(Condition {
            type_: type_.to_owned(),
            status,
            reason: reason.to_owned(),
            message: message.to_owned(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn any_degraded_component_wins_over_pending() {
        let components = vec![
            ComponentHealth::pending("model", "NotFound", "waiting"),
            ComponentHealth::degraded("inventory", "InfrastructureFailure", "apiserver down"),
        ];
        assert_eq!(rollup(&components), TemplatePhase::Degraded);
    }

    #[test]
    fn all_ready_rolls_up_to_ready() {
        let components = vec![ComponentHealth::ready("model"), ComponentHealth::ready("job")];
        assert_eq!(rollup(&components), TemplatePhase::Ready);
    }

    #[test]
    fn pending_rolls_up_to_progressing_when_nothing_worse() {
        let components = vec![
            ComponentHealth::ready("model"),
            ComponentHealth::pending("job", "Creating", "job not yet created"),
        ];
        assert_eq!(rollup(&components), TemplatePhase::Progressing);
    }

    #[test]
    fn failed_caused_by_downstream_template_is_excluded() {
        let mut c = ComponentHealth::failed("model", "WaitingOnTemplate", "cyclic");
        c.caused_by_downstream_template = true;
        assert_eq!(rollup(&[c]), TemplatePhase::Ready);
    }

    #[test]
    fn positive_condition_does_not_regress_without_force() {
        let mut conditions = Vec::new();
        upsert_condition(
            &mut conditions,
            "Discovered",
            ConditionStatus::True,
            "ProfileParsed",
            "ok",
            false,
        );
        upsert_condition(
            &mut conditions,
            "Discovered",
            ConditionStatus::False,
            "StaleObservation",
            "stale",
            false,
        );
        assert_eq!(conditions[0].status, ConditionStatus::True);
    }
}
