//! Generic fetch/observe/plan/apply/project-status framework (§4.1) the
//! two template reconcilers (namespace- and cluster-scoped) are built on.
//! Planning is a pure function of fetched state; it never touches the
//! apiserver directly — only [`PlannedAction`] values describe intent,
//! and the caller applies them.

use crate::error::Error;
use crate::status::ComponentHealth;

/// Wraps a single fetch, distinguishing a found value, a well-formed
/// "not found", and a transient/infrastructure error — exactly the three
/// outcomes §4.1's Fetch phase requires.
#[derive(Debug)]
pub enum FetchResult<T> {
    Found(T),
    NotFound,
    Error(Error),
}

impl<T> FetchResult<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            FetchResult::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_ok(self) -> Option<T> {
        match self {
            FetchResult::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchResult::NotFound)
    }

    pub fn has_error(&self) -> bool {
        matches!(self, FetchResult::Error(_))
    }

    /// Maps a fetch result onto a component-health entry for an upstream
    /// dependency (model descriptor, runtime config): not-found surfaces
    /// as Pending (§7 category 1), infra errors as Degraded.
    pub fn to_upstream_component_health(&self, component: &'static str) -> ComponentHealth {
        match self {
            FetchResult::Found(_) => ComponentHealth::ready(component),
            FetchResult::NotFound => ComponentHealth::pending(
                component,
                "MissingUpstreamDependency",
                format!("{component} not found"),
            ),
            FetchResult::Error(e) => ComponentHealth::from_fetch_error(component, e),
        }
    }

    /// Same mapping for downstream/owned children (discovery job, cache
    /// resource): absence is expected and healthy until the planner
    /// decides to create one, so not-found does not imply Pending here —
    /// callers that need "job not yet created" semantics check
    /// `is_not_found()` directly instead of calling this.
    pub fn to_downstream_component_health(&self, component: &'static str) -> ComponentHealth {
        match self {
            FetchResult::Found(_) | FetchResult::NotFound => ComponentHealth::ready(component),
            FetchResult::Error(e) => ComponentHealth::from_fetch_error(component, e),
        }
    }
}

impl<T> From<Result<Option<T>, Error>> for FetchResult<T> {
    fn from(result: Result<Option<T>, Error>) -> Self {
        match result {
            Ok(Some(v)) => FetchResult::Found(v),
            Ok(None) => FetchResult::NotFound,
            Err(e) => FetchResult::Error(e),
        }
    }
}

/// One desired mutation the apply phase should perform. A sum type so the
/// pure planning phase can describe every possible effect without calling
/// the apiserver itself (§4.1: "planning never mutates the apiserver").
#[derive(Debug, Clone)]
pub enum PlannedAction<J, C> {
    CreateDiscoveryJob(J),
    DeleteDiscoveryJob { name: String },
    CreateCacheResource(C),
    None,
}

/// The planner's full output: desired actions plus an optional requeue
/// delay hint (§4.1 Plan phase contract).
#[derive(Debug, Clone)]
pub struct Plan<J, C> {
    pub actions: Vec<PlannedAction<J, C>>,
    pub requeue_after: Option<std::time::Duration>,
}

impl<J, C> Default for Plan<J, C> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            requeue_after: None,
        }
    }
}

impl<J, C> Plan<J, C> {
    pub fn push(&mut self, action: PlannedAction<J, C>) {
        if !matches!(action, PlannedAction::None) {
            self.actions.push(action);
        }
    }

    pub fn requeue_after(mut self, delay: std::time::Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fetch_result_from_result_maps_three_outcomes() {
        let found: FetchResult<i32> = Ok(Some(1)).into();
        let not_found: FetchResult<i32> = Ok(None).into();
        let erred: FetchResult<i32> = Err(Error::Invariant("x".to_owned())).into();
        assert!(found.ok().is_some());
        assert!(not_found.is_not_found());
        assert!(erred.has_error());
    }

    #[test]
    fn plan_push_drops_none_actions() {
        let mut plan: Plan<(), ()> = Plan::default();
        plan.push(PlannedAction::None);
        assert!(plan.actions.is_empty());
        plan.push(PlannedAction::CreateCacheResource(()));
        assert_eq!(plan.actions.len(), 1);
    }
}
