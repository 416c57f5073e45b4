//! Turning a resolved event into one atomic store write.
//!
//! Planning reads the store (to expand hops) but never writes it. Only
//! once every rule of an event has resolved does [`apply_plan`] hand the
//! whole mutation list to the store in a single call, so an event that
//! fails halfway leaves nothing behind.

use flux_store::{ApplyOutcome, CollectionStore};
use flux_types::{CollectionKind, Mutation, MutationOp, Score, StorageKey};

use crate::FanoutError;

/// One rule's worth of work: the same member added to or removed from a
/// set of keys that share a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub keys: Vec<StorageKey>,
    pub kind: CollectionKind,
    pub op: MutationOp,
    pub member: String,
}

/// Every mutation an event will make, before scores are assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPlan {
    steps: Vec<PlanStep>,
    score: Option<Score>,
}

impl EventPlan {
    /// Starts an empty plan. `score` is the event's explicit `@score`.
    pub fn new(score: Option<Score>) -> Self {
        Self {
            steps: Vec::new(),
            score,
        }
    }

    pub fn push(&mut self, step: PlanStep) {
        if !step.keys.is_empty() {
            self.steps.push(step);
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Number of individual mutations the plan expands to.
    pub fn mutation_count(&self) -> usize {
        self.steps.iter().map(|step| step.keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether applying the plan must draw a score from the store counter.
    pub fn needs_default_score(&self) -> bool {
        self.score.is_none() && self.steps.iter().any(|step| step.op == MutationOp::Add)
    }

    /// Flattens the plan, stamping every add with `score`.
    pub fn into_mutations(self, score: Score) -> Vec<Mutation> {
        let score = self.score.unwrap_or(score);
        self.steps
            .into_iter()
            .flat_map(|step| {
                let PlanStep {
                    keys,
                    kind,
                    op,
                    member,
                } = step;
                keys.into_iter().map(move |key| Mutation {
                    key,
                    op,
                    member: member.clone(),
                    score,
                    kind,
                })
            })
            .collect()
    }
}

/// Applies a plan in one store write.
///
/// The default score is drawn once per event, and only when the plan adds
/// something without an explicit score, so removals and empty fan-outs do
/// not consume counter values.
pub fn apply_plan(
    store: &dyn CollectionStore,
    plan: EventPlan,
) -> Result<ApplyOutcome, FanoutError> {
    if plan.is_empty() {
        return Ok(ApplyOutcome::default());
    }
    let score = if plan.needs_default_score() {
        store.next_score()?
    } else {
        0.0
    };
    let mutations = plan.into_mutations(score);
    Ok(store.apply(&mutations)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_store::MemoryStore;

    fn step(op: MutationOp, keys: &[&str], member: &str) -> PlanStep {
        PlanStep {
            keys: keys.iter().copied().map(StorageKey::from_raw).collect(),
            kind: CollectionKind::Ordered,
            op,
            member: member.to_string(),
        }
    }

    #[test]
    fn empty_steps_are_dropped() {
        let mut plan = EventPlan::new(None);
        plan.push(step(MutationOp::Add, &[], "post1"));
        assert!(plan.is_empty());
        assert!(!plan.needs_default_score());
    }

    #[test]
    fn removals_never_need_a_score() {
        let mut plan = EventPlan::new(None);
        plan.push(step(MutationOp::Remove, &["u1:followers"], "u2"));
        assert!(!plan.needs_default_score());
    }

    #[test]
    fn explicit_score_overrides_default() {
        let mut plan = EventPlan::new(Some(1.0));
        plan.push(step(MutationOp::Add, &["u2:feed", "u3:feed"], "post3"));
        assert!(!plan.needs_default_score());

        let mutations = plan.into_mutations(99.0);
        assert_eq!(mutations.len(), 2);
        assert!(mutations.iter().all(|m| m.score == 1.0 && m.member == "post3"));
    }

    #[test]
    fn apply_draws_one_score_per_event() {
        let store = MemoryStore::new();
        let mut plan = EventPlan::new(None);
        plan.push(step(MutationOp::Add, &["u2:feed", "u3:feed"], "post1"));
        plan.push(step(MutationOp::Add, &["u4:feed"], "post1"));
        assert_eq!(plan.mutation_count(), 3);

        let outcome = apply_plan(&store, plan).expect("apply");
        assert_eq!(outcome.added, 3);

        // One draw for the event above; the next draw is the second value.
        assert_eq!(store.next_score().expect("score"), 2.0);
        let scores: Vec<_> = ["u2:feed", "u3:feed", "u4:feed"]
            .into_iter()
            .map(|key| store.range(&StorageKey::from_raw(key), 1).expect("range")[0].score)
            .collect();
        assert_eq!(scores, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_plan_consumes_no_score() {
        let store = MemoryStore::new();
        apply_plan(&store, EventPlan::new(None)).expect("apply");
        assert_eq!(store.next_score().expect("score"), 1.0);
    }
}
