//! Batch processing: parse, plan, and apply events in submission order.

use std::sync::Arc;

use flux_schema::{match_rules, SchemaRegistry};
use flux_store::CollectionStore;
use flux_types::{Event, MutationOp, Payload, RawEvent, Schema, TargetPath};
use serde::Serialize;

use crate::applier::{apply_plan, EventPlan, PlanStep};
use crate::resolver::resolve;
use crate::FanoutError;

/// Summary of one submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Events examined, successful or not.
    pub processed: usize,
    /// Events whose mutations were committed (possibly zero of them).
    pub applied: usize,
    /// Events that matched no rule and carried no override.
    pub skipped: usize,
    pub failures: Vec<EventFailure>,
}

/// Why one event of a batch had no effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventFailure {
    /// Position of the event in the submitted batch.
    pub index: usize,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Applied,
    Skipped,
}

/// Drives events through rule matching, path resolution, and the store.
#[derive(Clone)]
pub struct EventProcessor {
    registry: Arc<dyn SchemaRegistry>,
    store: Arc<dyn CollectionStore>,
}

impl EventProcessor {
    pub fn new(registry: Arc<dyn SchemaRegistry>, store: Arc<dyn CollectionStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    /// Processes a batch against a registered schema.
    ///
    /// Events run strictly in order: event `i` is committed before event
    /// `i + 1` resolves its paths, so later events observe earlier ones.
    /// A failing event is recorded in the report and has no effects; the
    /// rest of the batch still runs.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::UnknownSchema`] before touching the store if
    /// `schema_id` is not registered.
    pub fn process_batch(
        &self,
        schema_id: &str,
        events: Vec<RawEvent>,
    ) -> Result<BatchReport, FanoutError> {
        let record = self.registry.get(schema_id)?;
        let schema = record.schema.as_ref();

        let mut report = BatchReport::default();
        for (index, raw) in events.into_iter().enumerate() {
            report.processed += 1;
            let event_type = raw.event_type().to_string();
            match self.process_event(schema, raw) {
                Ok(EventOutcome::Applied) => report.applied += 1,
                Ok(EventOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        schema_id,
                        index,
                        event_type = %event_type,
                        kind = e.kind(),
                        error = %e,
                        "event rejected"
                    );
                    report.failures.push(EventFailure {
                        index,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            schema_id,
            processed = report.processed,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failures.len(),
            "processed event batch"
        );
        Ok(report)
    }

    fn process_event(&self, schema: &Schema, raw: RawEvent) -> Result<EventOutcome, FanoutError> {
        let event = Event::parse(raw)?;
        let Some(plan) = self.plan(schema, &event)? else {
            tracing::debug!(event_type = %event.event_type, "no rule matched; skipping event");
            return Ok(EventOutcome::Skipped);
        };

        let mutations = plan.mutation_count();
        let outcome = apply_plan(self.store.as_ref(), plan)?;
        tracing::debug!(
            event_type = %event.event_type,
            mutations,
            added = outcome.added,
            removed = outcome.removed,
            "applied event"
        );
        Ok(EventOutcome::Applied)
    }

    /// Resolves every mutation an event would make, without writing.
    ///
    /// All rules of the event resolve against the store as it was before
    /// the event, so a rule never traverses members an earlier rule of the
    /// same event adds. Returns `None` when the event matches no rule and
    /// has no override.
    fn plan(&self, schema: &Schema, event: &Event) -> Result<Option<EventPlan>, FanoutError> {
        let mut plan = EventPlan::new(event.score);

        if let Some(inline) = &event.inline {
            self.plan_targets(
                &mut plan,
                schema,
                &event.payload,
                &inline.targets,
                inline.op,
                &inline.attribute,
            )?;
            return Ok(Some(plan));
        }

        let rules = match_rules(schema, &event.event_type)?;
        if rules.is_empty() {
            return Ok(None);
        }
        for rule in rules {
            self.plan_targets(
                &mut plan,
                schema,
                &event.payload,
                &rule.targets,
                rule.action.op,
                &rule.action.attribute,
            )?;
        }
        Ok(Some(plan))
    }

    fn plan_targets(
        &self,
        plan: &mut EventPlan,
        schema: &Schema,
        payload: &Payload,
        targets: &[TargetPath],
        op: MutationOp,
        attribute: &str,
    ) -> Result<(), FanoutError> {
        let member = payload.get(attribute)?;
        for path in targets {
            plan.push(PlanStep {
                keys: resolve(self.store.as_ref(), payload, path)?,
                kind: schema.relation_kind(path.relation()),
                op,
                member: member.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_schema::MemorySchemaRegistry;
    use flux_store::MemoryStore;
    use flux_types::StorageKey;
    use serde_json::json;

    fn event(event_type: &str, payload: serde_json::Value) -> RawEvent {
        serde_json::from_value(json!([event_type, payload])).expect("raw event")
    }

    fn setup() -> (EventProcessor, String) {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let document = json!({
            "client:gravity:action:follow": [
                { "targets": ["[followee].followers"], "add": "follower" },
                { "targets": ["[follower].sources"], "add": "followee" }
            ],
            "@relations": { "followers": "set", "sources": "set" }
        });
        let record = flux_schema::register_document(registry.as_ref(), &document)
            .expect("schema should register");
        (EventProcessor::new(registry, store), record.id)
    }

    fn members(processor: &EventProcessor, key: &str) -> Vec<String> {
        processor
            .store()
            .members(&StorageKey::from_raw(key))
            .expect("members")
    }

    #[test]
    fn unknown_schema_fails_whole_batch() {
        let (processor, _) = setup();
        let err = processor
            .process_batch("no-such-schema", vec![])
            .expect_err("should fail");
        assert!(matches!(err, FanoutError::UnknownSchema(ref id) if id == "no-such-schema"));
        assert_eq!(err.kind(), "unknown_schema");
    }

    #[test]
    fn failing_event_does_not_stop_the_batch() {
        let (processor, schema_id) = setup();
        let report = processor
            .process_batch(
                &schema_id,
                vec![
                    event(
                        "client:gravity:action:follow:user",
                        json!({ "followee": "user1" }),
                    ),
                    event(
                        "client:gravity:action:follow:user",
                        json!({ "followee": "user1", "follower": "user2" }),
                    ),
                ],
            )
            .expect("batch");

        assert_eq!(report.processed, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[0].kind, "missing_attribute");
        assert_eq!(members(&processor, "user1:followers"), vec!["user2"]);
    }

    #[test]
    fn failure_in_second_rule_leaves_first_rule_unapplied() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let document = json!({
            "client:gravity:action:tag": [
                { "targets": ["[item].tags"], "add": "tag" },
                { "targets": ["[owner].tagged"], "add": "item" }
            ]
        });
        let record = flux_schema::register_document(registry.as_ref(), &document)
            .expect("register");
        let processor = EventProcessor::new(registry, store);

        let report = processor
            .process_batch(
                &record.id,
                vec![event(
                    "client:gravity:action:tag:item",
                    json!({ "item": "i1", "tag": "rust" }),
                )],
            )
            .expect("batch");

        assert_eq!(report.failures.len(), 1);
        assert!(members(&processor, "i1:tags").is_empty());
    }

    #[test]
    fn rules_of_one_event_resolve_against_the_prior_state() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let document = json!({
            "client:gravity:action:join": [
                { "targets": ["[group].members"], "add": "user" },
                { "targets": ["[group].members.inbox"], "add": "notice" }
            ]
        });
        let record = flux_schema::register_document(registry.as_ref(), &document)
            .expect("register");
        let processor = EventProcessor::new(registry, store);
        let join = |user: &str, notice: &str| {
            event(
                "client:gravity:action:join:group",
                json!({ "group": "g", "user": user, "notice": notice }),
            )
        };

        let report = processor
            .process_batch(&record.id, vec![join("u1", "n1")])
            .expect("batch");
        assert_eq!(report.applied, 1);
        assert_eq!(members(&processor, "g:members"), vec!["u1"]);
        assert!(members(&processor, "u1:inbox").is_empty());

        // The next event sees u1 as a member.
        processor
            .process_batch(&record.id, vec![join("u2", "n2")])
            .expect("batch");
        assert_eq!(members(&processor, "u1:inbox"), vec!["n2"]);
        assert!(members(&processor, "u2:inbox").is_empty());
    }

    #[test]
    fn unmatched_event_is_skipped() {
        let (processor, schema_id) = setup();
        let report = processor
            .process_batch(
                &schema_id,
                vec![event("client:gravity:action:like:post", json!({ "post": "p1" }))],
            )
            .expect("batch");
        assert_eq!(report.skipped, 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn malformed_event_type_is_an_invalid_path() {
        let (processor, schema_id) = setup();
        let report = processor
            .process_batch(&schema_id, vec![event("follow", json!({}))])
            .expect("batch");
        assert_eq!(report.failures[0].kind, "invalid_path");
    }

    #[test]
    fn inline_override_ignores_malformed_event_type() {
        let (processor, schema_id) = setup();
        let report = processor
            .process_batch(
                &schema_id,
                vec![event(
                    "bookmark",
                    json!({ "user": "u1", "post": "p9", "@targets": ["[user].bookmarks"], "@add": "post" }),
                )],
            )
            .expect("batch");
        assert_eq!(report.applied, 1);
        assert_eq!(members(&processor, "u1:bookmarks"), vec!["p9"]);
    }
}
