//! Rule matching: event type to schema rules.

use flux_types::{EventError, EventType, Rule, Schema};

/// Rules a schema declares for an event type.
///
/// The event type `<actionClass>:<entityType>` dispatches on its action
/// class, so `client:gravity:action:follow:user` picks up the rules under
/// `client:gravity:action:follow` whatever entity triggered it. An action
/// class the schema does not cover yields an empty slice.
///
/// # Errors
///
/// Returns [`EventError::MalformedEventType`] when the event type carries no
/// entity qualifier.
pub fn match_rules<'s>(schema: &'s Schema, event_type: &str) -> Result<&'s [Rule], EventError> {
    let event_type = EventType::parse(event_type)?;
    Ok(schema.rules(event_type.action_class()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_types::{MutationOp, TargetPath};

    fn schema() -> Schema {
        let followers = TargetPath::parse("[followee].followers").expect("path");
        Schema::default().with_rules(
            "client:gravity:action:follow",
            vec![Rule::new(vec![followers], MutationOp::Add, "follower")],
        )
    }

    #[test]
    fn matches_on_action_class() {
        let schema = schema();
        let rules = match_rules(&schema, "client:gravity:action:follow:user").expect("match");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action.attribute, "follower");

        // Any entity qualifier dispatches the same way.
        let rules = match_rules(&schema, "client:gravity:action:follow:artist").expect("match");
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn unmatched_action_class_is_empty() {
        let schema = schema();
        let rules = match_rules(&schema, "client:gravity:action:post").expect("match");
        assert!(rules.is_empty());
    }

    #[test]
    fn unqualified_event_type_is_rejected() {
        let schema = schema();
        assert_eq!(
            match_rules(&schema, "follow"),
            Err(EventError::MalformedEventType("follow".to_string()))
        );
    }
}
