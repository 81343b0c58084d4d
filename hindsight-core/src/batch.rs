//! Token estimation and batch planning
//!
//! Token counts are approximated as one token per four characters of
//! extracted text. This is not a tokenizer, only a budget heuristic.
//!
//! Batches are planned greedily: messages are appended while the running sum
//! stays within the ceiling. A message that would overflow closes the current
//! batch and opens the next one. A message that exceeds the ceiling on its own
//! still gets a batch, alone. Boundaries carry no meaning beyond the budget.

use crate::types::{Batch, Message};

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

/// Estimated token cost of a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated token cost of a message's extracted text.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.text())
}

/// Split `messages` into consecutive batches of at most `ceiling` estimated tokens.
pub fn plan_batches(messages: Vec<Message>, ceiling: usize) -> Vec<Batch> {
    plan_by(messages, ceiling, estimate_message_tokens)
        .into_iter()
        .map(|(messages, estimated_tokens)| Batch {
            messages,
            estimated_tokens,
        })
        .collect()
}

/// Greedy partition of `items` by `cost`.
///
/// Returns each group with its summed cost. Groups are never empty and their
/// concatenation is `items` in the original order.
pub fn plan_by<T, F>(items: Vec<T>, ceiling: usize, cost: F) -> Vec<(Vec<T>, usize)>
where
    F: Fn(&T) -> usize,
{
    let mut groups = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_cost = 0usize;

    for item in items {
        let item_cost = cost(&item);
        if !current.is_empty() && current_cost + item_cost > ceiling {
            groups.push((std::mem::take(&mut current), current_cost));
            current_cost = 0;
        }
        current_cost += item_cost;
        current.push(item);
    }

    if !current.is_empty() {
        groups.push((current, current_cost));
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, Payload};
    use chrono::Utc;

    fn message(id: &str, chars: usize) -> Message {
        Message {
            kind: MessageKind::Human,
            id: id.to_string(),
            parent_id: None,
            session_id: "s".to_string(),
            timestamp: Utc::now(),
            cwd: None,
            payload: Payload::Text("x".repeat(chars)),
        }
    }

    fn ids(batch: &Batch) -> Vec<&str> {
        batch.messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Characters, not bytes
        assert_eq!(estimate_tokens("日本語です"), 2);
    }

    #[test]
    fn test_five_messages_ceiling_25() {
        let messages: Vec<_> = (1..=5).map(|i| message(&format!("m{i}"), 40)).collect();
        let batches = plan_batches(messages, 25);

        assert_eq!(batches.len(), 3);
        assert_eq!(ids(&batches[0]), vec!["m1", "m2"]);
        assert_eq!(ids(&batches[1]), vec!["m3", "m4"]);
        assert_eq!(ids(&batches[2]), vec!["m5"]);
        assert_eq!(batches[0].estimated_tokens, 20);
        assert_eq!(batches[2].estimated_tokens, 10);
    }

    #[test]
    fn test_oversized_message_sits_alone() {
        let messages = vec![
            message("small", 8),
            message("huge", 400),
            message("tail", 8),
        ];
        let batches = plan_batches(messages, 25);

        assert_eq!(batches.len(), 3);
        assert_eq!(ids(&batches[1]), vec!["huge"]);
        assert_eq!(batches[1].estimated_tokens, 100);
    }

    #[test]
    fn test_oversized_first_message() {
        let batches = plan_batches(vec![message("huge", 400), message("next", 4)], 25);
        assert_eq!(ids(&batches[0]), vec!["huge"]);
        assert_eq!(ids(&batches[1]), vec!["next"]);
    }

    #[test]
    fn test_exact_fit_stays_in_batch() {
        let costs = vec![10, 15, 25];
        let groups = plan_by(costs, 25, |c| *c);
        assert_eq!(groups, vec![(vec![10, 15], 25), (vec![25], 25)]);
    }

    #[test]
    fn test_batches_never_empty_and_preserve_order() {
        let costs: Vec<usize> = vec![3, 0, 40, 7, 7, 7, 12, 1, 0, 30, 2];
        for ceiling in [0, 1, 10, 14, 25, 100] {
            let groups = plan_by(costs.clone(), ceiling, |c| *c);
            assert!(groups.iter().all(|(g, _)| !g.is_empty()));
            let flattened: Vec<usize> = groups.into_iter().flat_map(|(g, _)| g).collect();
            assert_eq!(flattened, costs, "ceiling {ceiling}");
        }
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        assert!(plan_batches(vec![], 100).is_empty());
    }
}
