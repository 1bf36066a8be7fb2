//! Watch events and the identifier-keyed reconciler.

use serde::{Deserialize, Serialize};

/// Change notification for one identified item.
///
/// Wire shape: `{"tag": "new" | "updated" | "deleted", "item": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "item", rename_all = "lowercase")]
pub enum WatchEvent<I> {
    New(I),
    Updated(I),
    Deleted(I),
}

impl<I> WatchEvent<I> {
    pub fn item(&self) -> &I {
        match self {
            WatchEvent::New(item) | WatchEvent::Updated(item) | WatchEvent::Deleted(item) => item,
        }
    }

    /// Position within a batch: deleted, then new, then updated.
    fn rank(&self) -> u8 {
        match self {
            WatchEvent::Deleted(_) => 0,
            WatchEvent::New(_) => 1,
            WatchEvent::Updated(_) => 2,
        }
    }
}

/// Items with a stable identity.
pub trait Identified {
    type Id: PartialEq;

    fn identifier(&self) -> Self::Id;
}

/// Stable-sort a batch so a delete and re-create of one identifier in the
/// same flush ends with the item present.
pub fn order_watch_events<I>(mut events: Vec<WatchEvent<I>>) -> Vec<WatchEvent<I>> {
    events.sort_by_key(WatchEvent::rank);
    events
}

/// Fold one event into the collection.
///
/// `new` and `updated` drop any item with the same identifier and append
/// the event's item, so an update moves the item to the end.
pub fn process_watch_event_with_id<I: Identified>(current: Vec<I>, event: WatchEvent<I>) -> Vec<I> {
    match event {
        WatchEvent::New(item) | WatchEvent::Updated(item) => {
            let id = item.identifier();
            let mut next: Vec<I> = current
                .into_iter()
                .filter(|existing| existing.identifier() != id)
                .collect();
            next.push(item);
            next
        }
        WatchEvent::Deleted(item) => {
            let id = item.identifier();
            current
                .into_iter()
                .filter(|existing| existing.identifier() != id)
                .collect()
        }
    }
}

/// Order a batch and fold it into `current`.
pub fn apply_watch_events<I: Identified>(current: Vec<I>, events: Vec<WatchEvent<I>>) -> Vec<I> {
    order_watch_events(events)
        .into_iter()
        .fold(current, process_watch_event_with_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Todo {
        id: u32,
        v: String,
    }

    impl Identified for Todo {
        type Id = u32;

        fn identifier(&self) -> u32 {
            self.id
        }
    }

    fn todo(id: u32, v: &str) -> Todo {
        Todo { id, v: v.into() }
    }

    #[test]
    fn test_delete_then_recreate_nets_to_update() {
        let current = vec![todo(1, "a")];
        let batch = vec![
            WatchEvent::Deleted(todo(1, "a")),
            WatchEvent::New(todo(1, "b")),
        ];
        assert_eq!(apply_watch_events(current, batch), vec![todo(1, "b")]);
    }

    #[test]
    fn test_ordering_is_fixed_and_stable() {
        let batch = vec![
            WatchEvent::Updated(todo(1, "u1")),
            WatchEvent::New(todo(2, "n")),
            WatchEvent::Deleted(todo(3, "d")),
            WatchEvent::Updated(todo(4, "u2")),
        ];
        let ordered = order_watch_events(batch);
        let ids: Vec<u32> = ordered.iter().map(|e| e.item().id).collect();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_new_before_delete_in_input_still_survives() {
        let current = vec![todo(1, "a")];
        let batch = vec![
            WatchEvent::New(todo(1, "b")),
            WatchEvent::Deleted(todo(1, "a")),
        ];
        assert_eq!(apply_watch_events(current, batch), vec![todo(1, "b")]);
    }

    #[test]
    fn test_update_moves_item_to_end() {
        let current = vec![todo(1, "a"), todo(2, "b")];
        let next = process_watch_event_with_id(current, WatchEvent::Updated(todo(1, "c")));
        assert_eq!(next, vec![todo(2, "b"), todo(1, "c")]);
    }

    #[test]
    fn test_wire_shape() {
        let event: WatchEvent<Todo> =
            serde_json::from_str(r#"{"tag":"deleted","item":{"id":7,"v":"x"}}"#).unwrap();
        assert_eq!(event, WatchEvent::Deleted(todo(7, "x")));
        assert_eq!(
            serde_json::to_string(&WatchEvent::New(todo(1, "y"))).unwrap(),
            r#"{"tag":"new","item":{"id":1,"v":"y"}}"#
        );
    }
}
