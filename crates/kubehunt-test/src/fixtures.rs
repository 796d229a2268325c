//! Test fixtures: events and API response bodies.

use kubehunt_events::{EventPayload, HuntEvent, Target};
use serde_json::{Value, json};

/// A target that never resolves to a real server.
#[must_use]
pub fn test_target() -> Target {
    Target::new("mockKubernetes", Some(443), "https")
}

/// A discovery seed for `target`.
#[must_use]
pub fn seed_event(target: Target, credential: Option<&str>) -> HuntEvent {
    HuntEvent::seed(target, credential.map(ToString::to_string))
}

/// A passive-phase aggregate listing `namespaces`.
#[must_use]
pub fn finished_event(target: Target, credential: Option<&str>, namespaces: &[&str]) -> HuntEvent {
    let seed = seed_event(target, credential);
    HuntEvent::derive(
        &seed,
        "fixture",
        credential.map(ToString::to_string),
        EventPayload::PassiveHuntFinished {
            namespaces: namespaces.iter().map(ToString::to_string).collect(),
        },
    )
}

/// A list response with one item per name.
#[must_use]
pub fn named_list_body(names: &[&str]) -> Value {
    let items: Vec<Value> = names
        .iter()
        .map(|name| json!({ "metadata": { "name": name } }))
        .collect();
    json!({ "items": items })
}

/// A pod list response from `(name, namespace)` pairs.
#[must_use]
pub fn pods_body(pods: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = pods
        .iter()
        .map(|(name, namespace)| json!({ "metadata": { "name": name, "namespace": namespace } }))
        .collect();
    json!({ "items": items })
}

/// A list response with no items.
#[must_use]
pub fn empty_list_body() -> Value {
    json!({ "items": [] })
}

/// A create response naming the created object.
#[must_use]
pub fn created_body(name: &str) -> Value {
    json!({ "metadata": { "name": name } })
}

/// A delete response carrying a deletion timestamp.
#[must_use]
pub fn deleted_body(name: &str, deletion_timestamp: &str) -> Value {
    json!({ "metadata": { "name": name, "deletionTimestamp": deletion_timestamp } })
}
