use std::collections::{HashMap, HashSet};

use hookline_core::{EndpointId, WebhookEndpoint, WebhookSubscription};

/// A subscription paired with the endpoint it delivers to.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub subscription: &'a WebhookSubscription,
    pub endpoint: &'a WebhookEndpoint,
}

/// Select the subscriptions that should receive an event.
///
/// A subscription matches when it is active, its endpoint is known and
/// active, the endpoint's allow-list admits `event_type`, one of its
/// patterns matches `event_type`, and every filter predicate holds on
/// `payload`. Results are sorted by subscription id.
pub fn match_subscriptions<'a>(
    event_type: &str,
    payload: &serde_json::Value,
    subscriptions: &'a [WebhookSubscription],
    endpoints: &'a [WebhookEndpoint],
) -> Vec<Match<'a>> {
    let by_id: HashMap<&EndpointId, &WebhookEndpoint> =
        endpoints.iter().map(|ep| (&ep.id, ep)).collect();

    let mut matched: Vec<Match<'a>> = subscriptions
        .iter()
        .filter(|sub| sub.matches(event_type, payload))
        .filter_map(|sub| {
            let endpoint = *by_id.get(&sub.endpoint_id)?;
            (endpoint.active && endpoint.accepts_event(event_type)).then_some(Match {
                subscription: sub,
                endpoint,
            })
        })
        .collect();
    matched.sort_by(|a, b| a.subscription.id.cmp(&b.subscription.id));
    matched
}

/// Collapse matches to one per endpoint, keeping the first (lowest
/// subscription id) for each.
pub fn first_per_endpoint<'a>(matches: Vec<Match<'a>>) -> Vec<Match<'a>> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert(m.endpoint.id.clone()))
        .collect()
}
