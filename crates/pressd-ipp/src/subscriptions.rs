// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request/response shapes for the subscription/event operation family.
// The rings themselves (`pressd_core::subscription::Subscription`) are
// owned by the backend; this module only translates between IPP
// attribute groups and that core type.

use std::collections::BTreeSet;
use std::time::Duration;

use pressd_core::{Event, EventKind, Subscription, SubscriptionId};

use crate::wire::{IppAttributeGroup, ResponseBuilder, TAG_EVENT_NOTIFICATION_ATTRIBUTES, TAG_SUBSCRIPTION_ATTRIBUTES};

/// A validated `Create-*-Subscriptions` request group, ready to hand to
/// the backend.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub events: BTreeSet<EventKind>,
    pub notify_user_data: Vec<u8>,
    /// `None` means infinite (the wire value `0`).
    pub lease_duration: Option<Duration>,
    pub username: String,
}

/// Append one `subscription-attributes` group describing `sub` to a
/// response under construction (used by Get-Subscriptions and
/// Get-Subscription-Attributes).
pub fn write_subscription_group(resp: &mut ResponseBuilder, sub: &Subscription) {
    resp.begin_group(TAG_SUBSCRIPTION_ATTRIBUTES).integer("notify-subscription-id", sub.id.0 as i32);
    for kind in &sub.events {
        resp.keyword("notify-events", kind.keyword());
    }
    match sub.lease_expiry {
        Some(expiry) => {
            let remaining = (expiry - chrono::Utc::now()).num_seconds().max(0);
            resp.integer("notify-lease-duration", remaining as i32);
        }
        None => {
            resp.integer("notify-lease-duration", 0);
        }
    }
    resp.keyword("notify-pull-method", "ippget");
}

/// Append one `event-notification-attributes` group per event, for
/// Get-Notifications.
pub fn write_notification_groups(resp: &mut ResponseBuilder, sub_id: SubscriptionId, events: &[Event]) {
    for event in events {
        resp.begin_group(TAG_EVENT_NOTIFICATION_ATTRIBUTES)
            .integer("notify-subscription-id", sub_id.0 as i32)
            .integer("notify-sequence-number", event.sequence as i32)
            .keyword("notify-subscribed-event", event.kind.keyword())
            .date_time("notify-text", event.occurred_at);
        for (key, value) in &event.attributes {
            resp.text(key, value);
        }
    }
}

/// Parse the parallel `notify-subscription-ids` / `notify-sequence-numbers`
/// arrays a Get-Notifications request carries.
pub fn parse_notification_request(group: &IppAttributeGroup) -> Option<(Vec<SubscriptionId>, Vec<u64>, bool)> {
    let ids: Vec<SubscriptionId> = group
        .get_all_integers("notify-subscription-ids")
        .into_iter()
        .filter(|&id| id >= 0)
        .map(|id| SubscriptionId(id as u32))
        .collect();
    if ids.is_empty() {
        return None;
    }
    let mut sequences: Vec<u64> =
        group.get_all_integers("notify-sequence-numbers").into_iter().map(|n| n.max(0) as u64).collect();
    while sequences.len() < ids.len() {
        sequences.push(0);
    }
    let wait = group.get_boolean("notify-wait").unwrap_or(false);
    Some((ids, sequences, wait))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{parse_request, IppAttribute};

    fn group_with(attrs: Vec<IppAttribute>) -> IppAttributeGroup {
        IppAttributeGroup { delimiter: crate::wire::TAG_OPERATION_ATTRIBUTES, attributes: attrs }
    }

    #[test]
    fn notification_request_parses_single_subscription() {
        let group = group_with(vec![
            IppAttribute {
                value_tag: crate::wire::VALUE_TAG_INTEGER,
                name: "notify-subscription-ids".into(),
                value: 4i32.to_be_bytes().to_vec(),
            },
            IppAttribute {
                value_tag: crate::wire::VALUE_TAG_INTEGER,
                name: "notify-sequence-numbers".into(),
                value: 10i32.to_be_bytes().to_vec(),
            },
        ]);
        let (ids, seqs, wait) = parse_notification_request(&group).unwrap();
        assert_eq!(ids, vec![SubscriptionId(4)]);
        assert_eq!(seqs, vec![10]);
        assert!(!wait);
    }

    #[test]
    fn notification_request_none_without_ids() {
        let group = group_with(vec![]);
        assert!(parse_notification_request(&group).is_none());
    }

    #[test]
    fn notification_request_parses_1setof_binary_integers() {
        let group = group_with(vec![
            IppAttribute { value_tag: crate::wire::VALUE_TAG_INTEGER, name: "notify-subscription-ids".into(), value: 4i32.to_be_bytes().to_vec() },
            IppAttribute { value_tag: crate::wire::VALUE_TAG_INTEGER, name: "".into(), value: 9i32.to_be_bytes().to_vec() },
            IppAttribute { value_tag: crate::wire::VALUE_TAG_INTEGER, name: "notify-sequence-numbers".into(), value: 1i32.to_be_bytes().to_vec() },
            IppAttribute { value_tag: crate::wire::VALUE_TAG_INTEGER, name: "".into(), value: 2i32.to_be_bytes().to_vec() },
        ]);
        let (ids, seqs, _) = parse_notification_request(&group).unwrap();
        assert_eq!(ids, vec![SubscriptionId(4), SubscriptionId(9)]);
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn subscription_group_round_trips_id_and_lease() {
        let sub = Subscription::new(
            SubscriptionId(7),
            pressd_core::SubscriptionOwner::System,
            BTreeSet::from([EventKind::JobStateChanged]),
            vec![],
            None,
            "alice",
            100,
        );
        let mut resp = ResponseBuilder::new(crate::wire::STATUS_OK, 1);
        write_subscription_group(&mut resp, &sub);
        let parsed = parse_request(&resp.build()).unwrap();
        let group = &parsed.attribute_groups[0];
        assert_eq!(group.get_integer("notify-subscription-id"), Some(7));
        assert_eq!(group.get_integer("notify-lease-duration"), Some(0));
    }
}
