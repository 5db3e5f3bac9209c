use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryStatus;
use crate::types::EndpointId;

/// Filter for listing deliveries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryQuery {
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub endpoint_id: Option<EndpointId>,
    /// Maximum number of results; `None` returns everything.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl DeliveryQuery {
    pub fn with_status(status: DeliveryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Delivery counts per status plus in-process counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Count of persisted deliveries keyed by status name.
    pub by_status: BTreeMap<DeliveryStatus, u64>,
    pub total: u64,
}

impl DeliveryStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (DeliveryStatus, u64)>) -> Self {
        let mut by_status: BTreeMap<DeliveryStatus, u64> =
            DeliveryStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for (status, n) in counts {
            *by_status.entry(status).or_default() += n;
        }
        let total = by_status.values().sum();
        Self { by_status, total }
    }

    pub fn count(&self, status: DeliveryStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_counts_fills_every_status() {
        let stats = DeliveryStats::from_counts([
            (DeliveryStatus::Success, 3),
            (DeliveryStatus::Retrying, 1),
        ]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count(DeliveryStatus::Success), 3);
        assert_eq!(stats.count(DeliveryStatus::Cancelled), 0);
        assert_eq!(stats.by_status.len(), DeliveryStatus::ALL.len());
    }

    #[test]
    fn serializes_status_keys_as_names() {
        let stats = DeliveryStats::from_counts([(DeliveryStatus::Exhausted, 2)]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_status"]["exhausted"], 2);
        assert_eq!(json["total"], 2);
    }
}
