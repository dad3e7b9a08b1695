//! Federate receiver sets for multilateration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use ridwatch_core::config::FederatePolicy;
use ridwatch_core::constants::MLAT_MIN_FEDERATES;
use ridwatch_core::enums::HostType;
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::types::ReceiverId;

use crate::store::EventStore;

/// Ordered, fixed set of trusted receivers. Always at least
/// [`MLAT_MIN_FEDERATES`] distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederateSet {
    ids: Vec<ReceiverId>,
}

impl FederateSet {
    pub fn new(ids: Vec<ReceiverId>) -> EngineResult<Self> {
        let distinct: BTreeSet<_> = ids.iter().collect();
        if distinct.len() != ids.len() {
            return Err(EngineError::config(format!(
                "federate set {ids:?} contains duplicate receivers"
            )));
        }
        if ids.len() < MLAT_MIN_FEDERATES {
            return Err(EngineError::config(format!(
                "federate set {ids:?} has {} receivers; multilateration needs at least {MLAT_MIN_FEDERATES}",
                ids.len()
            )));
        }
        Ok(Self { ids })
    }

    /// Apply a policy to one scenario.
    pub fn resolve(policy: &FederatePolicy, store: &EventStore) -> EngineResult<Self> {
        let ids = match policy {
            FederatePolicy::FirstNonSpoofer { count } => {
                let candidates: Vec<ReceiverId> = store
                    .hosts()
                    .iter()
                    .filter(|(_, t)| matches!(t, HostType::Benign | HostType::Federate))
                    .map(|(id, _)| *id)
                    .collect();
                if candidates.len() < *count {
                    return Err(EngineError::config(format!(
                        "scenario {} has {} non-spoofer hosts, federate policy needs {count}",
                        store.scenario_id(),
                        candidates.len()
                    )));
                }
                // BTreeMap iteration is already ascending by id.
                candidates.into_iter().take(*count).collect()
            }
            FederatePolicy::Labeled => store
                .hosts()
                .iter()
                .filter(|(_, t)| **t == HostType::Federate)
                .map(|(id, _)| *id)
                .collect(),
            FederatePolicy::Explicit { ids } => ids.clone(),
        };
        Self::new(ids).map_err(|e| match e {
            EngineError::Config(msg) => {
                EngineError::Config(format!("scenario {}: {msg}", store.scenario_id()))
            }
            other => other,
        })
    }

    pub fn ids(&self) -> &[ReceiverId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ReceiverId) -> bool {
        self.ids.contains(&id)
    }

    /// Position of `id` within the set.
    pub fn index_of(&self, id: ReceiverId) -> Option<usize> {
        self.ids.iter().position(|&f| f == id)
    }
}
