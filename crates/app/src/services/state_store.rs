//! Device state reconciler: per-device critical sections over device state.
//!
//! Each device gets its own async mutex; the outer map lock is held only to
//! find or create that slot, so unrelated devices never wait on each other.
//! Telemetry and brew deductions both go through [`DeviceStateStore::try_apply`],
//! which serialises every mutation of one device in lock-arrival order.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use brewlink_domain::alert::Crossing;
use brewlink_domain::device::{ClampedField, DeviceState, StateUpdate, Thresholds};
use brewlink_domain::id::DeviceId;
use brewlink_domain::reading::TelemetryReading;

type Slot = Arc<tokio::sync::Mutex<Option<DeviceState>>>;

/// Result of one reconciled mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// State after the mutation.
    pub state: DeviceState,
    pub crossings: Vec<Crossing>,
    pub clamped: Vec<ClampedField>,
    pub rejected: Vec<&'static str>,
}

/// One planned mutation as seen inside the critical section.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct JournalEntry {
    pub seen: Option<DeviceState>,
    /// `None` when the plan refused.
    pub update: Option<StateUpdate>,
}

/// Owner of every [`DeviceState`]. States are created lazily and never deleted.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    slots: Mutex<HashMap<DeviceId, Slot>>,
    thresholds: Thresholds,
    #[cfg(test)]
    journal: Mutex<Vec<JournalEntry>>,
}

impl DeviceStateStore {
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            thresholds,
            #[cfg(test)]
            journal: Mutex::default(),
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    fn slot(&self, device_id: DeviceId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(device_id).or_default())
    }

    /// Merge a telemetry reading into the device state.
    #[tracing::instrument(skip(self, reading), fields(device_id = %reading.device_id))]
    pub async fn reconcile(&self, reading: &TelemetryReading) -> Reconciliation {
        let update = reading.update();
        let Ok(reconciliation) = self
            .try_apply(reading.device_id, |_| Ok::<_, Infallible>(update))
            .await;
        reconciliation
    }

    /// Plan and apply an update inside the device's critical section.
    ///
    /// `plan` sees the current state (`None` if the device never reported)
    /// and either returns the update to apply or refuses. A refusal leaves
    /// the state untouched, and a device without state is not created.
    ///
    /// # Errors
    ///
    /// Returns whatever `plan` refused with.
    pub async fn try_apply<F, E>(&self, device_id: DeviceId, plan: F) -> Result<Reconciliation, E>
    where
        F: FnOnce(Option<&DeviceState>) -> Result<StateUpdate, E>,
    {
        let slot = self.slot(device_id);
        let mut guard = slot.lock().await;

        let planned = plan(guard.as_ref());
        #[cfg(test)]
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(JournalEntry {
                seen: guard.clone(),
                update: planned.as_ref().ok().cloned(),
            });
        let update = planned?;
        let state = guard.get_or_insert_with(|| DeviceState::new(device_id));
        let applied = state.apply(&update, &self.thresholds);

        for clamp in &applied.clamped {
            tracing::warn!(
                %device_id,
                field = clamp.field,
                received = clamp.received,
                stored = clamp.stored,
                "MALFORMED_READING: value clamped"
            );
        }
        for field in &applied.rejected {
            tracing::warn!(%device_id, field, "MALFORMED_READING: non-finite value dropped");
        }

        Ok(Reconciliation {
            state: state.clone(),
            crossings: applied.crossings,
            clamped: applied.clamped,
            rejected: applied.rejected,
        })
    }

    /// Current state of a device, if it ever reported.
    pub async fn snapshot(&self, device_id: DeviceId) -> Option<DeviceState> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(&device_id).map(Arc::clone)?
        };
        slot.lock().await.clone()
    }

    /// Soft-deactivate a device so it refuses brews. Returns `false` when
    /// the device is unknown.
    pub async fn deactivate(&self, device_id: DeviceId) -> bool {
        let slot = self.slot(device_id);
        let mut guard = slot.lock().await;
        match guard.as_mut() {
            Some(state) => {
                state.active = false;
                true
            }
            None => false,
        }
    }

    /// Every planned mutation, in lock order.
    #[cfg(test)]
    pub(crate) fn journal(&self) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of every device with state, in ascending order.
    pub async fn device_ids(&self) -> Vec<DeviceId> {
        let slots: Vec<(DeviceId, Slot)> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect()
        };
        let mut ids = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            if slot.lock().await.is_some() {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids
    }
}
