//! Admission control for card runs.
//!
//! Each run is keyed by one or more [`RunIdentity`] values. An identity is
//! rejected while a run holding it is active, and for a cool-down period
//! after that run finishes. The store is process-local: several relay
//! instances behind a load balancer do not see each other's admissions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::trello::CardEvent;

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Key under which a run is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunIdentity {
    /// A single Trello action; catches redelivery of the same webhook
    Event(String),
    /// A card with a given description; catches near-simultaneous
    /// deliveries describing the same task
    Content { card_id: String, fingerprint: String },
}

impl RunIdentity {
    /// Identities for a card event: the action id (when present) and the
    /// card content.
    #[must_use]
    pub fn for_event(event: &CardEvent) -> Vec<Self> {
        let mut identities = Vec::with_capacity(2);
        if let Some(action_id) = &event.action_id {
            identities.push(Self::Event(action_id.clone()));
        }
        identities.push(Self::Content {
            card_id: event.card_id.clone(),
            fingerprint: fingerprint(&event.description),
        });
        identities
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(id) => write!(f, "event:{id}"),
            Self::Content {
                card_id,
                fingerprint,
            } => write!(f, "card:{card_id}:{}", &fingerprint[..fingerprint.len().min(12)]),
        }
    }
}

/// SHA-1 hex digest of the trimmed description.
#[must_use]
pub fn fingerprint(description: &str) -> String {
    hex::encode(Sha1::digest(description.trim().as_bytes()))
}

/// Why an admission was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A run holding the identity is still active
    InFlight(RunIdentity),
    /// A run holding the identity finished within its cool-down
    CoolingDown(RunIdentity),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InFlight(id) => write!(f, "{id} is already running"),
            Self::CoolingDown(id) => write!(f, "{id} completed recently"),
        }
    }
}

/// Cool-down lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindows {
    /// Cool-down for content identities
    pub debounce: Duration,
    /// Cool-down for event identities and the sweep horizon
    pub retention: Duration,
}

impl Default for DedupWindows {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(30),
            retention: Duration::from_secs(600),
        }
    }
}

impl DedupWindows {
    fn cooldown(&self, identity: &RunIdentity) -> Duration {
        match identity {
            RunIdentity::Event(_) => self.retention,
            RunIdentity::Content { .. } => self.debounce,
        }
    }
}

/// Backing store for admissions.
///
/// `try_admit` must check and record in one step so two concurrent
/// requests cannot both pass.
pub trait AdmissionStore: Send + Sync {
    /// Admit every identity, or none of them.
    fn try_admit(&self, identities: &[RunIdentity], now: Instant) -> Result<(), Rejection>;

    /// Mark identities idle and start their cool-down.
    fn release(&self, identities: &[RunIdentity], now: Instant);

    /// Evict cool-down records older than the retention horizon. Returns the
    /// number evicted.
    fn sweep(&self, now: Instant) -> usize;
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Active,
    Completed(Instant),
}

/// In-memory [`AdmissionStore`].
#[derive(Debug)]
pub struct InMemoryAdmissionStore {
    windows: DedupWindows,
    slots: Mutex<HashMap<RunIdentity, Slot>>,
}

impl InMemoryAdmissionStore {
    #[must_use]
    pub fn new(windows: DedupWindows) -> Self {
        Self {
            windows,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RunIdentity, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tracked identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AdmissionStore for InMemoryAdmissionStore {
    fn try_admit(&self, identities: &[RunIdentity], now: Instant) -> Result<(), Rejection> {
        let mut slots = self.slots();
        for identity in identities {
            match slots.get(identity) {
                Some(Slot::Active) => return Err(Rejection::InFlight(identity.clone())),
                Some(Slot::Completed(at))
                    if now.saturating_duration_since(*at) < self.windows.cooldown(identity) =>
                {
                    return Err(Rejection::CoolingDown(identity.clone()));
                }
                _ => {}
            }
        }
        for identity in identities {
            slots.insert(identity.clone(), Slot::Active);
        }
        Ok(())
    }

    fn release(&self, identities: &[RunIdentity], now: Instant) {
        let mut slots = self.slots();
        for identity in identities {
            slots.insert(identity.clone(), Slot::Completed(now));
        }
    }

    fn sweep(&self, now: Instant) -> usize {
        let retention = self.windows.retention;
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Active => true,
            Slot::Completed(at) => now.saturating_duration_since(*at) < retention,
        });
        before - slots.len()
    }
}

/// Admission guard handing out scoped permits.
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<dyn AdmissionStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn AdmissionStore>) -> Self {
        Self { store }
    }

    /// Guard over an in-memory store.
    #[must_use]
    pub fn in_memory(windows: DedupWindows) -> Self {
        Self::new(Arc::new(InMemoryAdmissionStore::new(windows)))
    }

    /// Admit a run. The identities are released when the permit drops.
    pub fn admit(&self, identities: Vec<RunIdentity>) -> Result<AdmissionPermit, Rejection> {
        self.store.try_admit(&identities, Instant::now())?;
        Ok(AdmissionPermit {
            store: self.store.clone(),
            identities,
        })
    }

    /// Evict expired cool-down records now.
    pub fn sweep(&self) -> usize {
        self.store.sweep(Instant::now())
    }

    /// Sweep on a fixed period until the task is aborted.
    #[must_use]
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = guard.sweep();
                if evicted > 0 {
                    debug!(evicted, "Swept dedup records");
                }
            }
        })
    }
}

/// Held for the lifetime of an admitted run.
#[must_use = "dropping the permit releases the run immediately"]
pub struct AdmissionPermit {
    store: Arc<dyn AdmissionStore>,
    identities: Vec<RunIdentity>,
}

impl AdmissionPermit {
    pub fn identities(&self) -> &[RunIdentity] {
        &self.identities
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.store.release(&self.identities, Instant::now());
    }
}
