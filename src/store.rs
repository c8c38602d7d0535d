//! The authoritative store for markers and zones.
//!
//! The store is shared through a [`StoreHandle`] that the map surface, the command
//! bridge and the host all hold. Every mutation is visible to readers as soon as the
//! call returns and subscribers are notified synchronously, after the mutation, with
//! a fresh [`StoreSnapshot`].

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::codec::{MAX_GRID_PRECISION, encode_grid_ref, validate_lat_lon};
use crate::projection::GeoPos;
use crate::seed::ZoneSeed;
use crate::{MapError, Result};

/// A shared handle to a [`MapStore`].
pub type StoreHandle = Rc<MapStore>;

/// Identifier of a marker. Unique within a session and never reused.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MarkerId(String);

impl MarkerId {
    /// Wraps an identifier received from the host, e.g. from a list selection.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a risk zone.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ZoneId(String);

impl ZoneId {
    /// Creates a zone identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point marker placed by the user or by a navigation command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Identifier.
    pub id: MarkerId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Grid reference of the marker position.
    pub grid_ref: String,
    /// When the marker was created.
    pub created_at: DateTime<Utc>,
}

impl Marker {
    /// The position of the marker.
    pub fn pos(&self) -> GeoPos {
        GeoPos::from_lat_lon(self.lat, self.lon)
    }

    /// A short title for popups and lists.
    pub fn title(&self) -> String {
        format!("Marker {}", self.id)
    }
}

/// A closed polygon with a risk score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Identifier.
    pub id: ZoneId,
    /// Display name.
    pub name: String,
    /// Closed ring, the first point equals the last.
    pub ring: Vec<GeoPos>,
    /// Risk score between 0 and 100.
    pub risk_score: u8,
    /// Why the zone is risky.
    pub reason: Option<String>,
    /// Who is responsible for the zone.
    pub owner: Option<String>,
}

impl Zone {
    fn from_seed(index: usize, seed: ZoneSeed) -> Result<Self> {
        if seed.risk_score > 100 {
            return Err(MapError::OutOfRange(format!(
                "zone {:?} has risk score {} outside [0, 100]",
                seed.name, seed.risk_score
            )));
        }
        for point in &seed.ring {
            validate_lat_lon(point.lat, point.lon)?;
        }

        let mut ring = seed.ring;
        if ring.first() != ring.last() {
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
        }
        // The closing point repeats the first vertex and is not counted.
        let mut distinct: Vec<GeoPos> = Vec::new();
        for point in &ring[..ring.len().saturating_sub(1)] {
            if !distinct.contains(point) {
                distinct.push(*point);
            }
        }
        if distinct.len() < 3 {
            return Err(MapError::MalformedInput(format!(
                "zone {:?} needs at least three distinct points",
                seed.name
            )));
        }

        Ok(Self {
            id: ZoneId(seed.id.unwrap_or_else(|| format!("zone-{}", index + 1))),
            name: seed.name,
            ring,
            risk_score: seed.risk_score,
            reason: seed.reason,
            owner: seed.owner,
        })
    }
}

/// A point-in-time copy of the store contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Markers in insertion order.
    pub markers: Vec<Marker>,
    /// Zones in seed order.
    pub zones: Vec<Zone>,
    /// Store revision the snapshot was taken at.
    pub revision: u64,
}

/// Handle returned by [`MapStore::subscribe`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(&StoreSnapshot)>;

#[derive(Default)]
struct StoreState {
    markers: HashMap<MarkerId, Marker>,
    order: Vec<MarkerId>,
    zones: Vec<Zone>,
    revision: u64,
}

impl StoreState {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            markers: self.ordered_markers(),
            zones: self.zones.clone(),
            revision: self.revision,
        }
    }

    fn ordered_markers(&self) -> Vec<Marker> {
        self.order
            .iter()
            .filter_map(|id| self.markers.get(id).cloned())
            .collect()
    }
}

/// The single source of truth for markers and zones.
#[derive(Default)]
pub struct MapStore {
    state: RefCell<StoreState>,
    next_marker: Cell<u64>,
    next_subscription: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
}

impl fmt::Debug for MapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MapStore")
            .field("markers", &state.order.len())
            .field("zones", &state.zones.len())
            .field("revision", &state.revision)
            .finish()
    }
}

impl MapStore {
    /// Creates an empty store wrapped in a shareable handle.
    pub fn new_handle() -> StoreHandle {
        Rc::new(Self::default())
    }

    /// Adds a marker and returns its identifier. The grid reference is computed from
    /// the position when `grid_ref` is `None`.
    pub fn add_marker(&self, lat: f64, lon: f64, grid_ref: Option<String>) -> Result<MarkerId> {
        validate_lat_lon(lat, lon)?;
        let grid_ref = match grid_ref {
            Some(grid_ref) => grid_ref,
            None => encode_grid_ref(lon, lat, MAX_GRID_PRECISION)?,
        };

        let next = self.next_marker.get() + 1;
        self.next_marker.set(next);
        let id = MarkerId(format!("m{next}"));
        let marker = Marker {
            id: id.clone(),
            lat,
            lon,
            grid_ref,
            created_at: Utc::now(),
        };

        self.mutate(|state| {
            state.order.push(id.clone());
            state.markers.insert(id.clone(), marker);
        });
        debug!("Added marker {id} at ({lat}, {lon})");
        Ok(id)
    }

    /// Removes a marker. Unknown identifiers are ignored.
    pub fn remove_marker(&self, id: &MarkerId) -> Option<Marker> {
        if !self.state.borrow().markers.contains_key(id) {
            return None;
        }
        let removed = self.mutate(|state| {
            state.order.retain(|existing| existing != id);
            state.markers.remove(id)
        });
        debug!("Removed marker {id}");
        removed
    }

    /// Looks up a marker.
    pub fn get_marker(&self, id: &MarkerId) -> Option<Marker> {
        self.state.borrow().markers.get(id).cloned()
    }

    /// Looks up a marker that is expected to exist.
    pub fn require_marker(&self, id: &MarkerId) -> Result<Marker> {
        self.get_marker(id)
            .ok_or_else(|| MapError::NotFound(format!("marker {id}")))
    }

    /// All markers in insertion order. Later mutations do not affect the returned list.
    pub fn list_markers(&self) -> Vec<Marker> {
        self.state.borrow().ordered_markers()
    }

    /// The number of markers.
    pub fn marker_count(&self) -> usize {
        self.state.borrow().order.len()
    }

    /// Removes every marker in one step.
    pub fn clear_markers(&self) {
        let removed = self.mutate(|state| {
            state.markers.clear();
            std::mem::take(&mut state.order).len()
        });
        debug!("Cleared {removed} markers");
    }

    /// Looks up a zone.
    pub fn get_zone(&self, id: &ZoneId) -> Option<Zone> {
        self.state
            .borrow()
            .zones
            .iter()
            .find(|zone| &zone.id == id)
            .cloned()
    }

    /// Looks up a zone that is expected to exist.
    pub fn require_zone(&self, id: &ZoneId) -> Result<Zone> {
        self.get_zone(id)
            .ok_or_else(|| MapError::NotFound(format!("zone {id}")))
    }

    /// All zones in seed order.
    pub fn list_zones(&self) -> Vec<Zone> {
        self.state.borrow().zones.clone()
    }

    /// Replaces the zone set. Either every seed is accepted or the store is left unchanged.
    pub fn seed_zones(&self, seeds: Vec<ZoneSeed>) -> Result<()> {
        let zones = seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| Zone::from_seed(index, seed))
            .collect::<Result<Vec<_>>>()?;
        let count = zones.len();
        self.mutate(|state| state.zones = zones);
        info!("Seeded {count} risk zones");
        Ok(())
    }

    /// Increases with every mutation.
    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.borrow().snapshot()
    }

    /// Registers a callback that receives a snapshot after every mutation.
    ///
    /// Callbacks may read the store but must not mutate it.
    pub fn subscribe(&self, subscriber: impl Fn(&StoreSnapshot) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(subscriber)));
        id
    }

    /// Removes a callback registered with [`MapStore::subscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let (result, snapshot) = {
            let mut state = self.state.borrow_mut();
            let result = f(&mut state);
            state.revision += 1;
            (result, state.snapshot())
        };

        // Clone the list so a callback may unsubscribe itself.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
        result
    }
}
