use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// A reservation window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "reservation_start")]
    pub start: Ms,
    #[serde(rename = "reservation_end")]
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Half-open intersection: windows that only touch at an endpoint do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Closed intersection: windows sharing an endpoint count as overlapping.
    pub fn touches(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Which intersection test the ledger applies between windows on one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Back-to-back windows (`a.end == b.start`) conflict.
    #[default]
    Inclusive,
    /// Back-to-back windows are allowed.
    HalfOpen,
}

impl OverlapPolicy {
    pub fn conflicts(self, a: &Span, b: &Span) -> bool {
        match self {
            OverlapPolicy::Inclusive => a.touches(b),
            OverlapPolicy::HalfOpen => a.overlaps(b),
        }
    }
}

/// Order reservations by window start, ascending.
pub fn sort_by_start(reservations: &mut [Reservation]) {
    reservations.sort_by_key(|r| (r.reservation_start, r.id));
}

// ── Rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub equipment_id: Ulid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub short_description: String,
    pub full_description: String,
    /// Derived at read time; never stored.
    #[serde(default)]
    pub reserved: bool,
}

/// Input for creating an equipment item. The ID is generated by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEquipment {
    #[serde(default)]
    pub name: String,
    pub short_description: String,
    #[serde(default)]
    pub full_description: String,
}

/// Input for updating an equipment item. `name: None` keeps the stored name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentUpdate {
    pub equipment_id: Ulid,
    #[serde(default)]
    pub name: Option<String>,
    pub short_description: String,
    #[serde(default)]
    pub full_description: String,
}

/// A booking record. Never updated in place; cancellation deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: Ulid,
    pub equipment_id: Ulid,
    pub reservation_start: Ms,
    pub reservation_end: Ms,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.reservation_start, self.reservation_end)
    }

    /// Live = not yet ended at `now`.
    pub fn is_live(&self, now: Ms) -> bool {
        now < self.reservation_end
    }
}

/// In-memory state for one equipment item: its record plus every reservation row on it.
#[derive(Debug, Clone)]
pub struct EquipmentState {
    pub id: Ulid,
    pub name: String,
    pub short_description: String,
    pub full_description: String,
    /// All reservations, sorted by `reservation_start`. Windows never overlap,
    /// so ends ascend with starts.
    pub reservations: Vec<Reservation>,
    /// Set under the write lock when the item is deleted, so writers queued on
    /// the lock observe the deletion.
    pub retired: bool,
}

impl EquipmentState {
    pub fn new(id: Ulid, name: String, short_description: String, full_description: String) -> Self {
        Self {
            id,
            name,
            short_description,
            full_description,
            reservations: Vec::new(),
            retired: false,
        }
    }

    /// Insert reservation maintaining sort order by start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.reservation_start, |r| r.reservation_start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Remove reservation by id.
    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// First stored reservation whose window conflicts with `span` under `policy`.
    /// Uses binary search to skip rows starting after `span.end`.
    pub fn first_conflict(&self, span: &Span, policy: OverlapPolicy) -> Option<&Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.reservation_start <= span.end);
        self.reservations[..right_bound]
            .iter()
            .find(|r| policy.conflicts(&r.span(), span))
    }

    /// The single nearest window that has not ended at `now`.
    pub fn nearest_live(&self, now: Ms) -> Option<&Reservation> {
        let idx = self.reservations.partition_point(|r| r.reservation_end <= now);
        self.reservations.get(idx)
    }

    pub fn occupied_at(&self, now: Ms) -> bool {
        self.nearest_live(now)
            .is_some_and(|r| r.span().contains_instant(now))
    }

    pub fn has_live(&self, now: Ms) -> bool {
        self.nearest_live(now).is_some()
    }

    pub fn to_equipment(&self, now: Ms) -> Equipment {
        Equipment {
            equipment_id: self.id,
            name: self.name.clone(),
            short_description: self.short_description.clone(),
            full_description: self.full_description.clone(),
            reserved: self.occupied_at(now),
        }
    }
}

/// Flat event records; this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    EquipmentCreated {
        id: Ulid,
        name: String,
        short_description: String,
        full_description: String,
    },
    EquipmentUpdated {
        id: Ulid,
        name: String,
        short_description: String,
        full_description: String,
    },
    EquipmentDeleted {
        id: Ulid,
    },
    ReservationBooked {
        id: Ulid,
        equipment_id: Ulid,
        user_id: Ulid,
        span: Span,
    },
    ReservationCancelled {
        id: Ulid,
        equipment_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Result of a booking attempt. A rejection is a normal outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Created { id: Ulid },
    Rejected { conflicting: Ulid },
}

impl ReserveOutcome {
    pub fn created(&self) -> bool {
        matches!(self, ReserveOutcome::Created { .. })
    }
}

/// An item's full booking calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub amount: usize,
    #[serde(rename = "data")]
    pub windows: Vec<Span>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            user_id: Ulid::new(),
            equipment_id: Ulid::new(),
            reservation_start: start,
            reservation_end: end,
        }
    }

    fn state_with(windows: &[(Ms, Ms)]) -> EquipmentState {
        let mut st = EquipmentState::new(Ulid::new(), "Drill".into(), "cordless".into(), String::new());
        for &(s, e) in windows {
            st.insert_reservation(reservation(s, e));
        }
        st
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn span_touches_counts_shared_endpoint() {
        let a = Span::new(100, 200);
        let c = Span::new(200, 300);
        let d = Span::new(201, 300);
        assert!(a.touches(&c));
        assert!(c.touches(&a));
        assert!(!a.touches(&d));
    }

    #[test]
    fn policy_decides_back_to_back() {
        let a = Span::new(100, 200);
        let b = Span::new(200, 300);
        assert!(OverlapPolicy::Inclusive.conflicts(&a, &b));
        assert!(!OverlapPolicy::HalfOpen.conflicts(&a, &b));
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Inclusive);
    }

    #[test]
    fn containing_window_conflicts() {
        // New window strictly contains an existing one.
        let existing = Span::new(150, 160);
        let candidate = Span::new(100, 200);
        assert!(OverlapPolicy::HalfOpen.conflicts(&existing, &candidate));
        assert!(OverlapPolicy::Inclusive.conflicts(&existing, &candidate));
    }

    #[test]
    fn reservation_ordering() {
        let st = state_with(&[(300, 400), (100, 200), (200, 250)]);
        let starts: Vec<Ms> = st.reservations.iter().map(|r| r.reservation_start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn sort_by_start_orders_ascending() {
        let mut rows = vec![reservation(500, 600), reservation(100, 200), reservation(300, 400)];
        sort_by_start(&mut rows);
        let starts: Vec<Ms> = rows.iter().map(|r| r.reservation_start).collect();
        assert_eq!(starts, vec![100, 300, 500]);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut st = state_with(&[(100, 200)]);
        assert!(st.remove_reservation(Ulid::new()).is_none());
        assert_eq!(st.reservations.len(), 1);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut st = state_with(&[(0, 50), (100, 150), (200, 250)]);
        let middle = st.reservations[1].id;
        st.remove_reservation(middle);
        assert_eq!(st.reservations.len(), 2);
        assert_eq!(st.reservations[0].reservation_start, 0);
        assert_eq!(st.reservations[1].reservation_start, 200);
    }

    #[test]
    fn first_conflict_skips_past_and_future() {
        let st = state_with(&[(100, 200), (450, 600), (1000, 1100)]);
        let hit = st.first_conflict(&Span::new(500, 800), OverlapPolicy::HalfOpen).unwrap();
        assert_eq!(hit.reservation_start, 450);
        assert!(st.first_conflict(&Span::new(700, 900), OverlapPolicy::HalfOpen).is_none());
    }

    #[test]
    fn first_conflict_respects_policy_at_boundary() {
        let st = state_with(&[(100, 200)]);
        let after = Span::new(200, 300);
        let before = Span::new(50, 100);
        assert!(st.first_conflict(&after, OverlapPolicy::Inclusive).is_some());
        assert!(st.first_conflict(&after, OverlapPolicy::HalfOpen).is_none());
        assert!(st.first_conflict(&before, OverlapPolicy::Inclusive).is_some());
        assert!(st.first_conflict(&before, OverlapPolicy::HalfOpen).is_none());
    }

    #[test]
    fn first_conflict_empty_state() {
        let st = state_with(&[]);
        assert!(st.first_conflict(&Span::new(0, 1000), OverlapPolicy::Inclusive).is_none());
    }

    #[test]
    fn nearest_live_skips_ended_windows() {
        let st = state_with(&[(100, 200), (300, 400), (500, 600)]);
        assert_eq!(st.nearest_live(250).unwrap().reservation_start, 300);
        assert_eq!(st.nearest_live(350).unwrap().reservation_start, 300);
        // A window ending exactly now has ended.
        assert_eq!(st.nearest_live(400).unwrap().reservation_start, 500);
        assert!(st.nearest_live(600).is_none());
    }

    #[test]
    fn occupancy_is_half_open() {
        let st = state_with(&[(100, 200)]);
        assert!(!st.occupied_at(99));
        assert!(st.occupied_at(100));
        assert!(st.occupied_at(199));
        assert!(!st.occupied_at(200));
        assert!(st.has_live(50));
        assert!(!st.has_live(200));
    }

    #[test]
    fn equipment_json_field_names() {
        let st = state_with(&[(100, 200)]);
        let json = serde_json::to_value(st.to_equipment(150)).unwrap();
        assert_eq!(json["reserved"], true);
        assert_eq!(json["short_description"], "cordless");
        assert!(json.get("equipment_id").is_some());
        assert!(json.get("full_description").is_some());
    }

    #[test]
    fn reservation_info_json_shape() {
        let info = ReservationInfo {
            amount: 1,
            windows: vec![Span::new(100, 200)],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["amount"], 1);
        assert_eq!(json["data"][0]["reservation_start"], 100);
        assert_eq!(json["data"][0]["reservation_end"], 200);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationBooked {
            id: Ulid::new(),
            equipment_id: Ulid::new(),
            user_id: Ulid::new(),
            span: Span::new(100, 200),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
