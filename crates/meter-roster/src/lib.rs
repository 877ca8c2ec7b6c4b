//! Roster & identity tracker (spec.md §4.5): resolves `actor_id`s to player
//! names, gates aggregation on party membership, and defers/backfills
//! `HealthUpdate`s that arrive before the roster can resolve their actor.

use std::collections::{HashMap, HashSet, VecDeque};

use meter_proto::{ActorId, PlayerName};
use tracing::debug;

/// Monotonic capture timestamp in microseconds.
pub type TsUsec = i64;

const DEFERRED_CAP_PER_ID: usize = 256;

/// One buffered `HealthUpdate` waiting for its actor to resolve into the
/// party, per spec.md §4.5's "(ts, actor_id, dmg, heal) tuple".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredHealthUpdate {
    pub ts: TsUsec,
    pub target_id: ActorId,
    pub actor_id: ActorId,
    pub value_delta: i64,
}

/// Result of resolving one `HealthUpdate` against the current roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Gating invariant satisfied: safe to hand to the aggregator now.
    Accepted { name: PlayerName },
    /// `actor_id` isn't yet known to be a party member; buffered for replay.
    Deferred,
}

/// Per-actor record created on first observation in roster-qualifying
/// context (spec.md §3). Lives only as long as `id_to_name` does: both are
/// cleared on zone change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    pub id: ActorId,
    pub name: Option<PlayerName>,
    pub weapon_item: Option<u32>,
    pub first_seen: TsUsec,
    pub last_seen: TsUsec,
}

/// Tracks `self_id`/`self_name`/`party`/`id_to_name`/`pending_ids` and the
/// bounded deferred-replay queues spec.md §4.5 describes.
#[derive(Debug, Default)]
pub struct Roster {
    self_id: Option<ActorId>,
    self_name: Option<PlayerName>,
    party: HashSet<PlayerName>,
    id_to_name: HashMap<ActorId, PlayerName>,
    pending_ids: HashSet<ActorId>,
    deferred: HashMap<ActorId, VecDeque<DeferredHealthUpdate>>,
    actor_records: HashMap<ActorId, ActorRecord>,
    deferred_evictions: u64,
}

impl Roster {
    /// `(self_name?, self_id?)` as observed from configuration. Overridden
    /// by the first `SelfIdentified` event.
    pub fn seeded(self_name: Option<PlayerName>, self_id: Option<ActorId>) -> Self {
        let mut party = HashSet::new();
        if let Some(name) = &self_name {
            party.insert(name.clone());
        }
        Roster {
            self_id,
            self_name,
            party,
            ..Roster::default()
        }
    }

    pub fn self_id(&self) -> Option<ActorId> {
        self.self_id
    }

    pub fn self_name(&self) -> Option<&str> {
        self.self_name.as_deref()
    }

    pub fn party(&self) -> impl Iterator<Item = &str> {
        self.party.iter().map(String::as_str)
    }

    /// Total `DeferredQueueFull` evictions (spec.md §7) since construction.
    pub fn deferred_evictions(&self) -> u64 {
        self.deferred_evictions
    }

    fn is_party_member(&self, name: &str) -> bool {
        self.party.contains(name)
    }

    /// Resolves one `HealthUpdate`, applying spec.md §4.5's three-step name
    /// resolution and the party-membership gating invariant. On
    /// `Resolution::Deferred` the event (including `value_delta`, for
    /// replay) has already been buffered; the caller does nothing further
    /// with it.
    pub fn resolve(
        &mut self,
        ts: TsUsec,
        target_id: ActorId,
        actor_id: ActorId,
        value_delta: i64,
    ) -> Resolution {
        if Some(actor_id) == self.self_id {
            let name = self.self_name.clone().unwrap_or_default();
            return Resolution::Accepted { name };
        }

        if let Some(name) = self.id_to_name.get(&actor_id) {
            if self.is_party_member(name) {
                return Resolution::Accepted { name: name.clone() };
            }
        }

        self.pending_ids.insert(actor_id);
        let queue = self.deferred.entry(actor_id).or_default();
        if queue.len() >= DEFERRED_CAP_PER_ID {
            queue.pop_front();
            self.deferred_evictions += 1;
        }
        queue.push_back(DeferredHealthUpdate {
            ts,
            target_id,
            actor_id,
            value_delta,
        });
        Resolution::Deferred
    }

    /// `{0: actor_id, 1: name, 40: item_ids[]}`. Updates identity and the
    /// `ActorRecord` (weapon is item 0 of the equipped-item array, per
    /// spec.md §4.4), and returns the buffered tuples to replay, in
    /// original timestamp order, if this join resolves a pending id into
    /// the party ("late-join backfill").
    pub fn on_player_joined(
        &mut self,
        actor_id: ActorId,
        name: PlayerName,
        item_ids: &[i32],
        ts: TsUsec,
    ) -> Vec<DeferredHealthUpdate> {
        self.id_to_name.insert(actor_id, name.clone());
        let weapon_item = item_ids.first().and_then(|&id| u32::try_from(id).ok());
        let record = self
            .actor_records
            .entry(actor_id)
            .or_insert_with(|| ActorRecord {
                id: actor_id,
                name: None,
                weapon_item: None,
                first_seen: ts,
                last_seen: ts,
            });
        record.name = Some(name.clone());
        record.weapon_item = weapon_item.or(record.weapon_item);
        record.last_seen = ts;
        self.replay_if_resolvable(actor_id, &name)
    }

    /// `ItemEquipped`'s re-gear path: updates an already-known actor's main
    /// weapon without touching identity or replaying anything. A no-op if
    /// the actor has no `ActorRecord` yet (re-gear before any `PlayerJoined`
    /// is not meaningful).
    pub fn on_item_equipped(&mut self, actor_id: ActorId, item_ids: &[i32], ts: TsUsec) {
        let Some(record) = self.actor_records.get_mut(&actor_id) else {
            return;
        };
        record.weapon_item = item_ids.first().and_then(|&id| u32::try_from(id).ok());
        record.last_seen = ts;
    }

    /// The equipped main weapon item id for a currently-resolvable player
    /// name, used by `meter-snapshot`'s weapon-category lookup. `None` once
    /// the actor's id has been cleared by a zone change, even if the name
    /// is still a party member.
    pub fn weapon_item_for_name(&self, name: &str) -> Option<u32> {
        let actor_id = self
            .id_to_name
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)?;
        self.actor_records.get(&actor_id)?.weapon_item
    }

    fn replay_if_resolvable(&mut self, actor_id: ActorId, name: &str) -> Vec<DeferredHealthUpdate> {
        if !self.pending_ids.contains(&actor_id) || !self.is_party_member(name) {
            return Vec::new();
        }
        self.pending_ids.remove(&actor_id);
        let Some(queue) = self.deferred.remove(&actor_id) else {
            return Vec::new();
        };
        debug!(actor_id, replayed = queue.len(), "late-join backfill");
        queue.into_iter().collect()
    }

    /// `{0: actor_id, 1: name}`. Sets `self_id`/`self_name`, replacing any
    /// seeded values, and keeps the party set consistent (drops the old
    /// self name if it differed, adds the new one). Also replays any
    /// tuples already buffered under this `actor_id` (spec.md §8 scenario
    /// 1: a `HealthUpdate` for the local player can arrive before the
    /// `SelfIdentified` that reveals its id is self's own — without this,
    /// that tuple would sit in `pending_ids` forever, since `resolve`'s
    /// self-check only matches events observed *after* `self_id` is known).
    pub fn on_self_identified(&mut self, actor_id: ActorId, name: PlayerName) -> Vec<DeferredHealthUpdate> {
        if let Some(old) = &self.self_name {
            if *old != name {
                self.party.remove(old);
            }
        }
        self.party.insert(name.clone());
        self.self_id = Some(actor_id);
        self.self_name = Some(name.clone());
        self.replay_if_resolvable(actor_id, &name)
    }

    /// `seed_self(name?, id?)` (spec.md §6 control input). Unlike
    /// `Roster::seeded`, this can be called on an already-running roster —
    /// each field only overrides when `Some`, matching the control input's
    /// "act as initial values" intent applied mid-session rather than only
    /// at construction.
    pub fn reseed_self(&mut self, name: Option<PlayerName>, id: Option<ActorId>) {
        if let Some(name) = name {
            if let Some(old) = &self.self_name {
                if *old != name {
                    self.party.remove(old);
                }
            }
            self.party.insert(name.clone());
            self.self_name = Some(name);
        }
        if let Some(id) = id {
            self.self_id = Some(id);
        }
    }

    /// `{5: names[]}`. Replaces the party set wholesale (`self_name` is
    /// always re-added). Also replays any already-resolved pending ids whose
    /// name is newly part of the party.
    pub fn on_party_update(&mut self, names: Vec<PlayerName>) -> Vec<DeferredHealthUpdate> {
        self.party = names.into_iter().collect();
        if let Some(self_name) = &self.self_name {
            self.party.insert(self_name.clone());
        }
        self.replay_newly_eligible()
    }

    /// Empty `PartyUpdate` or an explicit disband: party becomes
    /// `{self_name}`; deferred tuples for ids no longer mapped to party
    /// members are dropped.
    pub fn on_party_disbanded(&mut self) {
        self.party.clear();
        if let Some(self_name) = &self.self_name {
            self.party.insert(self_name.clone());
        }
        let stale: Vec<ActorId> = self
            .pending_ids
            .iter()
            .filter(|id| {
                self.id_to_name
                    .get(id)
                    .is_some_and(|name| !self.is_party_member(name))
            })
            .copied()
            .collect();
        for id in stale {
            self.deferred.remove(&id);
        }
    }

    /// Identified by an explicit `JoinWorld` response or by a destination
    /// port change the capture layer observed. Clears `id_to_name` and
    /// `pending_ids`/deferred state but preserves `self_*` and `party`.
    pub fn on_zone_changed(&mut self) {
        self.id_to_name.clear();
        self.pending_ids.clear();
        self.deferred.clear();
        self.actor_records.clear();
    }

    fn replay_newly_eligible(&mut self) -> Vec<DeferredHealthUpdate> {
        let candidates: Vec<(ActorId, PlayerName)> = self
            .pending_ids
            .iter()
            .filter_map(|id| self.id_to_name.get(id).map(|name| (*id, name.clone())))
            .collect();
        let mut replayed = Vec::new();
        for (id, name) in candidates {
            replayed.extend(self.replay_if_resolvable(id, &name));
        }
        replayed
    }
}
