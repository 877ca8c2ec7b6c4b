//! Event semantics layer (spec.md §4.4): turns a classified `LogicalMessage`
//! into a `DomainEvent` via a data-driven `(MessageKind, code) -> builder`
//! registry, rather than a hardcoded match over every known code. Event
//! codes differ across client dialects, so the registry ships empty; the
//! engine populates it from configuration at startup.

use std::collections::HashMap;

use meter_proto::{ActorId, MessageKind, ParamMap, PlayerName, Value};

/// One recognized domain event, carrying only the fields spec.md §4.4 names
/// for it. `Unknown` preserves the raw params for offline analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    HealthUpdate {
        target_id: ActorId,
        actor_id: ActorId,
        value_delta: i64,
    },
    PlayerJoined {
        actor_id: ActorId,
        name: PlayerName,
        item_ids: Vec<i32>,
    },
    PartyUpdate {
        names: Vec<PlayerName>,
    },
    /// Distinct from an empty `PartyUpdate`: both clear the roster to
    /// `{self_name}` (meter-roster treats them identically), but dialects
    /// that send a dedicated disband message need a code of their own.
    PartyDisbanded,
    SelfIdentified {
        actor_id: ActorId,
        name: PlayerName,
    },
    /// Carries no payload: either an explicit `JoinWorld` response code or a
    /// destination-port change the capture layer detected (meter-engine
    /// synthesizes the latter; it never comes through the registry).
    ZoneChanged,
    CombatStateChange {
        actor_id: ActorId,
        in_combat: bool,
    },
    FameGained {
        fame: u64,
    },
    /// A mid-session re-gear: the actor's equipped-item array changed
    /// without a fresh `PlayerJoined`. Shares `PlayerJoined`'s item-array
    /// shape (`40: item_ids[]`, index 0 is the main weapon) since this is
    /// the same equipment data arriving outside the join path.
    ItemEquipped {
        actor_id: ActorId,
        item_ids: Vec<i32>,
    },
    /// An `(kind, code)` pair with no registered builder. No side effect on
    /// aggregation; kept for offline analysis.
    UnknownEvent {
        kind: MessageKind,
        code: u8,
        params: ParamMap,
    },
}

type EventBuilder = fn(&ParamMap) -> DomainEvent;

/// Maps `(MessageKind, code)` to the builder that knows how to interpret
/// that dialect's params for it.
#[derive(Default)]
pub struct Registry {
    builders: HashMap<(MessageKind, u8), EventBuilder>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, kind: MessageKind, code: u8, builder: EventBuilder) {
        self.builders.insert((kind, code), builder);
    }

    /// Looks up `(kind, code)`; falls back to `UnknownEvent` when nothing is
    /// registered for it.
    pub fn classify(&self, kind: MessageKind, code: u8, params: &ParamMap) -> DomainEvent {
        match self.builders.get(&(kind, code)) {
            Some(builder) => builder(params),
            None => DomainEvent::UnknownEvent {
                kind,
                code,
                params: params.clone(),
            },
        }
    }
}

/// `{0: target_id, 2: value_delta, 6: actor_id}`. A negative `value_delta`
/// is damage, positive is heal. Absent `actor_id` falls back to
/// `target_id` (self-heal), per spec.md §4.4/§9.
pub fn build_health_update(params: &ParamMap) -> DomainEvent {
    let target_id = params.get(&0).and_then(Value::as_u32).unwrap_or_default();
    let value_delta = params.get(&2).and_then(Value::as_i64).unwrap_or(0);
    let actor_id = params
        .get(&6)
        .and_then(Value::as_u32)
        .unwrap_or(target_id);
    DomainEvent::HealthUpdate {
        target_id,
        actor_id,
        value_delta,
    }
}

/// `{0: actor_id, 1: name, 40: item_ids[]}`; item 0 of the array is the main
/// weapon (interpreted downstream by `meter-snapshot`'s weapon-category
/// lookup, not here).
pub fn build_player_joined(params: &ParamMap) -> DomainEvent {
    let actor_id = params.get(&0).and_then(Value::as_u32).unwrap_or_default();
    let name = params
        .get(&1)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let item_ids = params.get(&40).and_then(Value::as_i32_list).unwrap_or_default();
    DomainEvent::PlayerJoined {
        actor_id,
        name,
        item_ids,
    }
}

/// `{5: names[]}`; replaces the party set wholesale.
pub fn build_party_update(params: &ParamMap) -> DomainEvent {
    let names = params
        .get(&5)
        .and_then(Value::as_string_list)
        .map(|names| names.into_iter().map(str::to_owned).collect())
        .unwrap_or_default();
    DomainEvent::PartyUpdate { names }
}

pub fn build_party_disbanded(_params: &ParamMap) -> DomainEvent {
    DomainEvent::PartyDisbanded
}

/// `{0: actor_id, 1: name}`.
pub fn build_self_identified(params: &ParamMap) -> DomainEvent {
    let actor_id = params.get(&0).and_then(Value::as_u32).unwrap_or_default();
    let name = params
        .get(&1)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    DomainEvent::SelfIdentified { actor_id, name }
}

pub fn build_zone_changed(_params: &ParamMap) -> DomainEvent {
    DomainEvent::ZoneChanged
}

/// `{0: actor_id, 1: in_combat: bool}`.
pub fn build_combat_state_change(params: &ParamMap) -> DomainEvent {
    let actor_id = params.get(&0).and_then(Value::as_u32).unwrap_or_default();
    let in_combat = params.get(&1).and_then(Value::as_bool).unwrap_or(false);
    DomainEvent::CombatStateChange { actor_id, in_combat }
}

/// `{1: fame_u64}`.
pub fn build_fame_gained(params: &ParamMap) -> DomainEvent {
    let fame = params.get(&1).and_then(Value::as_u64).unwrap_or(0);
    DomainEvent::FameGained { fame }
}

/// `{0: actor_id, 40: item_ids[]}`.
pub fn build_item_equipped(params: &ParamMap) -> DomainEvent {
    let actor_id = params.get(&0).and_then(Value::as_u32).unwrap_or_default();
    let item_ids = params.get(&40).and_then(Value::as_i32_list).unwrap_or_default();
    DomainEvent::ItemEquipped { actor_id, item_ids }
}
