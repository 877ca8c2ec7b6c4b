//! Single-threaded pipeline (spec.md §2, §5): wires stages 2-9 together.
//! Owns all mutable pipeline state; nothing in this module is `Send`-shared
//! without going through `Engine`'s snapshot pointer.

use std::collections::HashMap;

use meter_capture::RawPacket;
use meter_classify::classify_verbose;
use meter_proto::{Endpoint, FlowKey, MessageKind, PlayerName};
use meter_roster::{Resolution, Roster};
use meter_semantics::{
    build_combat_state_change, build_fame_gained, build_health_update, build_item_equipped,
    build_party_update, build_player_joined, build_self_identified, build_zone_changed,
    DomainEvent, Registry,
};
use meter_session::{Mode, SessionManager};
use meter_snapshot::ItemCategoryTable;
use meter_transport::{Reassembler, TransportEvent, TransportWarning};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::sink::UnknownPayloadSink;

pub type TsUsec = i64;

/// Well-known server ports the heuristic zone-change detector looks for in
/// either direction of a packet (spec.md §6: endpoint-port-change zone
/// detection, used when no explicit `JoinWorld`/`ZoneChanged` event is
/// registered for the dialect in use).
const WELL_KNOWN_SERVER_PORTS: [u16; 3] = [5055, 5056, 5058];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("loading item category table: {0}")]
    ItemTable(#[from] meter_snapshot::ItemTableError),
}

/// Picks whichever of `src`/`dst` looks like the server side of the
/// connection (a well-known port), falling back to `dst` when neither
/// matches (spec.md §6's "falling back to dst").
fn classify_server_endpoint(src: Endpoint, dst: Endpoint) -> Endpoint {
    if WELL_KNOWN_SERVER_PORTS.contains(&src.port) {
        src
    } else {
        dst
    }
}

/// Builds the default `(MessageKind, code) -> builder` table. Event codes
/// are dialect-specific (spec.md §9, §4.4): these are placeholder defaults,
/// not a transcription of any one client's real wire codes. Embedders that
/// know their dialect's actual codes should override via
/// `Pipeline::registry_mut`.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(MessageKind::Event, 10, build_health_update);
    registry.register(MessageKind::Event, 11, build_player_joined);
    registry.register(MessageKind::Event, 12, build_party_update);
    registry.register(MessageKind::Event, 13, build_self_identified);
    registry.register(MessageKind::Event, 14, build_zone_changed);
    registry.register(MessageKind::Event, 15, build_combat_state_change);
    registry.register(MessageKind::Event, 16, build_fame_gained);
    registry.register(MessageKind::Event, 17, build_item_equipped);
    registry
}

pub struct Pipeline {
    reassembler: Reassembler,
    registry: Registry,
    roster: Roster,
    sessions: SessionManager,
    item_table: ItemCategoryTable,
    sink: Option<UnknownPayloadSink>,
    metrics: PipelineMetrics,
    window_usec: i64,
    current_server_endpoint: Option<Endpoint>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let item_table = match &config.item_category_table_path {
            Some(path) => ItemCategoryTable::load(path)?,
            None => ItemCategoryTable::empty(),
        };
        let sink = config
            .unknown_payload_dir
            .clone()
            .map(UnknownPayloadSink::new);
        let window_usec = i64::try_from(config.rolling_window_secs.saturating_mul(1_000_000))
            .unwrap_or(i64::MAX);

        Ok(Pipeline {
            reassembler: Reassembler::default(),
            registry: default_registry(),
            roster: Roster::seeded(config.self_name.clone(), config.self_id),
            sessions: SessionManager::new(
                config.session_mode,
                config.history_capacity,
                config.battle_timeout_secs,
            ),
            item_table,
            sink,
            metrics: PipelineMetrics::default(),
            window_usec,
            current_server_endpoint: None,
        })
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics
    }

    // -- control inputs (spec.md §6) ----------------------------------------

    pub fn set_mode(&mut self, mode: Mode, ts: TsUsec) {
        self.sessions.set_mode(mode, ts);
    }

    pub fn manual_toggle(&mut self, ts: TsUsec) {
        self.sessions.manual_toggle(ts);
    }

    pub fn archive_now(&mut self, ts: TsUsec) {
        self.sessions.archive_now(ts);
    }

    pub fn reset_fame(&mut self) {
        self.sessions.reset_fame();
    }

    pub fn seed_self(&mut self, name: Option<PlayerName>, id: Option<meter_proto::ActorId>) {
        self.roster.reseed_self(name, id);
    }

    // -- ingestion ------------------------------------------------------------

    /// Feeds one raw packet through transport reassembly, classification,
    /// decoding, and event semantics. Never panics on malformed input;
    /// every failure degrades into a `PipelineMetrics` counter.
    pub fn ingest_packet(&mut self, packet: RawPacket) {
        self.detect_zone_change(packet.src, packet.dst, packet.ts_usec);

        let flow = FlowKey::new(packet.src, packet.dst);
        let events = self
            .reassembler
            .ingest_datagram(flow, packet.ts_usec, &packet.payload);

        for event in events {
            match event {
                TransportEvent::Message(msg) => self.handle_message(msg, packet.ts_usec),
                TransportEvent::Warning(warning) => self.handle_transport_warning(warning),
            }
        }
    }

    fn detect_zone_change(&mut self, src: Endpoint, dst: Endpoint, ts: TsUsec) {
        let server_endpoint = classify_server_endpoint(src, dst);
        match self.current_server_endpoint {
            Some(current) if current != server_endpoint => {
                debug!(%current, new = %server_endpoint, "server endpoint changed, treating as zone change");
                self.roster.on_zone_changed();
                self.sessions
                    .on_zone_changed(Some(server_endpoint), "zone".to_owned(), ts);
                self.current_server_endpoint = Some(server_endpoint);
            }
            Some(_) => {}
            None => self.current_server_endpoint = Some(server_endpoint),
        }
    }

    fn handle_transport_warning(&mut self, warning: TransportWarning) {
        match warning {
            TransportWarning::UnknownCommandType(_) | TransportWarning::MalformedCommand => {
                self.metrics.malformed_total += 1;
            }
            TransportWarning::ReassemblyFailed { .. }
            | TransportWarning::ReassemblyOverflowEvicted { .. } => {
                self.metrics.reassembly_failed_total += 1;
            }
        }
    }

    fn handle_message(&mut self, msg: meter_transport::ReassembledMessage, ts: TsUsec) {
        let body = msg.body.clone();
        match classify_verbose(&msg) {
            Ok((logical, decode_error)) => {
                if decode_error.is_some() {
                    self.metrics.unknown_tag_total += 1;
                    if let Some(sink) = &mut self.sink {
                        sink.write(logical.kind, logical.code, ts, &body);
                    }
                }
                let event = self.registry.classify(logical.kind, logical.code, &logical.params);
                if let DomainEvent::UnknownEvent { kind, code, .. } = &event {
                    self.metrics.unknown_event_total += 1;
                    if let Some(sink) = &mut self.sink {
                        sink.write(*kind, *code, ts, &body);
                    }
                }
                self.handle_event(event, ts);
            }
            Err(_) => {
                self.metrics.malformed_total += 1;
            }
        }
    }

    fn handle_event(&mut self, event: DomainEvent, ts: TsUsec) {
        match event {
            DomainEvent::HealthUpdate {
                target_id,
                actor_id,
                value_delta,
            } => {
                if let Resolution::Accepted { name } =
                    self.roster.resolve(ts, target_id, actor_id, value_delta)
                {
                    self.apply_attributable(name, ts, value_delta);
                }
                self.metrics.deferred_queue_evictions = self.roster.deferred_evictions();
            }
            DomainEvent::PlayerJoined {
                actor_id,
                name,
                item_ids,
            } => {
                let replayed = self.roster.on_player_joined(actor_id, name, &item_ids, ts);
                self.replay_backfill(replayed);
            }
            DomainEvent::PartyUpdate { names } => {
                let replayed = self.roster.on_party_update(names);
                self.replay_backfill(replayed);
            }
            DomainEvent::PartyDisbanded => self.roster.on_party_disbanded(),
            DomainEvent::SelfIdentified { actor_id, name } => {
                let replayed = self.roster.on_self_identified(actor_id, name);
                self.replay_backfill(replayed);
            }
            DomainEvent::ZoneChanged => {
                self.roster.on_zone_changed();
                self.sessions
                    .on_zone_changed(self.current_server_endpoint, "zone".to_owned(), ts);
            }
            DomainEvent::CombatStateChange { actor_id, in_combat } => {
                if Some(actor_id) == self.roster.self_id() {
                    self.sessions.on_self_combat_state_change(in_combat, ts);
                }
            }
            DomainEvent::FameGained { fame } => self.sessions.fame_gained(fame),
            DomainEvent::ItemEquipped { actor_id, item_ids } => {
                self.roster.on_item_equipped(actor_id, &item_ids, ts);
            }
            DomainEvent::UnknownEvent { .. } => {}
        }
    }

    /// Re-resolves each backfilled tuple: the roster has already moved the
    /// triggering actor out of `pending_ids` and into `id_to_name`, so this
    /// second `resolve` call always returns `Accepted` for tuples the
    /// roster just handed back.
    fn replay_backfill(&mut self, replayed: Vec<meter_roster::DeferredHealthUpdate>) {
        for tuple in replayed {
            if let Resolution::Accepted { name } = self.roster.resolve(
                tuple.ts,
                tuple.target_id,
                tuple.actor_id,
                tuple.value_delta,
            ) {
                self.apply_attributable(name, tuple.ts, tuple.value_delta);
            }
        }
    }

    fn apply_attributable(&mut self, name: PlayerName, ts: TsUsec, value_delta: i64) {
        let (delta_dmg, delta_heal) = if value_delta < 0 {
            (value_delta.unsigned_abs(), 0)
        } else {
            (0, value_delta as u64)
        };
        if let Some(session) = self
            .sessions
            .ensure_session_for_event(ts, self.current_server_endpoint)
        {
            meter_aggregate::apply(&mut session.per_actor, name, ts, delta_dmg, delta_heal);
        }
    }

    /// Battle-mode idle timeout check; a no-op in the other two modes.
    pub fn tick(&mut self, now: TsUsec) {
        self.sessions.tick(now);
    }

    /// Projects the current immutable view. Prunes the live session's
    /// rolling window first, per `meter-snapshot`'s "caller prunes before
    /// reading" contract.
    pub fn snapshot(&mut self, now: TsUsec) -> meter_snapshot::Snapshot {
        if let Some(session) = self.sessions.current_mut() {
            meter_aggregate::prune_all(&mut session.per_actor, now, self.window_usec);
        }

        let weapon_items: HashMap<PlayerName, u32> = self
            .roster
            .party()
            .filter_map(|name| {
                self.roster
                    .weapon_item_for_name(name)
                    .map(|item| (name.to_owned(), item))
            })
            .collect();

        let zone_label = self
            .sessions
            .current()
            .map(|session| session.label.as_str())
            .unwrap_or("");

        meter_snapshot::project(
            self.sessions.mode(),
            zone_label,
            self.sessions.current(),
            self.sessions.history(),
            now,
            self.window_usec as f64 / 1_000_000.0,
            meter_aggregate::RankKey::Damage,
            &weapon_items,
            &self.item_table,
        )
    }

    pub fn record_capture_drop(&mut self, dropped: u64) {
        self.metrics.capture_drop_total = dropped;
    }
}
