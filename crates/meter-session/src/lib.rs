//! Session manager (spec.md §4.6): opens, closes, and archives sessions
//! under one of three modes, and owns the bounded, newest-first history
//! ring of archived sessions.
//!
//! This crate knows nothing about transport, decoding, or roster
//! resolution — it receives only the already-gated facts the engine's
//! pipeline hands it ("this attributable event happened at `ts`", "self
//! entered combat", "the zone changed") and turns those into session
//! lifecycle transitions.

use std::collections::{BTreeMap, VecDeque};

use meter_aggregate::Stats;
use meter_proto::{Endpoint, PlayerName};
use tracing::{debug, info};

pub type TsUsec = i64;

/// Default battle-mode idle timeout (spec.md §4.6: "default 20").
pub const DEFAULT_BATTLE_TIMEOUT_SECS: u64 = 20;
/// Default history ring capacity (spec.md §3: "default 20").
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// The three session-boundary policies spec.md §4.6 names. Selectable at
/// runtime via `SessionManager::set_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Battle,
    Zone,
    Manual,
}

/// A time-bounded aggregation window over per-actor stats (spec.md §3).
/// `ended_at.is_none()` iff this is the live session; archived sessions
/// (reachable only through `HistoryRing`) are immutable by convention —
/// nothing in this crate mutates a `Session` once it has an `ended_at`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u64,
    pub mode: Mode,
    pub label: String,
    pub started_at: TsUsec,
    pub ended_at: Option<TsUsec>,
    pub per_actor: BTreeMap<PlayerName, Stats>,
    pub fame: u64,
    pub endpoint: Option<Endpoint>,
}

impl Session {
    fn new(id: u64, mode: Mode, label: String, started_at: TsUsec, endpoint: Option<Endpoint>) -> Self {
        Session {
            id,
            mode,
            label,
            started_at,
            ended_at: None,
            per_actor: BTreeMap::new(),
            fame: 0,
            endpoint,
        }
    }

    fn freeze(&mut self, ended_at: TsUsec) {
        self.ended_at = Some(ended_at);
        for stats in self.per_actor.values_mut() {
            stats.compact();
        }
    }
}

/// Up to `H` archived sessions, newest first; oldest evicted on overflow
/// (spec.md §3, §8 invariant 6).
#[derive(Debug)]
pub struct HistoryRing {
    capacity: usize,
    sessions: VecDeque<Session>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        HistoryRing {
            capacity: capacity.max(1),
            sessions: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, session: Session) {
        self.sessions.push_front(session);
        while self.sessions.len() > self.capacity {
            self.sessions.pop_back();
        }
    }

    /// Newest-first iteration, matching the snapshot's `history` ordering.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Owns the live session (if any), the history ring, and the per-mode
/// bookkeeping (label counters, battle idle timeout, zone endpoint
/// tracking) needed to implement spec.md §4.6's three modes.
pub struct SessionManager {
    mode: Mode,
    current: Option<Session>,
    history: HistoryRing,
    next_session_id: u64,
    battle_counter: u64,
    manual_counter: u64,
    battle_timeout_usec: i64,
    last_attributable_ts: Option<TsUsec>,
}

impl SessionManager {
    pub fn new(mode: Mode, history_capacity: usize, battle_timeout_secs: u64) -> Self {
        SessionManager {
            mode,
            current: None,
            history: HistoryRing::new(history_capacity),
            next_session_id: 1,
            battle_counter: 0,
            manual_counter: 0,
            battle_timeout_usec: i64::try_from(battle_timeout_secs.saturating_mul(1_000_000))
                .unwrap_or(i64::MAX),
            last_attributable_ts: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Mutable access to the live session, for the aggregator to fold
    /// deltas into and for pruning its rolling window ahead of a snapshot
    /// read. `None` when no session is currently open.
    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    // -- control inputs (spec.md §4.6, §6) ----------------------------------

    /// `set_mode(m)`. Archives the current session (if any) before the mode
    /// switches; the new mode opens its first session lazily, on the
    /// triggering condition described for it.
    pub fn set_mode(&mut self, mode: Mode, ts: TsUsec) {
        if mode == self.mode {
            return;
        }
        self.close_current(ts);
        info!(?mode, "session mode changed");
        self.mode = mode;
    }

    /// `manual_toggle()`. A no-op outside `Manual` mode, since only manual
    /// mode's boundaries are driven by this control input.
    pub fn manual_toggle(&mut self, ts: TsUsec) {
        if self.mode != Mode::Manual {
            return;
        }
        if self.current.is_some() {
            self.close_current(ts);
        } else {
            self.manual_counter += 1;
            let label = format!("Manual {}", self.manual_counter);
            self.open(Mode::Manual, label, ts, None);
        }
    }

    /// `archive_now()`. Force-closes the live session regardless of mode.
    pub fn archive_now(&mut self, ts: TsUsec) {
        self.close_current(ts);
    }

    /// `reset_fame()`. Clears the live session's fame counter without
    /// closing it.
    pub fn reset_fame(&mut self) {
        if let Some(session) = &mut self.current {
            session.fame = 0;
        }
    }

    pub fn fame_gained(&mut self, fame: u64) {
        if let Some(session) = &mut self.current {
            session.fame += fame;
        }
    }

    // -- pipeline-driven transitions -----------------------------------------

    /// Called for every attributable event (already past the roster gate).
    /// Ensures a session exists for it under the active mode and returns a
    /// mutable reference for the aggregator to fold the delta into, or
    /// `None` if the event has nowhere to land (Manual mode with no
    /// session open — manual sessions only open/close via `manual_toggle`).
    /// `endpoint` is the flow's server endpoint, relevant only in `Zone`
    /// mode.
    pub fn ensure_session_for_event(
        &mut self,
        ts: TsUsec,
        endpoint: Option<Endpoint>,
    ) -> Option<&mut Session> {
        self.last_attributable_ts = Some(ts);
        match self.mode {
            Mode::Battle => {
                if self.current.is_none() {
                    self.battle_counter += 1;
                    let label = format!("Battle {}", self.battle_counter);
                    self.open(Mode::Battle, label, ts, endpoint);
                }
            }
            Mode::Zone => {
                let needs_new = match &self.current {
                    Some(session) => session.endpoint != endpoint,
                    None => true,
                };
                if needs_new {
                    self.on_zone_changed(endpoint, "zone".to_owned(), ts);
                }
            }
            Mode::Manual => {}
        }
        self.current.as_mut()
    }

    /// `CombatStateChange(self, ...)` — only self transitions drive battle
    /// boundaries (spec.md §4.4).
    pub fn on_self_combat_state_change(&mut self, in_combat: bool, ts: TsUsec) {
        if self.mode != Mode::Battle {
            return;
        }
        if in_combat {
            if self.current.is_none() {
                self.battle_counter += 1;
                let label = format!("Battle {}", self.battle_counter);
                self.open(Mode::Battle, label, ts, None);
            }
            self.last_attributable_ts = Some(ts);
        } else {
            self.close_current(ts);
        }
    }

    /// At most one session per observed server endpoint in `Zone` mode: the
    /// old session (for the old endpoint) is archived and a new one opens
    /// for the new endpoint. A no-op outside `Zone` mode.
    pub fn on_zone_changed(&mut self, new_endpoint: Option<Endpoint>, zone_label: String, ts: TsUsec) {
        if self.mode != Mode::Zone {
            return;
        }
        self.close_current(ts);
        self.open(Mode::Zone, zone_label, ts, new_endpoint);
    }

    /// Battle-mode idle timeout: closes the live session if no attributable
    /// event has landed in `battle_timeout_secs` (spec.md §4.6). A no-op
    /// outside `Battle` mode.
    pub fn tick(&mut self, now: TsUsec) {
        if self.mode != Mode::Battle {
            return;
        }
        let Some(last) = self.last_attributable_ts else {
            return;
        };
        if self.current.is_some() && now - last > self.battle_timeout_usec {
            debug!(now, last, "battle session timed out");
            self.close_current(now);
        }
    }

    // -- internals ------------------------------------------------------------

    fn open(&mut self, mode: Mode, label: String, ts: TsUsec, endpoint: Option<Endpoint>) {
        self.close_current(ts);
        let id = self.next_session_id;
        self.next_session_id += 1;
        info!(id, label = %label, ?mode, "session opened");
        self.current = Some(Session::new(id, mode, label, ts, endpoint));
    }

    fn close_current(&mut self, ts: TsUsec) {
        if let Some(mut session) = self.current.take() {
            session.freeze(ts);
            info!(id = session.id, label = %session.label, "session archived");
            self.history.push(session);
        }
    }
}
