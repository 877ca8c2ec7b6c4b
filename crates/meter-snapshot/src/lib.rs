//! Snapshot projector (spec.md §4.8): builds the immutable, read-only view
//! consumed by the UI and by JSON export, plus the `weapon_item ->
//! weapon_category` lookup table reader (spec.md §6).
//!
//! `project` never mutates session state. Callers are responsible for
//! pruning each actor's rolling window (`meter_aggregate::prune_all`)
//! *before* calling this, per spec.md §4.7's "before each read, prune"
//! rule — doing the pruning here would make this crate a mutator, which
//! spec.md §4.8 explicitly rules out ("never mutates session state").

use std::collections::HashMap;
use std::path::Path;

use meter_aggregate::{RankKey, Stats, rank};
use meter_proto::PlayerName;
use meter_session::{HistoryRing, Mode, Session};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TsUsec = i64;

/// `item_id -> human category name` (e.g. `"sword"`, `"bow"`), read from a
/// TOML file at startup (spec.md §6: "paths to optional item-category
/// lookup tables"). Never written to; reload is a full replace via
/// `ItemCategoryTable::load`.
#[derive(Debug, Clone, Default)]
pub struct ItemCategoryTable {
    categories: HashMap<u32, String>,
}

#[derive(Debug, Error)]
pub enum ItemTableError {
    #[error("reading item category table '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing item category table '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("item category table entry {0:?} is not a valid item id")]
    InvalidKey(String),
}

#[derive(Debug, Deserialize)]
struct RawItemCategoryTable {
    #[serde(flatten)]
    entries: HashMap<String, String>,
}

impl ItemCategoryTable {
    pub fn empty() -> Self {
        ItemCategoryTable::default()
    }

    /// Loads a flat `item_id = "category"` TOML table, e.g.:
    /// ```toml
    /// 501 = "sword"
    /// 502 = "bow"
    /// ```
    pub fn load(path: &Path) -> Result<Self, ItemTableError> {
        let text = std::fs::read_to_string(path).map_err(|source| ItemTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawItemCategoryTable =
            toml::from_str(&text).map_err(|source| ItemTableError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let mut categories = HashMap::with_capacity(raw.entries.len());
        for (key, category) in raw.entries {
            let item_id: u32 = key
                .parse()
                .map_err(|_| ItemTableError::InvalidKey(key.clone()))?;
            categories.insert(item_id, category);
        }
        Ok(ItemCategoryTable { categories })
    }

    pub fn category_for(&self, item_id: u32) -> Option<&str> {
        self.categories.get(&item_id).map(String::as_str)
    }
}

/// One actor row in a snapshot, current or archived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSnapshot {
    pub name: String,
    pub damage: u64,
    pub heal: u64,
    pub dps: f64,
    pub hps: f64,
    pub weapon: Option<String>,
    /// `key / max(all_actors.key)` for the ranking key in use, clamped to
    /// `[0, 1]` (spec.md §4.8). Additive beyond the literal §6 JSON schema,
    /// but explicitly named by §4.8's in-memory view; kept in both.
    pub bar_ratio: f64,
}

/// One archived session's summary, as carried in `Snapshot::history`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub label: String,
    pub started_at: TsUsec,
    pub ended_at: TsUsec,
    pub actors: Vec<ActorSnapshot>,
    pub fame: u64,
}

/// The full immutable view: spec.md §6's JSON export schema, plus
/// `bar_ratio` per actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub mode: String,
    pub zone: String,
    pub elapsed_s: f64,
    pub fame: u64,
    pub fame_per_hour: f64,
    pub actors: Vec<ActorSnapshot>,
    pub history: Vec<HistorySnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Battle => "battle",
        Mode::Zone => "zone",
        Mode::Manual => "manual",
    }
}

fn build_actor_rows(
    per_actor: &std::collections::BTreeMap<PlayerName, Stats>,
    rank_key: RankKey,
    window_secs: f64,
    weapon_items: &HashMap<PlayerName, u32>,
    item_table: &ItemCategoryTable,
) -> Vec<ActorSnapshot> {
    let ranked = rank(per_actor, rank_key);
    let max_key = ranked
        .iter()
        .map(|(_, stats)| match rank_key {
            RankKey::Damage => stats.damage,
            RankKey::Heal => stats.heal,
        })
        .max()
        .unwrap_or(0);

    ranked
        .into_iter()
        .map(|(name, stats)| {
            let key_value = match rank_key {
                RankKey::Damage => stats.damage,
                RankKey::Heal => stats.heal,
            };
            let bar_ratio = if max_key == 0 {
                0.0
            } else {
                (key_value as f64 / max_key as f64).clamp(0.0, 1.0)
            };
            let weapon = weapon_items
                .get(name)
                .and_then(|&item_id| item_table.category_for(item_id))
                .map(str::to_owned);
            ActorSnapshot {
                name: name.clone(),
                damage: stats.damage,
                heal: stats.heal,
                dps: stats.dps(window_secs),
                hps: stats.hps(window_secs),
                weapon,
                bar_ratio,
            }
        })
        .collect()
}

/// Builds the immutable snapshot. `current`'s tick histories must already
/// be pruned to `now`'s window by the caller. `weapon_items` maps a
/// currently-resolvable player name to its equipped main weapon id
/// (`meter-roster::Roster::weapon_item_for_name`, collected by the
/// caller since this crate has no roster dependency).
pub fn project(
    mode: Mode,
    zone_label: &str,
    current: Option<&Session>,
    history: &HistoryRing,
    now: TsUsec,
    window_secs: f64,
    rank_key: RankKey,
    weapon_items: &HashMap<PlayerName, u32>,
    item_table: &ItemCategoryTable,
) -> Snapshot {
    let (elapsed_s, fame, actors) = match current {
        Some(session) => {
            let elapsed_s = (now - session.started_at).max(0) as f64 / 1_000_000.0;
            let actors = build_actor_rows(
                &session.per_actor,
                rank_key,
                window_secs,
                weapon_items,
                item_table,
            );
            (elapsed_s, session.fame, actors)
        }
        None => (0.0, 0, Vec::new()),
    };

    let fame_per_hour = if elapsed_s > 0.0 {
        fame as f64 / (elapsed_s / 3600.0)
    } else {
        0.0
    };

    let history = history
        .iter()
        .map(|session| HistorySnapshot {
            label: session.label.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at.unwrap_or(session.started_at),
            actors: build_actor_rows(
                &session.per_actor,
                rank_key,
                window_secs,
                weapon_items,
                item_table,
            ),
            fame: session.fame,
        })
        .collect();

    Snapshot {
        mode: mode_label(mode).to_owned(),
        zone: zone_label.to_owned(),
        elapsed_s,
        fame,
        fame_per_hour,
        actors,
        history,
    }
}
