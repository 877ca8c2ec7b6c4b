//! Per-actor running totals and rolling DPS/HPS windows (spec.md §4.7).
//!
//! This crate has no notion of a session boundary — that's `meter-session`'s
//! job. It only knows how to fold one attributable delta into a `Stats`
//! value and how to read a rolling rate back out of it.

use std::collections::VecDeque;

use meter_proto::PlayerName;

/// Monotonic capture timestamp in microseconds, consistent with
/// `meter-transport`/`meter-roster`.
pub type TsUsec = i64;

/// Default sliding window (spec.md §3: "default 10") used for rolling
/// DPS/HPS, in whole seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 10;

/// One actor's running totals plus the tick history behind its rolling
/// rate. `damage`/`heal` are monotonic non-decreasing for the life of the
/// session (spec.md §8 invariant 2); `ticks` is bounded by the sliding
/// window and is not itself part of that monotonicity guarantee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub damage: u64,
    pub heal: u64,
    ticks: VecDeque<(TsUsec, u64, u64)>,
}

impl Stats {
    /// Folds one attributable delta in. Exactly one of `delta_dmg`/
    /// `delta_heal` is normally non-zero (a `HealthUpdate` is either damage
    /// or heal), but both are accepted per spec.md §3's tick shape.
    pub fn record(&mut self, ts: TsUsec, delta_dmg: u64, delta_heal: u64) {
        self.damage += delta_dmg;
        self.heal += delta_heal;
        self.ticks.push_back((ts, delta_dmg, delta_heal));
    }

    /// Drops ticks older than `now - window`. Called before every rolling
    /// rate read, per spec.md §4.7: "Before each read (snapshot), prune
    /// ticks older than now - W."
    pub fn prune(&mut self, now: TsUsec, window_usec: i64) {
        let cutoff = now - window_usec;
        while matches!(self.ticks.front(), Some((ts, _, _)) if *ts < cutoff) {
            self.ticks.pop_front();
        }
    }

    /// Sum of in-window `Δdmg` divided by the window length in seconds.
    /// Caller is expected to have pruned first; an un-pruned call simply
    /// sums whatever ticks remain, which is always `>= 0`.
    pub fn dps(&self, window_secs: f64) -> f64 {
        if window_secs <= 0.0 {
            return 0.0;
        }
        let sum: u64 = self.ticks.iter().map(|(_, dmg, _)| dmg).sum();
        sum as f64 / window_secs
    }

    pub fn hps(&self, window_secs: f64) -> f64 {
        if window_secs <= 0.0 {
            return 0.0;
        }
        let sum: u64 = self.ticks.iter().map(|(_, _, heal)| heal).sum();
        sum as f64 / window_secs
    }

    /// Freezes this actor's stats for archival: totals are kept, the tick
    /// history is dropped. Per spec.md §4.6: "its `Stats.ticks` compacted
    /// to totals only" on session close.
    pub fn compact(&mut self) {
        self.ticks.clear();
    }

    #[cfg(test)]
    fn tick_count(&self) -> usize {
        self.ticks.len()
    }
}

/// Folds one `(ts, Δdmg, Δheal)` event into `per_actor[name]`, creating the
/// entry if this is the actor's first attributable event this session.
pub fn apply(
    per_actor: &mut std::collections::BTreeMap<PlayerName, Stats>,
    name: PlayerName,
    ts: TsUsec,
    delta_dmg: u64,
    delta_heal: u64,
) {
    per_actor.entry(name).or_default().record(ts, delta_dmg, delta_heal);
}

/// Prunes every actor's tick history ahead of a snapshot read.
pub fn prune_all(
    per_actor: &mut std::collections::BTreeMap<PlayerName, Stats>,
    now: TsUsec,
    window_usec: i64,
) {
    for stats in per_actor.values_mut() {
        stats.prune(now, window_usec);
    }
}

/// The ranking key a caller can sort actors by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKey {
    Damage,
    Heal,
}

/// Sorts `(name, stats)` pairs descending by `key`; ties break by total
/// damage, then by name ascending (spec.md §4.7).
pub fn rank<'a>(
    per_actor: &'a std::collections::BTreeMap<PlayerName, Stats>,
    key: RankKey,
) -> Vec<(&'a PlayerName, &'a Stats)> {
    let mut actors: Vec<(&PlayerName, &Stats)> = per_actor.iter().collect();
    actors.sort_by(|(name_a, a), (name_b, b)| {
        let key_a = match key {
            RankKey::Damage => a.damage,
            RankKey::Heal => a.heal,
        };
        let key_b = match key {
            RankKey::Damage => b.damage,
            RankKey::Heal => b.heal,
        };
        key_b
            .cmp(&key_a)
            .then_with(|| b.damage.cmp(&a.damage))
            .then_with(|| name_a.cmp(name_b))
    });
    actors
}
