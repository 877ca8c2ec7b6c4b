//! Zone transitions and late-join backfill (spec.md §8 scenarios 5 & 6):
//! a zone change drops known actor ids but keeps self/party identity, and a
//! `HealthUpdate` that outruns the `PlayerJoined` naming its actor is
//! replayed once that name resolves, with its original timestamp intact.

use meter_capture::RawPacket;
use meter_proto::{Endpoint, ParamMap};
use meter_test_support::datagram::{datagram, reliable_command};
use meter_test_support::event::{event_body, health_update_params, party_update_params, player_joined_params};
use rusty_meter::{Config, Pipeline};
use std::net::Ipv4Addr;

const HEALTH_UPDATE: u8 = 10;
const PLAYER_JOINED: u8 = 11;
const PARTY_UPDATE: u8 = 12;
const ZONE_CHANGED: u8 = 14;

fn client() -> Endpoint {
    Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 40000)
}

fn server() -> Endpoint {
    Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 5055)
}

fn packet(ts_usec: i64, seq: u16, body: Vec<u8>) -> RawPacket {
    let command = reliable_command(true, 0, seq, &body);
    RawPacket {
        ts_usec,
        src: server(),
        dst: client(),
        payload: datagram(&[command]),
    }
}

fn config() -> Config {
    Config {
        self_name: Some("Alice".to_owned()),
        self_id: Some(1),
        ..Config::default()
    }
}

#[test]
fn late_join_backfill_replays_with_original_timestamp() {
    let mut pipeline = Pipeline::new(&config()).unwrap();

    pipeline.ingest_packet(packet(0, 1, event_body(PARTY_UPDATE, &party_update_params(&["Bob"]))));

    // Bob's id isn't known yet (no PlayerJoined has named actor 2): this
    // HealthUpdate buffers under pending id 2, stamped with ts=0.
    let bob_damage = event_body(HEALTH_UPDATE, &health_update_params(2, -50, Some(2)));
    pipeline.ingest_packet(packet(0, 2, bob_damage));

    let snapshot = pipeline.snapshot(0);
    assert!(snapshot.actors.is_empty(), "Bob's damage is buffered until his id resolves");

    // PlayerJoined at ts=1 resolves actor 2 to "Bob" and replays the
    // buffered tuple — still attributed to its original ts=0, not the
    // PlayerJoined's ts=1, so a narrow rolling window anchored at ts=0
    // still counts it.
    pipeline.ingest_packet(packet(1, 3, event_body(PLAYER_JOINED, &player_joined_params(2, "Bob", &[]))));

    let snapshot = pipeline.snapshot(0);
    let bob = snapshot.actors.iter().find(|a| a.name == "Bob").expect("Bob resolved");
    assert_eq!(bob.damage, 50);
}

#[test]
fn zone_change_clears_ids_but_keeps_self_and_party() {
    let mut pipeline = Pipeline::new(&config()).unwrap();

    pipeline.ingest_packet(packet(0, 1, event_body(PARTY_UPDATE, &party_update_params(&["Bob"]))));
    pipeline.ingest_packet(packet(1, 2, event_body(PLAYER_JOINED, &player_joined_params(2, "Bob", &[]))));

    let bob_damage = event_body(HEALTH_UPDATE, &health_update_params(2, -75, Some(2)));
    pipeline.ingest_packet(packet(2, 3, bob_damage));
    let snapshot = pipeline.snapshot(2);
    assert_eq!(snapshot.actors.iter().find(|a| a.name == "Bob").unwrap().damage, 75);

    pipeline.ingest_packet(packet(3, 4, event_body(ZONE_CHANGED, &ParamMap::new())));

    // Bob's id (2) is no longer known: the same event now buffers again
    // instead of resolving, because zone change clears `id_to_name`.
    let bob_damage_again = event_body(HEALTH_UPDATE, &health_update_params(2, -10, Some(2)));
    pipeline.ingest_packet(packet(4, 5, bob_damage_again));
    let snapshot = pipeline.snapshot(4);
    assert_eq!(
        snapshot.actors.iter().find(|a| a.name == "Bob").map(|a| a.damage),
        None,
        "Bob's id was forgotten on zone change, so this event re-buffers"
    );

    // Self still resolves immediately: self identity survives zone changes.
    let self_damage = event_body(HEALTH_UPDATE, &health_update_params(1, -20, Some(1)));
    pipeline.ingest_packet(packet(5, 6, self_damage));
    let snapshot = pipeline.snapshot(5);
    let alice = snapshot.actors.iter().find(|a| a.name == "Alice").unwrap();
    assert_eq!(alice.damage, 20);
}
