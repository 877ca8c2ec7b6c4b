//! Roster gating end to end: a self-attributed `HealthUpdate` that arrives
//! before the `SelfIdentified` revealing whose id that is still lands once
//! identity resolves, and a non-party actor's damage never shows up at all.

use meter_capture::RawPacket;
use meter_proto::{Endpoint, PlayerName};
use meter_test_support::datagram::{datagram, reliable_command};
use meter_test_support::event::{event_body, health_update_params, self_identified_params};
use rusty_meter::{Config, Pipeline};
use std::net::Ipv4Addr;

const HEALTH_UPDATE: u8 = 10;
const SELF_IDENTIFIED: u8 = 13;

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

#[test]
fn self_damage_resolves_after_late_self_identify() {
    let mut pipeline = Pipeline::new(&Config::default()).unwrap();

    let health_update = event_body(HEALTH_UPDATE, &health_update_params(7, -100, Some(7)));
    pipeline.ingest_packet(packet(0, 1, health_update));

    let snapshot = pipeline.snapshot(0);
    assert!(
        snapshot.actors.is_empty(),
        "health update for an unresolved actor id must not appear before identity resolves"
    );

    let self_identified = event_body(SELF_IDENTIFIED, &self_identified_params(7, "Alice"));
    pipeline.ingest_packet(packet(1, 2, self_identified));

    let snapshot = pipeline.snapshot(1);
    assert_eq!(snapshot.actors.len(), 1);
    assert_eq!(snapshot.actors[0].name, "Alice");
    assert_eq!(snapshot.actors[0].damage, 100);
    assert_eq!(snapshot.actors[0].heal, 0);
}

#[test]
fn non_party_actor_is_filtered_out_entirely() {
    let mut pipeline = Pipeline::new(&Config::default()).unwrap();

    let self_identified = event_body(SELF_IDENTIFIED, &self_identified_params(1, "Alice"));
    pipeline.ingest_packet(packet(0, 1, self_identified));

    // Carol (actor 9) is never part of the party: her PlayerJoined never
    // arrives and no PartyUpdate ever names her, so her HealthUpdate stays
    // buffered under a pending id forever.
    let carol_damage = event_body(HEALTH_UPDATE, &health_update_params(9, -250, Some(9)));
    pipeline.ingest_packet(packet(1, 2, carol_damage));

    let alice_damage = event_body(HEALTH_UPDATE, &health_update_params(1, -100, Some(1)));
    pipeline.ingest_packet(packet(2, 3, alice_damage));

    let snapshot = pipeline.snapshot(2);
    let names: Vec<&PlayerName> = snapshot.actors.iter().map(|a| &a.name).collect();
    assert_eq!(names, vec![&"Alice".to_owned()]);
    assert_eq!(snapshot.actors[0].damage, 100);
}
