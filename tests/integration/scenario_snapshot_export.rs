//! Snapshot projection and JSON export end to end (spec.md §4.8, §6): the
//! exported schema carries every field §6 names, `bar_ratio` ranks actors
//! relative to the top damage dealer, and an equipped weapon resolves
//! through the configured item-category table.

use meter_capture::RawPacket;
use meter_proto::Endpoint;
use meter_test_support::datagram::{datagram, reliable_command};
use meter_test_support::event::{
    event_body, health_update_params, party_update_params, player_joined_params,
};
use rusty_meter::Config;
use std::io::Write;
use std::net::Ipv4Addr;

const HEALTH_UPDATE: u8 = 10;
const PLAYER_JOINED: u8 = 11;
const PARTY_UPDATE: u8 = 12;

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
fn exported_json_carries_the_documented_schema_and_bar_ratios() {
    let mut pipeline = rusty_meter::Pipeline::new(&Config {
        self_name: Some("Alice".to_owned()),
        self_id: Some(1),
        ..Config::default()
    })
    .unwrap();

    pipeline.ingest_packet(packet(
        0,
        1,
        event_body(PARTY_UPDATE, &party_update_params(&["Bob"])),
    ));
    pipeline.ingest_packet(packet(
        1,
        2,
        event_body(PLAYER_JOINED, &player_joined_params(2, "Bob", &[])),
    ));

    // Alice: 100 damage, Bob: 50 damage.
    pipeline.ingest_packet(packet(
        2,
        3,
        event_body(HEALTH_UPDATE, &health_update_params(1, -100, Some(1))),
    ));
    pipeline.ingest_packet(packet(
        3,
        4,
        event_body(HEALTH_UPDATE, &health_update_params(2, -50, Some(2))),
    ));

    let snapshot = pipeline.snapshot(3);
    let json = snapshot.to_json().unwrap();

    for field in [
        "\"mode\"",
        "\"zone\"",
        "\"elapsed_s\"",
        "\"fame\"",
        "\"fame_per_hour\"",
        "\"actors\"",
        "\"history\"",
        "\"dps\"",
        "\"hps\"",
        "\"weapon\"",
    ] {
        assert!(json.contains(field), "exported JSON missing {field}: {json}");
    }

    let alice = snapshot.actors.iter().find(|a| a.name == "Alice").unwrap();
    let bob = snapshot.actors.iter().find(|a| a.name == "Bob").unwrap();
    assert_eq!(alice.damage, 100);
    assert_eq!(bob.damage, 50);
    assert_eq!(alice.bar_ratio, 1.0, "top damage dealer ranks at the max");
    assert_eq!(bob.bar_ratio, 0.5, "half of the top damage dealer's total");
}

#[test]
fn equipped_weapon_resolves_through_the_configured_item_category_table() {
    let mut table_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(table_file, "501 = \"sword\"").unwrap();

    let mut pipeline = rusty_meter::Pipeline::new(&Config {
        self_name: Some("Alice".to_owned()),
        self_id: Some(1),
        item_category_table_path: Some(table_file.path().to_path_buf()),
        ..Config::default()
    })
    .unwrap();

    pipeline.ingest_packet(packet(
        0,
        1,
        event_body(PARTY_UPDATE, &party_update_params(&["Alice"])),
    ));
    pipeline.ingest_packet(packet(
        1,
        2,
        event_body(PLAYER_JOINED, &player_joined_params(1, "Alice", &[501])),
    ));
    pipeline.ingest_packet(packet(
        2,
        3,
        event_body(HEALTH_UPDATE, &health_update_params(1, -10, Some(1))),
    ));

    let snapshot = pipeline.snapshot(2);
    let alice = snapshot.actors.iter().find(|a| a.name == "Alice").unwrap();
    assert_eq!(alice.weapon.as_deref(), Some("sword"));
}

#[test]
fn no_live_session_exports_zero_elapsed_and_no_actors() {
    let pipeline_config = Config::default();
    let mut pipeline = rusty_meter::Pipeline::new(&pipeline_config).unwrap();
    let snapshot = pipeline.snapshot(0);
    assert!(snapshot.actors.is_empty());
    assert_eq!(snapshot.elapsed_s, 0.0);
    assert!(snapshot.history.is_empty());
}
