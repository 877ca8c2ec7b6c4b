//! Session lifecycle across the three modes (spec.md §8 scenario 4, §4.6):
//! a battle-mode session opens on first damage and archives itself once the
//! idle timeout elapses, landing in history with the expected label and
//! totals.

use meter_capture::RawPacket;
use meter_proto::Endpoint;
use meter_test_support::datagram::{datagram, reliable_command};
use meter_test_support::event::{event_body, health_update_params};
use meter_session::Mode;
use rusty_meter::{Config, Pipeline};
use std::net::Ipv4Addr;

const HEALTH_UPDATE: u8 = 10;

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
fn battle_session_archives_after_idle_timeout() {
    let mut pipeline = Pipeline::new(&config()).unwrap();

    let damage = event_body(HEALTH_UPDATE, &health_update_params(1, -100, Some(1)));
    pipeline.ingest_packet(packet(0, 1, damage));

    let snapshot = pipeline.snapshot(0);
    assert_eq!(snapshot.actors.len(), 1);
    assert_eq!(snapshot.actors[0].damage, 100);
    assert!(snapshot.history.is_empty());

    // Idle past the default 20s battle timeout with no attributable event.
    let past_timeout = 21_000_000;
    pipeline.tick(past_timeout);

    let snapshot = pipeline.snapshot(past_timeout);
    assert!(snapshot.actors.is_empty(), "no live session once the battle timed out");
    assert_eq!(snapshot.history.len(), 1);
    let archived = &snapshot.history[0];
    assert_eq!(archived.label, "Battle 1");
    assert_eq!(archived.actors.len(), 1);
    assert_eq!(archived.actors[0].damage, 100);
}

#[test]
fn manual_mode_sessions_open_and_close_on_toggle() {
    let mut pipeline = Pipeline::new(&config()).unwrap();
    pipeline.set_mode(Mode::Manual, 0);

    // No session exists until the first manual toggle.
    let damage = event_body(HEALTH_UPDATE, &health_update_params(1, -50, Some(1)));
    pipeline.ingest_packet(packet(0, 1, damage.clone()));
    let snapshot = pipeline.snapshot(0);
    assert!(snapshot.actors.is_empty());

    pipeline.manual_toggle(1);
    pipeline.ingest_packet(packet(2, 2, damage));
    let snapshot = pipeline.snapshot(2);
    assert_eq!(snapshot.actors.len(), 1);
    assert_eq!(snapshot.actors[0].damage, 50);

    pipeline.manual_toggle(3);
    let snapshot = pipeline.snapshot(3);
    assert!(snapshot.actors.is_empty());
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].label, "Manual 1");
}
