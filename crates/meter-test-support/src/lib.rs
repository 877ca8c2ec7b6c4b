//! Shared fixtures for the other crates' test suites: raw datagram/command
//! builders, canned endpoints, and a few small clock helpers. Mirrors
//! `rt-test-utils`'s role in the original workspace — not published, only
//! ever pulled in as a `dev-dependency`.

pub mod datagram;
pub mod event;

use std::net::Ipv4Addr;

use meter_proto::Endpoint;

/// A stable, distinct `Endpoint` per small integer, for tests that just need
/// "some host" without caring which.
pub fn endpoint(n: u8) -> Endpoint {
    Endpoint::new(Ipv4Addr::new(10, 0, 0, n), 5055 + u16::from(n))
}
