//! Test fixtures

mod two_peer;

pub use two_peer::{EVENT_TIMEOUT, TwoPeerFixture, next_event, wait_for};
