//! Core engine for the multi-site forum check-in bot: credential vault,
//! scheduling, site adapters, and persistence. No chat transport lives here
//! (spec Non-goals) — `checkin-cli` is the composition root.

pub mod atoms;
pub mod engine;
