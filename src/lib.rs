//! Search AllAnime, enrich results with Jikan synopses and artwork, keep a
//! local watch history and library, and hand episodes off to `ani-cli`.

pub mod cache;
pub mod error;
pub mod history;
pub mod player;
pub mod poller;
pub mod providers;
pub mod ratelimit;
pub mod session;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{Error, Result};
