pub mod record;
pub mod search;
pub mod recognizer;
pub mod registry;
pub mod classifier;
pub mod input;
pub mod scrub;
pub mod aggregate;
pub mod fingerprint;
pub mod config;
pub mod logging;
