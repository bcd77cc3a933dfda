//! agency-client: submits an agency's lottery bets to the central aggregator
//!
//! The client:
//! - Reads bets from a CSV file or from the environment
//! - Uploads them in size-bounded chunks over one TCP connection
//! - Asks the aggregator for the agency's winners on the same connection
//! - Stops cleanly at the next batch operation after SIGTERM
//! - Is configured via CLI arguments, environment variables or a TOML file

pub mod bets;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod shutdown;
pub mod submitter;
pub mod transport;
pub mod winners;
