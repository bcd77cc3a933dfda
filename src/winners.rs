//! Winners query.
//!
//! Runs on the same connection once the last chunk has been acknowledged:
//! the agency handle goes out as a raw big-endian `u16` and the reply is an
//! ASCII length, `;`, then that many bytes of `;`-joined document ids.

use crate::error::Result;
use crate::protocol::{AgencyId, SEPARATOR};
use crate::transport::{Connection, Transport};
use tracing::{error, info};

#[derive(Debug)]
pub struct WinnersQuery<C: Connection> {
    agency: AgencyId,
    transport: Transport<C>,
}

impl<C: Connection> WinnersQuery<C> {
    pub(crate) fn new(agency: AgencyId, transport: Transport<C>) -> Self {
        Self { agency, transport }
    }

    /// Send the agency id as a 2-byte big-endian integer.
    pub fn send_agency_handle(&mut self) -> Result<()> {
        self.transport
            .send_all(&self.agency.handle().to_be_bytes())?;
        Ok(())
    }

    /// Read the winners reply. An empty payload means no winners.
    pub fn receive_winners(&mut self) -> Result<Vec<String>> {
        let payload = self.transport.recv_until_delimiter(SEPARATOR)?;
        Ok(split_winners(&payload))
    }

    /// Ask for the winners and close the connection.
    pub fn run(mut self) -> Result<Vec<String>> {
        let result = self
            .send_agency_handle()
            .and_then(|()| self.receive_winners());
        self.transport.close();

        match &result {
            Ok(winners) => info!(
                agency = %self.agency,
                winners = winners.len(),
                "Winners received"
            ),
            Err(e) => error!(agency = %self.agency, error = %e, "Winners query failed"),
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &Transport<C> {
        &self.transport
    }
}

fn split_winners(payload: &[u8]) -> Vec<String> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload
        .split(|&b| b == SEPARATOR)
        .map(|id| String::from_utf8_lossy(id).into_owned())
        .collect()
}
