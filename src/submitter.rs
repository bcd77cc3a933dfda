//! Batch submission controller.
//!
//! Drives the chunk accumulator, frame codec and transport for one agency
//! session:
//!
//! ```text
//! Idle -> Accumulating -> Flushing -> Accumulating
//!                                  -> Finished (last chunk, rejection,
//!                                     transport failure, cancellation)
//! ```
//!
//! A record is never split across chunks. When the next record would push
//! the frame to the budget, the buffered chunk is flushed first and the new
//! record seeds the next one.

use crate::error::{ClientError, Result};
use crate::protocol::{
    decode_response_code, encode_frame, AgencyId, Bet, ChunkAccumulator, Continuation,
    ResponseCode, STATUS_BYTES,
};
use crate::shutdown::CancellationToken;
use crate::transport::{Connection, Transport};
use crate::winners::WinnersQuery;
use tracing::{debug, error, info, warn};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Accumulating,
    Flushing,
    Finished,
}

/// An acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    /// 1-based chunk number within the session.
    pub sequence: u64,
    /// Records carried by the chunk.
    pub records: usize,
    /// Frame size on the wire.
    pub bytes: usize,
    pub continuation: Continuation,
}

/// Outcome of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Record buffered, nothing sent.
    Buffered,
    /// A chunk was sent and acknowledged.
    Flushed(ChunkAck),
    /// Cancellation was observed; the connection is closed.
    Cancelled,
}

/// Chunk sizing for a session.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Frame size every chunk must stay below.
    pub max_chunk_bytes: usize,
    /// Largest single read or write on the connection.
    pub max_segment_bytes: usize,
}

pub struct BatchSubmitter<C: Connection> {
    agency: AgencyId,
    transport: Transport<C>,
    chunk: ChunkAccumulator,
    cancel: CancellationToken,
    state: SessionState,
    chunks_sent: u64,
    bets_sent: u64,
    cancelled: bool,
    stream_ended: bool,
}

impl<C: Connection> BatchSubmitter<C> {
    /// Start a session over an already established connection.
    pub fn new(agency: AgencyId, conn: C, limits: BatchLimits, cancel: CancellationToken) -> Self {
        let chunk = ChunkAccumulator::new(agency.as_str().len(), limits.max_chunk_bytes);
        Self {
            agency,
            transport: Transport::new(conn, limits.max_segment_bytes),
            chunk,
            cancel,
            state: SessionState::Idle,
            chunks_sent: 0,
            bets_sent: 0,
            cancelled: false,
            stream_ended: false,
        }
    }

    /// Add a bet to the current chunk, flushing the chunk first if the bet
    /// would not fit.
    pub fn add_record(&mut self, bet: &Bet) -> Result<Progress> {
        if self.cancelled {
            return Ok(Progress::Cancelled);
        }
        if self.state == SessionState::Finished {
            return Err(ClientError::SessionFinished);
        }
        if self.poll_cancel() {
            return Ok(Progress::Cancelled);
        }

        let encoded = bet.encode();
        let alone = self.chunk.overhead() + encoded.len();
        if alone >= self.chunk.budget() {
            return Err(ClientError::RecordTooLarge {
                size: alone,
                budget: self.chunk.budget(),
            });
        }

        let mut progress = Progress::Buffered;
        if self.chunk.would_overflow(encoded.len()) {
            progress = Progress::Flushed(self.flush(Continuation::More)?);
        }

        debug!(agency = %self.agency, bet = %bet, "Bet buffered");
        if self.chunk.push(&encoded) {
            debug!(
                records = self.chunk.records(),
                size = self.chunk.current_size(),
                "Chunk full"
            );
        }
        self.state = SessionState::Accumulating;
        Ok(progress)
    }

    /// Send the buffered chunk and wait for its acknowledgement.
    ///
    /// The buffer is cleared whatever the outcome. A rejection or transport
    /// failure closes the connection and finishes the session.
    pub fn flush(&mut self, continuation: Continuation) -> Result<ChunkAck> {
        if self.state == SessionState::Finished {
            return Err(ClientError::SessionFinished);
        }

        self.state = SessionState::Flushing;
        let result = self.send_chunk(continuation);
        self.chunk.reset();

        match result {
            Ok(ack) => {
                self.state = match continuation {
                    Continuation::More => SessionState::Accumulating,
                    Continuation::Last => SessionState::Finished,
                };
                Ok(ack)
            }
            Err(e) => {
                error!(agency = %self.agency, error = %e, "Chunk submission failed");
                self.transport.close();
                self.state = SessionState::Finished;
                Err(e)
            }
        }
    }

    /// Send the final chunk, telling the aggregator no more bets follow.
    pub fn end_stream(&mut self) -> Result<Progress> {
        if self.cancelled {
            return Ok(Progress::Cancelled);
        }
        if self.state == SessionState::Finished {
            return Err(ClientError::SessionFinished);
        }
        if self.poll_cancel() {
            return Ok(Progress::Cancelled);
        }

        let ack = self.flush(Continuation::Last)?;
        self.stream_ended = true;
        info!(
            agency = %self.agency,
            bets = self.bets_sent,
            chunks = self.chunks_sent,
            "All bets submitted"
        );
        Ok(Progress::Flushed(ack))
    }

    /// Hand the connection over to the winners query.
    pub fn into_winners_query(self) -> Result<WinnersQuery<C>> {
        if !self.stream_ended || self.transport.is_closed() {
            return Err(ClientError::StreamNotEnded);
        }
        Ok(WinnersQuery::new(self.agency, self.transport))
    }

    /// Close the connection and finish the session.
    pub fn close(&mut self) {
        self.transport.close();
        self.state = SessionState::Finished;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bets_sent(&self) -> u64 {
        self.bets_sent
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    fn poll_cancel(&mut self) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        self.cancelled = true;
        self.chunk.reset();
        self.close();
        info!(agency = %self.agency, bets = self.bets_sent, "Session cancelled");
        true
    }

    fn send_chunk(&mut self, continuation: Continuation) -> Result<ChunkAck> {
        let sequence = self.chunks_sent + 1;
        let records = self.chunk.records();

        let frame = encode_frame(&self.agency, self.chunk.as_bytes(), continuation)?;
        self.transport.send_all(&frame)?;

        let reply = self.transport.recv_exact(STATUS_BYTES)?;
        let code = decode_response_code([reply[0], reply[1]]);
        if !code.is_success() {
            warn!(agency = %self.agency, chunk = sequence, records, code = %code, "Chunk rejected");
            return Err(rejected(sequence, code));
        }

        self.chunks_sent = sequence;
        self.bets_sent += records as u64;
        info!(
            agency = %self.agency,
            chunk = sequence,
            records,
            bytes = frame.len(),
            last = continuation == Continuation::Last,
            "Chunk acknowledged"
        );

        Ok(ChunkAck {
            sequence,
            records,
            bytes: frame.len(),
            continuation,
        })
    }
}

fn rejected(chunk: u64, code: ResponseCode) -> ClientError {
    ClientError::Rejected {
        chunk,
        code: code.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::frame::encode_status;
    use crate::protocol::record::sample_bet;
    use crate::transport::testing::ScriptedConnection;

    const ACK: [u8; 2] = [0, 1];

    fn agency() -> AgencyId {
        "1".parse().unwrap()
    }

    fn limits(max_chunk_bytes: usize) -> BatchLimits {
        BatchLimits {
            max_chunk_bytes,
            max_segment_bytes: 8192,
        }
    }

    fn submitter(conn: ScriptedConnection, budget: usize) -> BatchSubmitter<ScriptedConnection> {
        BatchSubmitter::new(agency(), conn, limits(budget), CancellationToken::new())
    }

    /// Split written bytes back into (chunk, flag) pairs.
    fn frames(written: &[u8]) -> Vec<(Vec<u8>, u16)> {
        let mut out = Vec::new();
        let mut rest = written;
        while !rest.is_empty() {
            let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            let payload = &rest[2..2 + len];
            assert_eq!(&payload[..2], b"1;");
            let chunk = payload[2..len - 2].to_vec();
            let flag = u16::from_be_bytes([payload[len - 2], payload[len - 1]]);
            out.push((chunk, flag));
            rest = &rest[2 + len..];
        }
        out
    }

    #[test]
    fn test_small_batch_single_chunk() {
        let conn = ScriptedConnection::new().reply(&ACK).reply(b"0;");
        let mut submitter = submitter(conn, 100);

        let bets = [sample_bet("A", 1), sample_bet("B", 2), sample_bet("C", 3)];
        for bet in &bets {
            assert_eq!(submitter.add_record(bet).unwrap(), Progress::Buffered);
        }
        assert_eq!(submitter.state(), SessionState::Accumulating);
        assert!(submitter.transport().connection().written.is_empty());

        let progress = submitter.end_stream().unwrap();
        assert!(matches!(
            progress,
            Progress::Flushed(ChunkAck {
                sequence: 1,
                records: 3,
                continuation: Continuation::Last,
                ..
            })
        ));
        assert_eq!(submitter.state(), SessionState::Finished);
        assert_eq!(submitter.bets_sent(), 3);

        let sent = frames(&submitter.transport().connection().written);
        let expected: Vec<u8> = bets
            .iter()
            .map(|b| b.encode().to_vec())
            .collect::<Vec<_>>()
            .join(&b';');
        assert_eq!(sent, vec![(expected, 0)]);

        let winners = submitter.into_winners_query().unwrap().run().unwrap();
        assert!(winners.is_empty());
    }

    #[test]
    fn test_budget_splits_into_two_chunks() {
        let conn = ScriptedConnection::new().reply(&ACK).reply(&ACK);
        let mut submitter = submitter(conn, 40);

        let first = sample_bet("Ana", 12345);
        let second = sample_bet("Eva", 54321);
        assert_eq!(first.encode().len(), 33);
        assert_eq!(second.encode().len(), 33);

        assert_eq!(submitter.add_record(&first).unwrap(), Progress::Buffered);
        let progress = submitter.add_record(&second).unwrap();
        assert!(matches!(
            progress,
            Progress::Flushed(ChunkAck {
                sequence: 1,
                records: 1,
                bytes: 39,
                continuation: Continuation::More,
            })
        ));
        assert_eq!(submitter.state(), SessionState::Accumulating);

        submitter.end_stream().unwrap();

        let sent = frames(&submitter.transport().connection().written);
        assert_eq!(
            sent,
            vec![
                (first.encode().to_vec(), 1),
                (second.encode().to_vec(), 0)
            ]
        );
        assert_eq!(submitter.chunks_sent(), 2);
    }

    #[test]
    fn test_chunks_stay_under_budget() {
        let budget = 120;
        let bets: Vec<Bet> = (0..40)
            .map(|i| sample_bet(&"x".repeat(1 + i % 17), 10u64.pow((i % 9) as u32)))
            .collect();

        let mut conn = ScriptedConnection::new();
        for _ in 0..bets.len() {
            conn = conn.reply(&ACK);
        }
        let mut submitter = submitter(conn, budget);

        for bet in &bets {
            submitter.add_record(bet).unwrap();
        }
        submitter.end_stream().unwrap();

        let written = submitter.transport().connection().written.clone();
        let sent = frames(&written);
        assert!(sent.len() > 1);

        let mut decoded = Vec::new();
        for (i, (chunk, flag)) in sent.iter().enumerate() {
            assert!(chunk.len() + 6 < budget);
            let last = i == sent.len() - 1;
            assert_eq!(*flag, if last { 0 } else { 1 });

            // Whole records only
            let fields: Vec<&[u8]> = chunk.split(|&b| b == b';').collect();
            assert_eq!(fields.len() % 5, 0);
            for record in fields.chunks(5) {
                decoded.push(Bet::decode(&record.join(&b';')).unwrap());
            }
        }
        assert_eq!(decoded, bets);
    }

    #[test]
    fn test_cancelled_before_add() {
        let token = CancellationToken::new();
        let mut submitter = BatchSubmitter::new(
            agency(),
            ScriptedConnection::new().reply(&ACK),
            limits(100),
            token.clone(),
        );

        token.cancel();
        assert_eq!(
            submitter.add_record(&sample_bet("A", 1)).unwrap(),
            Progress::Cancelled
        );
        assert_eq!(submitter.state(), SessionState::Finished);
        assert!(submitter.is_cancelled());

        // Later calls are no-ops
        assert_eq!(
            submitter.add_record(&sample_bet("B", 2)).unwrap(),
            Progress::Cancelled
        );
        assert_eq!(submitter.end_stream().unwrap(), Progress::Cancelled);

        let conn = submitter.transport().connection();
        assert!(conn.written.is_empty());
        assert_eq!(conn.closes, 1);
        assert!(matches!(
            submitter.into_winners_query(),
            Err(ClientError::StreamNotEnded)
        ));
    }

    #[test]
    fn test_cancelled_mid_session_drops_pending_chunk() {
        let token = CancellationToken::new();
        let mut submitter = BatchSubmitter::new(
            agency(),
            ScriptedConnection::new().reply(&ACK),
            limits(100),
            token.clone(),
        );

        submitter.add_record(&sample_bet("A", 1)).unwrap();
        token.cancel();
        assert_eq!(submitter.end_stream().unwrap(), Progress::Cancelled);

        let conn = submitter.transport().connection();
        assert!(conn.written.is_empty());
        assert_eq!(conn.closes, 1);
    }

    #[test]
    fn test_rejected_chunk_closes_connection() {
        let conn = ScriptedConnection::new().reply(&encode_status(2));
        let mut submitter = submitter(conn, 100);

        submitter.add_record(&sample_bet("A", 1)).unwrap();
        let err = submitter.end_stream().unwrap_err();
        assert!(matches!(err, ClientError::Rejected { chunk: 1, code: 2 }));

        assert_eq!(submitter.state(), SessionState::Finished);
        assert_eq!(submitter.bets_sent(), 0);
        assert_eq!(submitter.transport().connection().closes, 1);
        assert!(matches!(
            submitter.add_record(&sample_bet("B", 2)),
            Err(ClientError::SessionFinished)
        ));
    }

    #[test]
    fn test_record_too_large() {
        let mut submitter = submitter(ScriptedConnection::new(), 20);

        let err = submitter.add_record(&sample_bet("Ana", 12345)).unwrap_err();
        assert!(matches!(
            err,
            ClientError::RecordTooLarge {
                size: 39,
                budget: 20
            }
        ));
        assert!(submitter.transport().connection().written.is_empty());
    }

    #[test]
    fn test_missing_ack_is_transport_failure() {
        let mut submitter = submitter(ScriptedConnection::new(), 100);

        submitter.add_record(&sample_bet("A", 1)).unwrap();
        let err = submitter.end_stream().unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Io(_))));
        assert_eq!(submitter.state(), SessionState::Finished);
        assert_eq!(submitter.transport().connection().closes, 1);
    }

    #[test]
    fn test_winners_query_requires_end_of_stream() {
        let mut submitter = submitter(ScriptedConnection::new(), 100);
        submitter.add_record(&sample_bet("A", 1)).unwrap();

        assert!(matches!(
            submitter.into_winners_query(),
            Err(ClientError::StreamNotEnded)
        ));
    }
}
