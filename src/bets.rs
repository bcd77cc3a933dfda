//! Where bets come from.
//!
//! Either a headerless CSV file with one
//! `name,lastname,document,birthdate,number` row per bet, read lazily, or a
//! single bet described by the `NOMBRE`, `APELLIDO`, `DOCUMENTO`,
//! `NACIMIENTO` and `NUMERO` environment variables.

use crate::error::BetSourceError;
use crate::protocol::Bet;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Raw CSV row, validated into a `Bet`.
#[derive(Debug, Deserialize)]
struct BetRow {
    name: String,
    lastname: String,
    document: String,
    birthdate: String,
    number: String,
}

/// Stream of bets from any source.
pub type Bets = Box<dyn Iterator<Item = Result<Bet, BetSourceError>>>;

/// Configured origin of the bets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BetSource {
    File(PathBuf),
    Environment,
}

impl BetSource {
    /// Open the source as a stream of bets.
    pub fn open(&self) -> Result<Bets, BetSourceError> {
        match self {
            BetSource::File(path) => Ok(Box::new(BetFile::open(path)?)),
            BetSource::Environment => {
                let bet = bet_from_vars(|key| std::env::var(key).ok())?;
                Ok(Box::new(std::iter::once(Ok(bet))))
            }
        }
    }
}

/// Lazy reader over a bets CSV.
pub struct BetFile<R: Read> {
    rows: csv::DeserializeRecordsIntoIter<R, BetRow>,
    line: u64,
}

impl BetFile<File> {
    pub fn open(path: &Path) -> Result<Self, BetSourceError> {
        let reader = reader_builder()
            .from_path(path)
            .map_err(|source| BetSourceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(reader))
    }
}

impl<R: Read> BetFile<R> {
    pub fn from_reader(input: R) -> Self {
        Self::new(reader_builder().from_reader(input))
    }

    fn new(reader: csv::Reader<R>) -> Self {
        Self {
            rows: reader.into_deserialize(),
            line: 0,
        }
    }
}

impl<R: Read> Iterator for BetFile<R> {
    type Item = Result<Bet, BetSourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.line += 1;
        let line = self.line;

        Some(
            row.map_err(|source| BetSourceError::Csv { line, source })
                .and_then(|row| {
                    Bet::parse(
                        &row.name,
                        &row.lastname,
                        &row.document,
                        &row.birthdate,
                        &row.number,
                    )
                    .map_err(|source| BetSourceError::Record { line, source })
                }),
        )
    }
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).trim(csv::Trim::All);
    builder
}

/// Build the single bet described by the environment.
fn bet_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Bet, BetSourceError> {
    let var = |key: &'static str| lookup(key).ok_or(BetSourceError::MissingVar(key));

    Bet::parse(
        &var("NOMBRE")?,
        &var("APELLIDO")?,
        &var("DOCUMENTO")?,
        &var("NACIMIENTO")?,
        &var("NUMERO")?,
    )
    .map_err(BetSourceError::Env)
}
