//! Bet record codec.
//!
//! A bet travels as `name;lastname;document;birthdate;number` with no
//! escaping, so text fields are checked for `;` when the bet is built.

use crate::error::RecordError;
use crate::protocol::SEPARATOR;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDate;
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";
const FIELD_COUNT: usize = 5;

/// A single lottery bet placed at an agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    name: String,
    lastname: String,
    document: u64,
    birthdate: NaiveDate,
    number: u64,
}

impl Bet {
    /// Build a bet, rejecting text the wire format cannot carry.
    pub fn new(
        name: impl Into<String>,
        lastname: impl Into<String>,
        document: u64,
        birthdate: NaiveDate,
        number: u64,
    ) -> Result<Self, RecordError> {
        let name = check_text("name", name.into())?;
        let lastname = check_text("lastname", lastname.into())?;
        Ok(Self {
            name,
            lastname,
            document,
            birthdate,
            number,
        })
    }

    /// Build a bet from its textual fields, as read from a file or the environment.
    pub fn parse(
        name: &str,
        lastname: &str,
        document: &str,
        birthdate: &str,
        number: &str,
    ) -> Result<Self, RecordError> {
        Self::new(
            name,
            lastname,
            parse_number("document", document)?,
            parse_date(birthdate)?,
            parse_number("number", number)?,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lastname(&self) -> &str {
        &self.lastname
    }

    pub fn document(&self) -> u64 {
        self.document
    }

    pub fn birthdate(&self) -> NaiveDate {
        self.birthdate
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Encode to the `;`-joined wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.name.len() + self.lastname.len() + 48);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.name.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.extend_from_slice(self.lastname.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.extend_from_slice(self.document.to_string().as_bytes());
        buf.put_u8(SEPARATOR);
        buf.extend_from_slice(self.birthdate.format(DATE_FORMAT).to_string().as_bytes());
        buf.put_u8(SEPARATOR);
        buf.extend_from_slice(self.number.to_string().as_bytes());
    }

    /// Decode a single encoded record.
    pub fn decode(input: &[u8]) -> Result<Self, RecordError> {
        let text = std::str::from_utf8(input).map_err(|_| RecordError::InvalidUtf8)?;
        let fields: Vec<&str> = text.split(SEPARATOR as char).collect();
        if fields.len() != FIELD_COUNT {
            return Err(RecordError::FieldCount(fields.len()));
        }
        Self::parse(fields[0], fields[1], fields[2], fields[3], fields[4])
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (document {}, number {})",
            self.name, self.lastname, self.document, self.number
        )
    }
}

fn check_text(field: &'static str, value: String) -> Result<String, RecordError> {
    if value.is_empty() {
        return Err(RecordError::EmptyField(field));
    }
    if value
        .bytes()
        .any(|b| b == SEPARATOR || b == b'\n' || b == b'\r')
    {
        return Err(RecordError::ReservedCharacter { field, value });
    }
    Ok(value)
}

fn parse_number(field: &'static str, value: &str) -> Result<u64, RecordError> {
    value
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_date(value: &str) -> Result<NaiveDate, RecordError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| RecordError::InvalidBirthdate(value.to_string()))
}

#[cfg(test)]
pub(crate) fn sample_bet(name: &str, document: u64) -> Bet {
    Bet::new(
        name,
        "Lorenzo",
        document,
        NaiveDate::from_ymd_opt(1999, 3, 17).expect("valid date"),
        7574,
    )
    .expect("valid bet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let bet = sample_bet("Santiago", 30904465);
        assert_eq!(&bet.encode()[..], b"Santiago;Lorenzo;30904465;1999-03-17;7574");
    }

    #[test]
    fn test_decode_matches_encode() {
        let bet = sample_bet("Ana", 1);
        assert_eq!(Bet::decode(&bet.encode()).unwrap(), bet);
    }

    #[test]
    fn test_rejects_separator_in_text() {
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let err = Bet::new("Ana;Maria", "Perez", 1, date, 2).unwrap_err();
        assert!(matches!(
            err,
            RecordError::ReservedCharacter { field: "name", .. }
        ));

        let err = Bet::new("Ana", "Pe\nrez", 1, date, 2).unwrap_err();
        assert!(matches!(
            err,
            RecordError::ReservedCharacter {
                field: "lastname",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_empty_text() {
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(
            Bet::new("", "Perez", 1, date, 2).unwrap_err(),
            RecordError::EmptyField("name")
        );
    }

    #[test]
    fn test_parse_fields() {
        let bet = Bet::parse("Ana", "Perez", "12345678", "1990-12-31", " 42").unwrap();
        assert_eq!(bet.document(), 12345678);
        assert_eq!(bet.number(), 42);
        assert_eq!(bet.birthdate(), NaiveDate::from_ymd_opt(1990, 12, 31).unwrap());

        assert!(matches!(
            Bet::parse("Ana", "Perez", "12a", "1990-12-31", "1"),
            Err(RecordError::InvalidNumber {
                field: "document",
                ..
            })
        ));
        assert!(matches!(
            Bet::parse("Ana", "Perez", "1", "31/12/1990", "1"),
            Err(RecordError::InvalidBirthdate(_))
        ));
    }

    #[test]
    fn test_decode_field_count() {
        assert_eq!(
            Bet::decode(b"Ana;Perez;1;1990-12-31").unwrap_err(),
            RecordError::FieldCount(4)
        );
        assert_eq!(
            Bet::decode(&[0xff, 0xfe]).unwrap_err(),
            RecordError::InvalidUtf8
        );
    }
}
