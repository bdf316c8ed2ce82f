use std::{fmt::Display, str::FromStr};

/// Record type code is not in the table of types this proxy can translate.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unsupported record type {0}.")]
pub struct UnsupportedType(pub u16);

/**
 * Record types that can be translated between the DNS wire format
 * and the DoH json api.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Spf,
    Any,
}

impl RecordType {
    pub const ALL: [RecordType; 10] = [
        RecordType::A,
        RecordType::Ns,
        RecordType::Cname,
        RecordType::Soa,
        RecordType::Ptr,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Aaaa,
        RecordType::Spf,
        RecordType::Any,
    ];

    /// Numeric type code as used on the wire.
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Spf => 99,
            RecordType::Any => 255,
        }
    }

    /// Mnemonic used in the DoH `type` parameter and in master-file text.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ns => "NS",
            RecordType::Cname => "CNAME",
            RecordType::Soa => "SOA",
            RecordType::Ptr => "PTR",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Aaaa => "AAAA",
            RecordType::Spf => "SPF",
            RecordType::Any => "ANY",
        }
    }

    /**
     * Type whose presentation format is used to parse the record data.
     * SPF rdata is written exactly like TXT rdata.
     */
    pub fn presentation_type(&self) -> RecordType {
        match self {
            RecordType::Spf => RecordType::Txt,
            other => *other,
        }
    }
}

impl TryFrom<u16> for RecordType {
    type Error = UnsupportedType;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        RecordType::ALL
            .into_iter()
            .find(|rtype| rtype.code() == code)
            .ok_or(UnsupportedType(code))
    }
}

impl FromStr for RecordType {
    type Err = UnsupportedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|rtype| rtype.mnemonic().eq_ignore_ascii_case(s.trim()))
            .ok_or(UnsupportedType(0))
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Maps a numeric record type code to its mnemonic.
pub fn code_to_mnemonic(code: u16) -> Result<&'static str, UnsupportedType> {
    RecordType::try_from(code).map(|rtype| rtype.mnemonic())
}
