use std::fmt::Display;

use super::ParsedPacket;
use crate::resolution::doh_client::Query;
use anyhow::anyhow;
use domain::base::iana::Opcode;

#[derive(thiserror::Error, Debug)]
pub enum ParseQueryError {
    #[error("Invalid request: {0}.")]
    InvalidRequest(#[from] anyhow::Error),
}

/// A standard query with at least one question.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub packet: ParsedPacket,
}

impl ParsedQuery {
    /// Checks if this packet is a query we can answer.
    fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.packet.is_query() {
            return Err(anyhow!("Packet is not a query"));
        }
        let header = self.packet.parsed().header();
        if header.opcode() != Opcode::QUERY {
            return Err(anyhow!("Unsupported opcode {}", header.opcode()));
        }
        if self.packet.parsed().header_counts().qdcount() == 0 {
            return Err(anyhow!("Packet without a question"));
        }
        Ok(())
    }

    /// Questions in packet order. Fails if any question is malformed.
    pub fn questions(&self) -> Result<Vec<Query>, ParseQueryError> {
        let mut queries = vec![];
        for question in self.packet.parsed().question() {
            let question = question.map_err(|e| anyhow!("Malformed question. {e}"))?;
            queries.push(Query::new(question.qname().to_string(), question.qtype().to_int()));
        }
        Ok(queries)
    }

    pub fn id(&self) -> u16 {
        self.packet.id()
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.packet.parsed().header().rd()
    }
}

impl Display for ParsedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let first = self.packet.parsed().first_question();
        match first {
            Some(question) => write!(
                f,
                "{} {} {} id={} rd={}",
                question.qname(),
                question.qtype(),
                question.qclass(),
                self.id(),
                self.is_recursion_desired()
            ),
            None => write!(f, "id={} rd={}", self.id(), self.is_recursion_desired()),
        }
    }
}

impl TryFrom<ParsedPacket> for ParsedQuery {
    type Error = ParseQueryError;
    fn try_from(value: ParsedPacket) -> Result<Self, Self::Error> {
        let me = Self { packet: value };
        me.validate()?;
        Ok(me)
    }
}

#[cfg(test)]
mod tests {
    use domain::base::{iana::Rtype, MessageBuilder, Name};
    use std::str::FromStr;

    use super::*;

    fn parse(raw: Vec<u8>) -> Result<ParsedQuery, ParseQueryError> {
        ParsedQuery::try_from(ParsedPacket::new(raw).unwrap())
    }

    fn build_query(opcode: Opcode, names: &[(&str, Rtype)]) -> Vec<u8> {
        let mut builder = MessageBuilder::new_vec();
        builder.header_mut().set_id(7);
        builder.header_mut().set_opcode(opcode);
        builder.header_mut().set_rd(true);
        let mut question = builder.question();
        for (name, rtype) in names {
            question.push((Name::<Vec<u8>>::from_str(name).unwrap(), *rtype)).unwrap();
        }
        question.finish()
    }

    #[test]
    fn new() {
        let raw = build_query(Opcode::QUERY, &[("example.com.", Rtype::A)]);
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.id(), 7);
        assert!(parsed.is_recursion_desired());
        let questions = parsed.questions().unwrap();
        assert_eq!(questions, vec![Query::new("example.com.", 1)]);
    }

    #[test]
    fn questions_keep_their_order() {
        let raw = build_query(
            Opcode::QUERY,
            &[("example.com.", Rtype::AAAA), ("example.org.", Rtype::MX)],
        );
        let questions = parse(raw).unwrap().questions().unwrap();
        assert_eq!(
            questions,
            vec![Query::new("example.com.", 28), Query::new("example.org.", 15)]
        );
    }

    #[test]
    fn without_question() {
        let raw = build_query(Opcode::QUERY, &[]);
        assert!(matches!(parse(raw), Err(ParseQueryError::InvalidRequest(_))));
    }

    #[test]
    fn other_opcode() {
        let raw = build_query(Opcode::STATUS, &[("example.com.", Rtype::A)]);
        assert!(matches!(parse(raw), Err(ParseQueryError::InvalidRequest(_))));
    }

    #[test]
    fn tryfrom_parsed_packet() {
        let raw = build_query(Opcode::QUERY, &[("example.com.", Rtype::A)]);
        let parsed = ParsedPacket::new(raw).unwrap();
        let parsed_query: ParsedQuery = parsed.try_into().unwrap();
        let display = parsed_query.to_string();
        assert!(display.starts_with("example.com"));
        assert!(display.ends_with("A IN id=7 rd=true"));
    }
}
