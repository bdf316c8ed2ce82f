use bytes::Bytes;
use domain::base::{iana::Rcode, message::ShortMessage, Message, MessageBuilder};

/// Dns packet with its raw bytes. `Message<Bytes>` owns the bytes
/// so the packet can be moved into a query task as a whole.
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    message: Message<Bytes>,
}

impl ParsedPacket {
    pub fn new(raw_bytes: impl Into<Bytes>) -> Result<Self, ShortMessage> {
        let message = Message::from_octets(raw_bytes.into())?;
        Ok(Self { message })
    }

    pub fn id(&self) -> u16 {
        self.message.header().id()
    }

    /// Parsed DNS packet
    pub fn parsed(&self) -> &Message<Bytes> {
        &self.message
    }

    /// If this packet is a reply
    pub fn is_reply(&self) -> bool {
        self.message.header().qr()
    }

    /// If this packet is a query
    pub fn is_query(&self) -> bool {
        !self.is_reply()
    }

    /**
     * Create SRVFAIL reply. Echoes the question section like any other reply.
     * Falls back to a bare header if the questions can't be copied.
     * Sets RA and copies CD in both cases.
     */
    pub fn create_server_fail_reply(&self) -> Vec<u8> {
        let cd = self.message.header().cd();
        match MessageBuilder::new_vec().start_answer(&self.message, Rcode::SERVFAIL) {
            Ok(mut reply) => {
                let header = reply.header_mut();
                header.set_ra(true);
                header.set_cd(cd);
                reply.finish()
            }
            Err(e) => {
                tracing::debug!("Failed to copy the question into the SRVFAIL reply. {e}");
                let mut reply = MessageBuilder::new_vec();
                let header = reply.header_mut();
                header.set_id(self.id());
                header.set_qr(true);
                header.set_opcode(self.message.header().opcode());
                header.set_rd(self.message.header().rd());
                header.set_ra(true);
                header.set_cd(cd);
                header.set_rcode(Rcode::SERVFAIL);
                reply.finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::base::{iana::Rtype, Name};
    use std::str::FromStr;

    fn example_query(id: u16) -> Vec<u8> {
        let mut builder = MessageBuilder::new_vec();
        builder.header_mut().set_id(id);
        builder.header_mut().set_rd(true);
        builder.header_mut().set_cd(true);
        let mut question = builder.question();
        question
            .push((Name::<Vec<u8>>::from_str("example.com.").unwrap(), Rtype::A))
            .unwrap();
        question.finish()
    }

    #[test]
    fn new() {
        let parsed = ParsedPacket::new(example_query(42)).unwrap();
        assert_eq!(parsed.id(), 42);
        assert!(parsed.is_query());
        assert!(!parsed.is_reply());
    }

    #[test]
    fn too_short() {
        assert!(ParsedPacket::new(vec![0u8; 5]).is_err());
    }

    #[test]
    fn server_fail_reply() {
        let parsed = ParsedPacket::new(example_query(4242)).unwrap();
        let reply = ParsedPacket::new(parsed.create_server_fail_reply()).unwrap();
        assert_eq!(reply.id(), 4242);
        assert!(reply.is_reply());
        assert_eq!(reply.parsed().header().rcode(), Rcode::SERVFAIL);
        assert!(reply.parsed().header().rd());
        assert!(reply.parsed().header().ra());
        assert!(reply.parsed().header().cd());
        assert_eq!(reply.parsed().header_counts().qdcount(), 1);
    }

    #[test]
    fn server_fail_reply_without_question() {
        // Header announces a question that isn't there.
        let mut raw = vec![0u8; 12];
        raw[0..2].copy_from_slice(&99u16.to_be_bytes());
        raw[2] = 0x01; // RD
        raw[3] = 0x10; // CD
        raw[5] = 1; // QDCOUNT
        let parsed = ParsedPacket::new(raw).unwrap();
        let reply = ParsedPacket::new(parsed.create_server_fail_reply()).unwrap();
        assert_eq!(reply.id(), 99);
        assert!(reply.is_reply());
        assert_eq!(reply.parsed().header().rcode(), Rcode::SERVFAIL);
        assert!(reply.parsed().header().rd());
        assert!(reply.parsed().header().ra());
        assert!(reply.parsed().header().cd());
        assert_eq!(reply.parsed().header_counts().qdcount(), 0);
    }
}
