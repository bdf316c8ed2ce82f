use bytes::Bytes;
use domain::base::{iana::Rcode, message_builder::PushError, MessageBuilder};
use std::time::Instant;

use super::{
    dns_packets::{ParsedPacket, ParsedQuery},
    master_file::DohRecord,
    upstream_selector::UpstreamSelector,
};

/**
 * Answers DNS queries with the help of the DoH upstreams.
 * Only the first question that resolves is answered.
 */
#[derive(Debug, Clone)]
pub struct QueryHandler {
    selector: UpstreamSelector,
}

impl QueryHandler {
    pub fn new(selector: UpstreamSelector) -> Self {
        Self { selector }
    }

    /**
     * Handles a raw packet. Returns `None` if the packet must not be answered,
     * either because the header can't be decoded or because it is a reply.
     */
    pub async fn handle_raw(&self, bytes: impl Into<Bytes>) -> Option<Vec<u8>> {
        let packet = match ParsedPacket::new(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Failed to parse packet. {e} Drop.");
                return None;
            }
        };

        if packet.is_reply() {
            tracing::debug!("Received reply id={} without a query. Drop.", packet.id());
            return None;
        }

        match ParsedQuery::try_from(packet.clone()) {
            Ok(query) => Some(self.handle_with_log(&query).await),
            Err(e) => {
                tracing::debug!("Refuse to process query id={}. {e}", packet.id());
                Some(packet.create_server_fail_reply())
            }
        }
    }

    /// Handles the query and logs how long it took.
    pub async fn handle_with_log(&self, query: &ParsedQuery) -> Vec<u8> {
        let start = Instant::now();
        let reply = self.handle(query).await;
        tracing::debug!("{query} processed within {}ms.", start.elapsed().as_millis());
        reply
    }

    /// Resolves the questions in order and stops at the first one that resolves.
    pub async fn handle(&self, query: &ParsedQuery) -> Vec<u8> {
        let questions = match query.questions() {
            Ok(questions) => questions,
            Err(e) => {
                tracing::debug!("{e} id={}", query.id());
                return query.packet.create_server_fail_reply();
            }
        };

        for question in questions.iter() {
            match self.selector.resolve(question).await {
                Ok(records) => {
                    return match Self::build_reply(query, records) {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::warn!("Failed to build reply for {query}. {e}");
                            query.packet.create_server_fail_reply()
                        }
                    };
                }
                Err(e) => {
                    tracing::debug!("{e}");
                }
            }
        }

        query.packet.create_server_fail_reply()
    }

    /// Reply with the question echoed and the records in the answer section. Uncompressed.
    fn build_reply(query: &ParsedQuery, records: Vec<DohRecord>) -> Result<Vec<u8>, PushError> {
        let request = query.packet.parsed();
        let mut reply = MessageBuilder::new_vec().start_answer(request, Rcode::NOERROR)?;
        let header = reply.header_mut();
        header.set_ra(true);
        header.set_cd(request.header().cd());
        for record in records {
            reply.push(record)?;
        }
        Ok(reply.finish())
    }
}
