mod parsed_packet;
mod parsed_query;

pub use parsed_packet::ParsedPacket;
pub use parsed_query::ParsedQuery;
