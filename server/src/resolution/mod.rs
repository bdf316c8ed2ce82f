/**
 * Answers DNS queries received on a UDP socket with the help
 * of DoH servers speaking the json api.
 */
mod dns_packets;
mod dns_socket;
mod doh_client;
mod master_file;
mod query_handler;
mod record_type;
mod upstream_selector;

pub use dns_socket::DnsSocket;
