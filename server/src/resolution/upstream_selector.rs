use reqwest::Url;
use std::{sync::Arc, time::Duration};

use super::{
    doh_client::{DohClient, LookupHolder, Query},
    master_file::DohRecord,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("All upstreams failed to answer {0}.")]
    AllUpstreamsFailed(String),
}

/**
 * Tries the configured upstreams one after another, always starting with
 * the first one. The first upstream that answers wins.
 */
#[derive(Debug, Clone)]
pub struct UpstreamSelector {
    upstreams: Arc<Vec<Url>>,
    timeout: Option<Duration>,
    lookup: LookupHolder,
}

impl UpstreamSelector {
    pub fn new(upstreams: Vec<Url>, timeout: Option<Duration>) -> Self {
        Self::with_lookup(upstreams, timeout, LookupHolder::new(DohClient::new()))
    }

    pub fn with_lookup(upstreams: Vec<Url>, timeout: Option<Duration>, lookup: LookupHolder) -> Self {
        Self {
            upstreams: Arc::new(upstreams),
            timeout,
            lookup,
        }
    }

    pub async fn resolve(&self, query: &Query) -> Result<Vec<DohRecord>, ResolveError> {
        for upstream in self.upstreams.iter() {
            match self.lookup.call(upstream, query, self.timeout).await {
                Ok(records) => {
                    tracing::trace!("{upstream} resolved {query}.");
                    return Ok(records);
                }
                Err(e) => {
                    tracing::warn!("{upstream} DoH query failed. {e}");
                }
            }
        }
        Err(ResolveError::AllUpstreamsFailed(query.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::resolution::{
        doh_client::{tests::serve_stub, DohError, DohLookup},
        master_file::answer_to_record,
        record_type::RecordType,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Lookup stub. Upstreams whose host starts with `fail` reject every query,
    /// the others reject names starting with `fail` and answer the rest
    /// with one A record. Records each call.
    #[derive(Clone, Default)]
    pub struct StubLookup {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl StubLookup {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DohLookup for StubLookup {
        async fn lookup(&self, upstream: &Url, query: &Query, _timeout: Option<Duration>) -> Result<Vec<DohRecord>, DohError> {
            self.calls.lock().unwrap().push(upstream.to_string());
            let host = upstream.host_str().unwrap_or_default();
            if host.starts_with("fail") || query.name.starts_with("fail") {
                return Err(DohError::UpstreamRejected(2));
            }
            let record = answer_to_record(&query.name, 300, RecordType::A, "93.184.216.34")?;
            Ok(vec![record])
        }
    }

    pub fn urls(urls: &[&str]) -> Vec<Url> {
        urls.iter().map(|url| url.parse().unwrap()).collect()
    }

    #[tokio::test]
    #[traced_test]
    async fn falls_back_to_the_next_upstream() {
        let stub = StubLookup::default();
        let upstreams = urls(&["https://fail.example/dns-query", "https://ok.example/dns-query"]);
        let selector = UpstreamSelector::with_lookup(upstreams, None, LookupHolder::new(stub.clone()));

        let records = selector.resolve(&Query::new("example.com.", 1)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            stub.calls(),
            vec!["https://fail.example/dns-query", "https://ok.example/dns-query"]
        );
        assert!(logs_contain("https://fail.example/dns-query DoH query failed."));
    }

    #[tokio::test]
    async fn first_success_wins() {
        let stub = StubLookup::default();
        let upstreams = urls(&["https://one.example/dns-query", "https://two.example/dns-query"]);
        let selector = UpstreamSelector::with_lookup(upstreams, None, LookupHolder::new(stub.clone()));

        selector.resolve(&Query::new("example.com.", 1)).await.unwrap();
        selector.resolve(&Query::new("example.org.", 1)).await.unwrap();
        // Every query starts again with the first upstream.
        assert_eq!(
            stub.calls(),
            vec!["https://one.example/dns-query", "https://one.example/dns-query"]
        );
    }

    #[tokio::test]
    async fn all_upstreams_failed() {
        let stub = StubLookup::default();
        let upstreams = urls(&["https://fail1.example/dns-query", "https://fail2.example/dns-query"]);
        let selector = UpstreamSelector::with_lookup(upstreams, None, LookupHolder::new(stub.clone()));

        let result = selector.resolve(&Query::new("example.com.", 1)).await;
        match result {
            Err(ResolveError::AllUpstreamsFailed(query)) => assert_eq!(query, "example.com. A"),
            Ok(_) => panic!("Expected all upstreams to fail."),
        }
        assert_eq!(stub.calls().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_skipped() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);
        let stub = serve_stub().await.join("dns-query").unwrap();

        let upstreams = vec![format!("http://{closed}/dns-query").parse().unwrap(), stub];
        let selector = UpstreamSelector::new(upstreams, Some(Duration::from_secs(2)));
        let records = selector.resolve(&Query::new("example.com.", 1)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].owner().to_string().trim_end_matches('.'), "example.com");
    }

    #[tokio::test]
    async fn unreachable_upstream_alone_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let upstreams = urls(&[&format!("http://{closed}/dns-query")]);
        let selector = UpstreamSelector::new(upstreams, Some(Duration::from_secs(2)));
        let result = selector.resolve(&Query::new("example.com.", 1)).await;
        assert!(matches!(result, Err(ResolveError::AllUpstreamsFailed(_))));
    }
}
