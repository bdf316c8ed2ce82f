use async_trait::async_trait;
use dyn_clone::DynClone;
use reqwest::{header, Url};
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};

use super::{
    master_file::{answer_to_record, DohRecord, RecordParseError},
    record_type::{code_to_mnemonic, RecordType, UnsupportedType},
};

/// Media type of the DoH json api.
pub const DNS_JSON: &str = "application/dns-json";

/// Everything that can go wrong with a single upstream call.
#[derive(thiserror::Error, Debug)]
pub enum DohError {
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedType),

    #[error("Network error. {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode the json answer. {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream rejected the query with status {0}.")]
    UpstreamRejected(u32),

    #[error(transparent)]
    RecordParse(#[from] RecordParseError),
}

/// A question as echoed by the upstream.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DohQuestion {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: u16,
}

/// One answer record in the json envelope.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DohAnswer {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: u16,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    pub data: String,
}

/**
 * Json envelope returned by a DoH server.
 * https://developers.google.com/speed/public-dns/docs/doh/json
 */
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DohResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "TC")]
    pub truncated: bool,
    #[serde(rename = "RD")]
    pub recursion_desired: bool,
    #[serde(rename = "RA")]
    pub recursion_available: bool,
    #[serde(rename = "AD")]
    pub authenticated_data: bool,
    #[serde(rename = "CD")]
    pub checking_disabled: bool,
    #[serde(rename = "Question")]
    pub question: Vec<DohQuestion>,
    #[serde(rename = "Answer")]
    pub answer: Vec<DohAnswer>,
}

impl DohResponse {
    /// Decodes the json body.
    pub fn from_slice(body: &[u8]) -> Result<Self, DohError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// If the upstream echoed a question other than the one asked. Case-insensitive.
    pub fn echoes_other_question(&self, query: &Query) -> bool {
        self.question.iter().any(|question| {
            question.rtype != query.rtype
                || !question.name.trim_end_matches('.').eq_ignore_ascii_case(query.name.trim_end_matches('.'))
        })
    }

    /**
     * Converts the answers into resource records, keeping the upstream order.
     * A non-zero status or any answer that can't be converted fails the whole response.
     */
    pub fn into_records(self) -> Result<Vec<DohRecord>, DohError> {
        if self.status != 0 {
            return Err(DohError::UpstreamRejected(self.status));
        }

        let mut records = Vec::with_capacity(self.answer.len());
        for answer in self.answer.iter() {
            let rtype = RecordType::try_from(answer.rtype)?;
            let record = answer_to_record(&answer.name, answer.ttl, rtype, &answer.data)?;
            records.push(record);
        }
        Ok(records)
    }
}

/// A question to send to an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Fully qualified domain name.
    pub name: String,
    /// Numeric record type.
    pub rtype: u16,
}

impl Query {
    pub fn new(name: impl Into<String>, rtype: u16) -> Self {
        let mut name: String = name.into();
        if !name.ends_with('.') {
            name.push('.');
        }
        Self { name, rtype }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match code_to_mnemonic(self.rtype) {
            Ok(mnemonic) => write!(f, "{} {}", self.name, mnemonic),
            Err(_) => write!(f, "{} TYPE{}", self.name, self.rtype),
        }
    }
}

/**
 * Looks up a query at one DoH upstream.
 * Important: Implementations must be clonable so every query task can own one.
 */
#[async_trait]
pub trait DohLookup: DynClone + Send + Sync {
    async fn lookup(&self, upstream: &Url, query: &Query, timeout: Option<Duration>) -> Result<Vec<DohRecord>, DohError>;
}

/**
 * Clonable lookup holder
 */
pub struct LookupHolder {
    pub func: Box<dyn DohLookup>,
}

impl Clone for LookupHolder {
    fn clone(&self) -> Self {
        Self {
            func: dyn_clone::clone_box(&*self.func),
        }
    }
}

impl Debug for LookupHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupHolder").field("func", &"LookupHolder").finish()
    }
}

impl LookupHolder {
    pub fn new(f: impl DohLookup + 'static) -> Self {
        LookupHolder { func: Box::new(f) }
    }

    pub async fn call(&self, upstream: &Url, query: &Query, timeout: Option<Duration>) -> Result<Vec<DohRecord>, DohError> {
        self.func.lookup(upstream, query, timeout).await
    }
}

/**
 * DoH json api client. Cheap to clone, all clones share one connection pool.
 */
#[derive(Debug, Clone, Default)]
pub struct DohClient {
    http: reqwest::Client,
}

impl DohClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the raw json body for a query.
    async fn fetch(
        &self,
        upstream: &Url,
        name: &str,
        rtype: RecordType,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, DohError> {
        let mut request = self
            .http
            .get(upstream.clone())
            .query(&[("name", name), ("type", rtype.mnemonic())])
            .header(header::ACCEPT, DNS_JSON);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DohLookup for DohClient {
    async fn lookup(&self, upstream: &Url, query: &Query, timeout: Option<Duration>) -> Result<Vec<DohRecord>, DohError> {
        let rtype = RecordType::try_from(query.rtype)?;
        let body = self.fetch(upstream, &query.name, rtype, timeout).await?;
        let response = DohResponse::from_slice(&body)?;
        tracing::trace!(
            "{upstream} answered {query} with {} records. status={} tc={} rd={} ra={} ad={} cd={}",
            response.answer.len(),
            response.status,
            response.truncated,
            response.recursion_desired,
            response.recursion_available,
            response.authenticated_data,
            response.checking_disabled
        );
        if response.echoes_other_question(query) {
            tracing::debug!("{upstream} echoed a different question than {query}.");
        }
        response.into_records()
    }
}
