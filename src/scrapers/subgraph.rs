//! GraphQL subgraph client
//!
//! Posts one query per page and hands back the raw trade objects of the
//! configured collection. Every request is bounded by a timeout.

use super::feed::{FetchError, PageQuery, RawTrade, TradeFeed};
use super::schema::{FeedSchema, SchemaVersion};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Root fields worth reporting when probing an unfamiliar endpoint
pub const CANDIDATE_COLLECTIONS: &[&str] = &[
    "fpmmTrades",
    "fills",
    "globalDeals",
    "trades",
    "transactions",
    "activities",
    "actions",
];

const INTROSPECTION_QUERY: &str = "{ __schema { queryType { fields { name } } } }";
const MAX_ERROR_BODY: usize = 512;

pub struct SubgraphClient {
    client: Client,
    endpoint: String,
    schema: Box<dyn FeedSchema>,
    request_timeout: Duration,
}

impl SubgraphClient {
    pub fn new(
        endpoint: impl Into<String>,
        schema: Box<dyn FeedSchema>,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("WhaleWatch/1.0")
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            schema,
            request_timeout,
        })
    }

    pub fn schema(&self) -> &dyn FeedSchema {
        self.schema.as_ref()
    }

    /// Names of every root query field the endpoint exposes
    pub async fn root_fields(&self) -> Result<Vec<String>, FetchError> {
        let data = self.post(INTROSPECTION_QUERY).await?;
        let fields = data
            .pointer("/__schema/queryType/fields")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Decode("introspection response has no queryType.fields".into()))?;

        Ok(fields
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str))
            .filter(|name| !name.starts_with("__"))
            .map(str::to_string)
            .collect())
    }

    /// POST a GraphQL document and return its `data` object
    async fn post(&self, query: &str) -> Result<Value, FetchError> {
        #[derive(Serialize)]
        struct GraphQlRequest<'a> {
            query: &'a str,
        }

        let request = self
            .client
            .post(&self.endpoint)
            .json(&GraphQlRequest { query })
            .send();

        // Client timeout covers the connection; this bounds the whole exchange
        let response = match timeout(self.request_timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => return Err(FetchError::Timeout(self.request_timeout)),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(FetchError::Timeout(self.request_timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY);
            return Err(FetchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: Value = match timeout(self.request_timeout, response.json()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) if e.is_timeout() => return Err(FetchError::Timeout(self.request_timeout)),
            Ok(Err(e)) => return Err(FetchError::Decode(e.to_string())),
            Err(_) => return Err(FetchError::Timeout(self.request_timeout)),
        };

        extract_data(body)
    }
}

/// What an endpoint exposes, relative to the adapters this crate ships
#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseReport {
    pub endpoint: String,
    pub root_fields: usize,
    pub adapters: Vec<AdapterCheck>,
    /// Candidate trade collections present on the endpoint
    pub candidates: Vec<String>,
    /// First adapter whose collection is available
    pub recommended: Option<SchemaVersion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterCheck {
    pub schema: SchemaVersion,
    pub collection: &'static str,
    pub available: bool,
}

impl DiagnoseReport {
    pub fn from_fields(endpoint: impl Into<String>, fields: &[String]) -> Self {
        let has = |name: &str| fields.iter().any(|f| f == name);

        let adapters: Vec<AdapterCheck> = SchemaVersion::all()
            .into_iter()
            .map(|schema| {
                let collection = schema.adapter().collection();
                AdapterCheck {
                    schema,
                    collection,
                    available: has(collection),
                }
            })
            .collect();

        let recommended = adapters.iter().find(|a| a.available).map(|a| a.schema);
        let candidates = CANDIDATE_COLLECTIONS
            .iter()
            .filter(|c| has(c))
            .map(|c| c.to_string())
            .collect();

        Self {
            endpoint: endpoint.into(),
            root_fields: fields.len(),
            adapters,
            candidates,
            recommended,
        }
    }
}

impl SubgraphClient {
    /// Introspect the endpoint and report which trade collections it serves
    pub async fn diagnose(&self) -> Result<DiagnoseReport, FetchError> {
        let fields = self.root_fields().await?;
        debug!("Endpoint exposes {} root fields", fields.len());
        Ok(DiagnoseReport::from_fields(self.endpoint.clone(), &fields))
    }
}

/// Split a GraphQL envelope into its `data` payload or an error
fn extract_data(mut body: Value) -> Result<Value, FetchError> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(FetchError::GraphQl(if messages.is_empty() {
                Value::Array(errors.clone()).to_string()
            } else {
                messages.join("; ")
            }));
        }
    }

    match body.get_mut("data").map(Value::take) {
        Some(Value::Null) | None => Err(FetchError::Decode("response has no data".into())),
        Some(data) => Ok(data),
    }
}

/// Pull the trade array for `collection` out of a `data` payload
fn extract_collection(mut data: Value, collection: &str) -> Result<Vec<RawTrade>, FetchError> {
    let items = match data.get_mut(collection).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(FetchError::Decode(format!(
                "'{}' is not a list: {}",
                collection, other
            )))
        }
        None => {
            return Err(FetchError::Decode(format!(
                "response has no '{}' collection",
                collection
            )))
        }
    };

    // Non-object entries are left for the normalizer to reject individually
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => map,
            other => {
                let mut wrapped = RawTrade::new();
                wrapped.insert("__invalid".into(), other);
                wrapped
            }
        })
        .collect())
}

#[async_trait]
impl TradeFeed for SubgraphClient {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawTrade>, FetchError> {
        let document = self.schema.build_query(query);
        debug!(
            schema = %self.schema.version(),
            after = query.after,
            before = ?query.before,
            first = query.page_size,
            "Fetching trade page"
        );

        let data = self.post(&document).await?;
        extract_collection(data, self.schema.collection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graphql_errors_are_fetch_errors() {
        let err = extract_data(json!({
            "errors": [{ "message": "Type `Query` has no field `fills`" }]
        }))
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::GraphQl("Type `Query` has no field `fills`".into())
        );
    }

    #[test]
    fn test_extract_collection() {
        let data = extract_data(json!({
            "data": { "fills": [{ "id": "a" }, { "id": "b" }, 7] }
        }))
        .unwrap();
        let trades = extract_collection(data, "fills").unwrap();
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0]["id"], "a");
        assert!(trades[2].contains_key("__invalid"));
    }

    #[test]
    fn test_missing_collection_is_decode_error() {
        let data = extract_data(json!({ "data": { "fpmmTrades": [] } })).unwrap();
        assert!(matches!(
            extract_collection(data, "fills"),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(extract_data(json!({ "data": null })), Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 on loopback: connection refused, no network needed
        let client = SubgraphClient::new(
            "http://127.0.0.1:9/graphql",
            SchemaVersion::Fill.adapter(),
            Duration::from_secs(2),
        )
        .unwrap();

        let result = client
            .fetch_page(&PageQuery {
                after: 0,
                before: None,
                min_usd: rust_decimal::Decimal::ZERO,
                page_size: 10,
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Transport(_)) | Err(FetchError::Timeout(_))
        ));
    }

    #[test]
    fn test_diagnose_report_prefers_first_available_adapter() {
        let fields: Vec<String> = ["fills", "trades", "markets", "_meta"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = DiagnoseReport::from_fields("http://example.test", &fields);

        assert_eq!(report.root_fields, 4);
        assert_eq!(report.recommended, Some(SchemaVersion::Fill));
        assert_eq!(report.candidates, vec!["fills", "trades"]);
        let deal = report.adapters.iter().find(|a| a.schema == SchemaVersion::Deal).unwrap();
        assert_eq!(deal.collection, "fpmmTrades");
        assert!(!deal.available);
    }

    #[test]
    fn test_diagnose_report_with_nothing_known() {
        let report = DiagnoseReport::from_fields("http://example.test", &["markets".to_string()]);
        assert_eq!(report.recommended, None);
        assert!(report.candidates.is_empty());
    }
}
