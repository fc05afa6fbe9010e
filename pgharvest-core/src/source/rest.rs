//! PostgREST-style implementation of [`DataApi`].
//!
//! - Procedures: `POST {base}/{rest_path}/rpc/{name}` with an empty JSON object.
//! - Table pages: `GET {base}/{rest_path}/{table}?select=*&offset=N&limit=M`,
//!   with `&order=<key>.asc,...` when the table's primary key is known.
//!
//! Every request carries the key both as `apikey` and as a bearer token, and
//! selects the schema through `Accept-Profile`. The key is never logged.

use super::DataApi;
use crate::config::ApiConfig;
use crate::error::HarvestError;
use crate::models::{DEFAULT_SCHEMA, ExtractedRow, TableDescriptor, row_from_json};
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use url::Url;

const ACCEPT_PROFILE: &str = "Accept-Profile";
const CONTENT_PROFILE: &str = "Content-Profile";

/// HTTP client for the restricted data API.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    rest_path: String,
    api_key: String,
    schema: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .field("rest_path", &self.rest_path)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Creates a client from validated API settings.
    ///
    /// # Errors
    /// Returns error if the settings are invalid or the HTTP client cannot
    /// be built
    pub fn new(config: &ApiConfig) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| HarvestError::configuration(format!("invalid API URL: {}", e)))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarvestError::connection_failed("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url,
            rest_path: config.rest_path.clone(),
            api_key: config.api_key.clone(),
            schema: DEFAULT_SCHEMA.to_string(),
        })
    }

    /// Sets the schema procedures are resolved in.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Builds `{base}/{rest_path}/{segments...}`, percent-encoding each segment.
    pub fn endpoint<I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| HarvestError::configuration("API URL cannot be a base URL"))?;
            path.pop_if_empty()
                .extend(self.rest_path.split('/').filter(|s| !s.is_empty()))
                .extend(segments);
        }
        Ok(url)
    }

    /// URL of one page of `table`, sorted by `order_by` when given.
    pub fn range_url(
        &self,
        table: &TableDescriptor,
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Url> {
        let mut url = self.endpoint([table.name.as_str()])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            if !order_by.is_empty() {
                let terms: Vec<String> = order_by.iter().map(|column| order_term(column)).collect();
                query.append_pair("order", &terms.join(","));
            }
            query
                .append_pair("offset", &offset.to_string())
                .append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn read_body(response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| HarvestError::connection_failed("Failed to read data API response", e))?;

        if !status.is_success() {
            return Err(HarvestError::api(
                status.as_u16(),
                error_message(&body, status.canonical_reason()),
            ));
        }

        Ok(body.to_vec())
    }
}

/// Extracts a readable message from an error response body.
///
/// PostgREST answers with `{"message": ..., "details": ..., "hint": ...}`;
/// anything else is passed through as text.
pub fn error_message(body: &[u8], fallback: Option<&str>) -> String {
    let parsed = serde_json::from_slice::<serde_json::Value>(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|value| value.get("message"))
        .and_then(serde_json::Value::as_str)
    {
        return message.to_string();
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        fallback.unwrap_or("no response body").to_string()
    } else {
        text.chars().take(500).collect()
    }
}

/// One ascending `order` term. Names outside `[A-Za-z_][A-Za-z0-9_]*` are
/// double-quoted, with `"` and `\` escaped by a backslash.
fn order_term(column: &str) -> String {
    let mut chars = column.chars();
    let simple = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        format!("{}.asc", column)
    } else {
        let escaped = column.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\".asc", escaped)
    }
}

/// Normalizes a procedure result to a sequence of rows.
pub fn procedure_rows(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[async_trait]
impl DataApi for RestClient {
    async fn call_procedure(&self, name: &str) -> Result<Vec<serde_json::Value>> {
        let url = self.endpoint(["rpc", name])?;
        tracing::debug!("Calling data API procedure {}", name);

        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_PROFILE, &self.schema)
            .header(ACCEPT_PROFILE, &self.schema)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| HarvestError::connection_failed("Data API procedure call failed", e))?;

        let body = Self::read_body(response).await?;
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| HarvestError::Serialization {
                context: format!("Invalid response from procedure {}", name),
                source: e,
            })?;

        Ok(procedure_rows(value))
    }

    async fn select_range(
        &self,
        table: &TableDescriptor,
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ExtractedRow>> {
        let url = self.range_url(table, order_by, offset, limit)?;

        let response = self
            .authorized(self.client.get(url))
            .header(ACCEPT_PROFILE, &table.schema)
            .send()
            .await
            .map_err(|e| HarvestError::connection_failed("Data API request failed", e))?;

        let body = Self::read_body(response).await?;
        let rows: Vec<IndexMap<String, serde_json::Value>> =
            serde_json::from_slice(&body).map_err(|e| HarvestError::Serialization {
                context: format!("Invalid rows returned for table {}", table.qualified()),
                source: e,
            })?;

        Ok(rows.into_iter().map(row_from_json).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> RestClient {
        RestClient::new(&ApiConfig::new(base_url, "test-key")).unwrap()
    }

    #[test]
    fn test_endpoint_joins_rest_path() {
        let client = client("https://abc.supabase.co");
        let url = client.endpoint(["rpc", "get_all_tables"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/rest/v1/rpc/get_all_tables"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("http://localhost:54321/project/");
        let url = client.endpoint(["users"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/project/rest/v1/users");
    }

    #[test]
    fn test_range_url_encodes_table_name() {
        let client = client("https://abc.supabase.co");
        let table = TableDescriptor::new("odd/name?x");
        let url = client.range_url(&table, &[], 2000, 1000).unwrap();

        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/rest/v1/odd%2Fname%3Fx?select=*&offset=2000&limit=1000"
        );
    }

    #[test]
    fn test_range_url_orders_by_key_columns() {
        let client = client("https://abc.supabase.co");
        let order_by = vec!["tenant_id".to_string(), "id".to_string()];
        let url = client
            .range_url(&TableDescriptor::new("users"), &order_by, 0, 1000)
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/rest/v1/users?select=*&order=tenant_id.asc%2Cid.asc&offset=0&limit=1000"
        );
    }

    #[test]
    fn test_order_term_quotes_unusual_names() {
        assert_eq!(order_term("id"), "id.asc");
        assert_eq!(order_term("_Key2"), "_Key2.asc");
        assert_eq!(order_term("Order Id"), r#""Order Id".asc"#);
        assert_eq!(order_term(r#"a"b"#), r#""a\"b".asc"#);
        assert_eq!(order_term("2nd"), r#""2nd".asc"#);
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", client("https://abc.supabase.co"));
        assert!(!debug.contains("test-key"));
    }

    #[test]
    fn test_error_message_prefers_postgrest_message() {
        let body = br#"{"code":"42P01","message":"relation \"public.x\" does not exist"}"#;
        assert_eq!(
            error_message(body, Some("Not Found")),
            "relation \"public.x\" does not exist"
        );
        assert_eq!(error_message(b"upstream timeout", None), "upstream timeout");
        assert_eq!(error_message(b"", Some("Bad Gateway")), "Bad Gateway");
    }

    #[test]
    fn test_procedure_rows_normalization() {
        assert_eq!(
            procedure_rows(serde_json::json!(["a", "b"])),
            vec![serde_json::json!("a"), serde_json::json!("b")]
        );
        assert!(procedure_rows(serde_json::Value::Null).is_empty());
        assert_eq!(
            procedure_rows(serde_json::json!({"table_name": "a"})).len(),
            1
        );
    }
}
