//! Supabase (PostgREST) implementation of the listing backend.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{ChangeFeed, ListingBackend, ListingFilter};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::models::{CountScope, Listing, ListingId};
use crate::util::compact_text;

const SELLER_COLUMNS: &str = "id,username,avatar_url";

type QueryParams = Vec<(&'static str, String)>;

/// Listing reads over the PostgREST API of a Supabase project.
#[derive(Clone)]
pub struct SupabaseListingClient {
    rest_url: String,
    config: BackendConfig,
    client: Client,
}

impl SupabaseListingClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        if config.supabase_anon_key.trim().is_empty() {
            return Err(Error::Config(
                "Supabase anon key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            rest_url: config.rest_url(),
            config,
            client: Client::builder().build()?,
        })
    }

    fn table_url(&self, relation: &str) -> String {
        format!("{}/{relation}", self.rest_url)
    }

    /// Embedded seller join; the FK hint keeps PostgREST from guessing.
    fn enriched_select(&self) -> String {
        format!(
            "*,seller:{}!seller_id({SELLER_COLUMNS})",
            self.config.seller_table
        )
    }

    fn primary_query(&self, filter: &ListingFilter) -> QueryParams {
        let mut params = vec![("select", self.enriched_select())];
        params.extend(visibility_params());
        params.push(("order", "created_at.desc".to_string()));
        if let Some(category) = filter.category.as_deref() {
            // Case-insensitive, matching `ListingFilter::matches`
            params.push(("category", format!("ilike.{}", sanitize_pattern(category))));
        }
        if let Some(search) = filter.search.as_deref() {
            params.push(("title", format!("ilike.*{}*", sanitize_pattern(search))));
        }
        if let Some(limit) = filter.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }

    fn broad_query(&self) -> QueryParams {
        let mut params = vec![("select", self.enriched_select())];
        params.extend(visibility_params());
        params.push(("order", "created_at.desc".to_string()));
        params
    }

    fn by_id_query(&self, id: &ListingId) -> QueryParams {
        let mut params = vec![
            ("select", self.enriched_select()),
            ("id", format!("eq.{id}")),
        ];
        params.extend(visibility_params());
        params.push(("limit", "1".to_string()));
        params
    }

    fn count_request(&self, scope: CountScope) -> (String, QueryParams) {
        match scope {
            CountScope::Primary => {
                let mut params = vec![("select", "id".to_string())];
                params.extend(visibility_params());
                (self.table_url(&self.config.listings_table), params)
            }
            CountScope::Broad => {
                let mut params = vec![("select", "id".to_string())];
                params.extend(visibility_params());
                (self.table_url(&self.config.broad_view), params)
            }
            CountScope::Raw => (
                self.table_url(&self.config.listings_table),
                vec![("select", "id".to_string())],
            ),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.supabase_anon_key);
        request
            .header("apikey", &self.config.supabase_anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn get_rows(&self, url: &str, params: &QueryParams) -> Result<Vec<Listing>> {
        let response = self
            .authorized(self.client.get(url).query(params))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, &body));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ListingBackend for SupabaseListingClient {
    async fn fetch_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let url = self.table_url(&self.config.listings_table);
        self.get_rows(&url, &self.primary_query(filter)).await
    }

    async fn fetch_listings_broad(&self) -> Result<Vec<Listing>> {
        let url = self.table_url(&self.config.broad_view);
        self.get_rows(&url, &self.broad_query()).await
    }

    async fn fetch_listing_by_id(&self, id: &ListingId) -> Result<Listing> {
        let url = self.table_url(&self.config.listings_table);
        let rows = self.get_rows(&url, &self.by_id_query(id)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn subscribe_listing_changes(&self) -> Result<ChangeFeed> {
        // Realtime rides on a websocket channel; this client only speaks REST.
        Err(Error::RealtimeUnavailable(format!(
            "no realtime transport configured for {}",
            self.config.listings_table
        )))
    }

    async fn count_listings(&self, scope: CountScope) -> Result<u64> {
        let (url, params) = self.count_request(scope);
        let response = self
            .authorized(self.client.head(&url).query(&params))
            .header("Prefer", "count=exact")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(map_api_error(status, ""));
        }

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                Error::Api(format!(
                    "{} count response did not include a Content-Range total",
                    scope.label()
                ))
            })
    }
}

/// `is_deleted = false AND is_hidden = false AND (is_available = true OR is_available IS NULL)`
fn visibility_params() -> QueryParams {
    vec![
        ("is_deleted", "eq.false".to_string()),
        ("is_hidden", "eq.false".to_string()),
        ("or", "(is_available.eq.true,is_available.is.null)".to_string()),
    ]
}

/// Strip characters with meaning inside a PostgREST filter value.
fn sanitize_pattern(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !matches!(ch, '*' | ',' | '(' | ')' | '%'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse the total from `Content-Range: 0-24/311` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    code: Option<String>,
}

fn map_api_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    if status == StatusCode::NOT_FOUND || status == StatusCode::NOT_ACCEPTABLE {
        Error::NotFound(message)
    } else {
        Error::Api(message)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message {
            let mut rendered = message.trim().to_string();
            if let Some(code) = payload.code {
                rendered = format!("{rendered} [{code}]");
            }
            if let Some(detail) = payload.details.or(payload.hint) {
                rendered = format!("{rendered}: {}", compact_text(&detail));
            }
            return format!("{rendered} ({})", status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> SupabaseListingClient {
        SupabaseListingClient::new(BackendConfig {
            supabase_url: "https://demo.supabase.co".to_string(),
            supabase_anon_key: "anon".to_string(),
            access_token: None,
            listings_table: "products".to_string(),
            broad_view: "products_broad_view".to_string(),
            seller_table: "users".to_string(),
        })
        .unwrap()
    }

    fn param<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn primary_query_applies_visibility_filter_and_join() {
        let client = test_client();
        let params = client.primary_query(&ListingFilter::default());

        assert_eq!(
            param(&params, "select"),
            Some("*,seller:users!seller_id(id,username,avatar_url)")
        );
        assert_eq!(param(&params, "is_deleted"), Some("eq.false"));
        assert_eq!(param(&params, "is_hidden"), Some("eq.false"));
        assert_eq!(
            param(&params, "or"),
            Some("(is_available.eq.true,is_available.is.null)")
        );
        assert_eq!(param(&params, "order"), Some("created_at.desc"));
        assert_eq!(param(&params, "limit"), None);
    }

    #[test]
    fn primary_query_includes_filter_values() {
        let client = test_client();
        let params = client.primary_query(&ListingFilter {
            category: Some("Books".to_string()),
            search: Some("calc*(x)".to_string()),
            limit: Some(20),
        });

        assert_eq!(param(&params, "category"), Some("ilike.Books"));
        assert_eq!(param(&params, "title"), Some("ilike.*calcx*"));
        assert_eq!(param(&params, "limit"), Some("20"));
    }

    #[test]
    fn category_filter_ignores_case() {
        let client = test_client();
        let params = client.primary_query(&ListingFilter {
            category: Some("books".to_string()),
            ..ListingFilter::default()
        });

        assert_eq!(param(&params, "category"), Some("ilike.books"));
        let mut listing = Listing::new("p1", "Physics textbook");
        listing.category = Some("Books".to_string());
        assert!(ListingFilter {
            category: Some("books".to_string()),
            ..ListingFilter::default()
        }
        .matches(&listing));
    }

    #[test]
    fn broad_query_joins_seller_and_filters_visibility() {
        let client = test_client();
        let params = client.broad_query();

        assert_eq!(
            param(&params, "select"),
            Some("*,seller:users!seller_id(id,username,avatar_url)")
        );
        assert_eq!(param(&params, "is_deleted"), Some("eq.false"));
        assert_eq!(param(&params, "is_hidden"), Some("eq.false"));
        assert_eq!(param(&params, "order"), Some("created_at.desc"));
    }

    #[test]
    fn count_requests_target_expected_relations() {
        let client = test_client();

        let (url, params) = client.count_request(CountScope::Primary);
        assert_eq!(url, "https://demo.supabase.co/rest/v1/products");
        assert_eq!(param(&params, "is_hidden"), Some("eq.false"));

        let (url, params) = client.count_request(CountScope::Broad);
        assert_eq!(url, "https://demo.supabase.co/rest/v1/products_broad_view");
        assert_eq!(param(&params, "is_deleted"), Some("eq.false"));
        assert_eq!(param(&params, "is_hidden"), Some("eq.false"));
        assert_eq!(
            param(&params, "or"),
            Some("(is_available.eq.true,is_available.is.null)")
        );

        let (url, params) = client.count_request(CountScope::Raw);
        assert_eq!(url, "https://demo.supabase.co/rest/v1/products");
        assert_eq!(param(&params, "is_hidden"), None);
    }

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-24/311"), Some(311));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn api_errors_render_postgrest_body() {
        let body = r#"{"code":"42501","message":"permission denied for table products","details":null,"hint":null}"#;
        let rendered = parse_api_error(StatusCode::FORBIDDEN, body);
        assert_eq!(
            rendered,
            "permission denied for table products [42501] (403)"
        );

        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert!(matches!(
            map_api_error(StatusCode::NOT_ACCEPTABLE, ""),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn subscription_reports_missing_realtime_transport() {
        let client = test_client();
        let err = client.subscribe_listing_changes().await.unwrap_err();
        assert!(matches!(err, Error::RealtimeUnavailable(_)));
    }

    #[test]
    fn client_rejects_blank_anon_key() {
        let result = SupabaseListingClient::new(BackendConfig {
            supabase_url: "https://demo.supabase.co".to_string(),
            supabase_anon_key: "  ".to_string(),
            access_token: None,
            listings_table: "products".to_string(),
            broad_view: "products_broad_view".to_string(),
            seller_table: "users".to_string(),
        });
        assert!(result.is_err());
    }
}
