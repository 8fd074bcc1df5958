// Rank API client.
//
// Four idempotent reads against the external game API, all paced through
// one shared limiter. 429 and 5xx responses retry with bounded exponential
// backoff; 404/400 map to a benign "not found" result instead of an error.
// The client holds no mutable state and is safe to clone per caller.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::metrics;
use crate::rank::RankEntry;
use crate::rate_limit::PacingLimiter;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MATCH_PAGE_SIZE: usize = 100;

const DEFAULT_REGIONAL_BASE: &str = "https://americas.api.riotgames.com";
const DEFAULT_PLATFORM_BASE: &str = "https://na1.api.riotgames.com";

#[derive(Debug, thiserror::Error)]
pub enum RiotError {
    #[error("rank api {endpoint} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        endpoint: &'static str,
        attempts: u32,
        last_error: String,
    },
    #[error("rank api {endpoint} returned unexpected status {status}")]
    UnexpectedStatus { endpoint: &'static str, status: u16 },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    puuid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueEntryDto {
    queue_type: String,
    // Absent for unranked queues in some responses.
    tier: Option<String>,
    rank: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchDto {
    info: MatchInfoDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchInfoDto {
    queue_id: i64,
    game_creation: i64,
}

/// The subset of match data eligibility counting needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDetail {
    pub queue_id: i64,
    /// Milliseconds since the Unix epoch.
    pub game_creation_ms: i64,
}

/// Rank API client. Cheap to clone; every clone shares the pacing limiter.
#[derive(Clone)]
pub struct RiotClient {
    http: reqwest::Client,
    api_key: String,
    regional_base: reqwest::Url,
    platform_base: reqwest::Url,
    limiter: PacingLimiter,
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

fn is_not_found_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 404)
}

impl RiotClient {
    pub fn new(api_key: String, limiter: PacingLimiter) -> Self {
        Self::with_base_urls(api_key, limiter, DEFAULT_REGIONAL_BASE, DEFAULT_PLATFORM_BASE)
    }

    /// Construct against alternate base URLs (tests point this at a local
    /// server).
    pub fn with_base_urls(
        api_key: String,
        limiter: PacingLimiter,
        regional_base: &str,
        platform_base: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            regional_base: reqwest::Url::parse(regional_base)
                .expect("invalid regional base URL"),
            platform_base: reqwest::Url::parse(platform_base)
                .expect("invalid platform base URL"),
            limiter,
        }
    }

    fn url(base: &reqwest::Url, segments: &[&str]) -> reqwest::Url {
        let mut url = base.clone();
        url.path_segments_mut()
            .expect("base URL cannot-be-a-base")
            .extend(segments);
        url
    }

    /// Resolve a riot id (`game_name#tag_line`) to a PUUID.
    /// Unknown riot ids return `Ok(None)`.
    pub async fn resolve_puuid(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> Result<Option<String>, RiotError> {
        let url = Self::url(
            &self.regional_base,
            &[
                "riot", "account", "v1", "accounts", "by-riot-id", game_name, tag_line,
            ],
        );
        let account: Option<AccountDto> = self.get_json("account-by-riot-id", url).await?;
        Ok(account.map(|a| a.puuid))
    }

    /// Current league entries for a player. Unranked or unknown players
    /// return an empty list.
    pub async fn get_rank_entries(&self, puuid: &str) -> Result<Vec<RankEntry>, RiotError> {
        let url = Self::url(
            &self.platform_base,
            &["lol", "league", "v4", "entries", "by-puuid", puuid],
        );
        let entries: Option<Vec<LeagueEntryDto>> =
            self.get_json("league-entries-by-puuid", url).await?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|e| RankEntry {
                queue_type: e.queue_type,
                tier: e.tier.unwrap_or_default(),
                division: e.rank.unwrap_or_default(),
            })
            .collect())
    }

    /// Match ids for a player, newest first, optionally bounded by epoch
    /// seconds and filtered to one queue. Pages through the full range.
    pub async fn list_match_ids(
        &self,
        puuid: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        queue: Option<i64>,
    ) -> Result<Vec<String>, RiotError> {
        let mut all = Vec::new();
        let mut start = 0usize;
        loop {
            let mut url = Self::url(
                &self.regional_base,
                &["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"],
            );
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("start", &start.to_string());
                query.append_pair("count", &MATCH_PAGE_SIZE.to_string());
                if let Some(t) = start_time {
                    query.append_pair("startTime", &t.to_string());
                }
                if let Some(t) = end_time {
                    query.append_pair("endTime", &t.to_string());
                }
                if let Some(q) = queue {
                    query.append_pair("queue", &q.to_string());
                }
            }
            let page: Vec<String> = self
                .get_json("match-ids-by-puuid", url)
                .await?
                .unwrap_or_default();
            let page_len = page.len();
            all.extend(page);
            if page_len < MATCH_PAGE_SIZE {
                return Ok(all);
            }
            start += MATCH_PAGE_SIZE;
        }
    }

    /// Creation time and queue for one match. Unknown ids return `Ok(None)`.
    pub async fn get_match_detail(
        &self,
        match_id: &str,
    ) -> Result<Option<MatchDetail>, RiotError> {
        let url = Self::url(
            &self.regional_base,
            &["lol", "match", "v5", "matches", match_id],
        );
        let detail: Option<MatchDto> = self.get_json("match-by-id", url).await?;
        Ok(detail.map(|d| MatchDetail {
            queue_id: d.info.queue_id,
            game_creation_ms: d.info.game_creation,
        }))
    }

    /// One paced GET with bounded retry. `Ok(None)` means the entity does
    /// not exist; retryable failures are retried up to `MAX_ATTEMPTS` with
    /// the backoff delay doubling per attempt.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: reqwest::Url,
    ) -> Result<Option<T>, RiotError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            attempt += 1;

            let result = self
                .http
                .get(url.clone())
                .header("X-Riot-Token", &self.api_key)
                .send()
                .await;

            let retry_reason = match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        metrics::RIOT_REQUESTS_TOTAL
                            .with_label_values(&[endpoint, "ok"])
                            .inc();
                        return resp
                            .json::<T>()
                            .await
                            .map(Some)
                            .map_err(|source| RiotError::Decode { endpoint, source });
                    }
                    if is_not_found_status(status) {
                        metrics::RIOT_REQUESTS_TOTAL
                            .with_label_values(&[endpoint, "not_found"])
                            .inc();
                        tracing::warn!(endpoint, status = status.as_u16(), %url, "rank api entity not found");
                        return Ok(None);
                    }
                    if !is_retryable_status(status) {
                        metrics::RIOT_REQUESTS_TOTAL
                            .with_label_values(&[endpoint, "error"])
                            .inc();
                        return Err(RiotError::UnexpectedStatus {
                            endpoint,
                            status: status.as_u16(),
                        });
                    }
                    format!("status {}", status.as_u16())
                }
                // Timeouts and connection failures are transient.
                Err(e) => e.to_string(),
            };

            if attempt >= MAX_ATTEMPTS {
                metrics::RIOT_REQUESTS_TOTAL
                    .with_label_values(&[endpoint, "exhausted"])
                    .inc();
                return Err(RiotError::RetriesExhausted {
                    endpoint,
                    attempts: attempt,
                    last_error: retry_reason,
                });
            }

            let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
            metrics::RIOT_RETRIES_TOTAL.with_label_values(&[endpoint]).inc();
            tracing::warn!(
                endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "rank api request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::RANKED_SOLO_QUEUE;

    #[test]
    fn test_retryable_status_classification() {
        use reqwest::StatusCode;
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));

        assert!(is_not_found_status(StatusCode::NOT_FOUND));
        assert!(is_not_found_status(StatusCode::BAD_REQUEST));
        assert!(!is_not_found_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_league_entry_decoding() {
        let body = r#"[
            {"queueType": "RANKED_SOLO_5x5", "tier": "GOLD", "rank": "II"},
            {"queueType": "RANKED_FLEX_SR", "tier": "SILVER", "rank": "I"}
        ]"#;
        let entries: Vec<LeagueEntryDto> = serde_json::from_str(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].queue_type, RANKED_SOLO_QUEUE);
        assert_eq!(entries[0].tier.as_deref(), Some("GOLD"));
        assert_eq!(entries[0].rank.as_deref(), Some("II"));
    }

    #[test]
    fn test_match_decoding() {
        let body = r#"{"info": {"queueId": 420, "gameCreation": 1700000000000, "gameDuration": 1800}}"#;
        let detail: MatchDto = serde_json::from_str(body).unwrap();
        assert_eq!(detail.info.queue_id, 420);
        assert_eq!(detail.info.game_creation, 1_700_000_000_000);
    }

    #[test]
    fn test_url_encodes_riot_id_segments() {
        let base = reqwest::Url::parse("https://example.com").unwrap();
        let url = RiotClient::url(
            &base,
            &["riot", "account", "v1", "accounts", "by-riot-id", "Big Tonka T", "NA1"],
        );
        assert_eq!(
            url.as_str(),
            "https://example.com/riot/account/v1/accounts/by-riot-id/Big%20Tonka%20T/NA1"
        );
    }

    // ── Against a local HTTP server ──────────────────────────────────

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn test_client(base: &str) -> RiotClient {
        RiotClient::with_base_urls(
            "test-key".into(),
            PacingLimiter::per_second(100),
            base,
            base,
        )
    }

    #[tokio::test]
    async fn test_resolve_puuid_ok() {
        use axum::routing::get;
        let router = axum::Router::new().route(
            "/riot/account/v1/accounts/by-riot-id/{game}/{tag}",
            get(|| async { axum::Json(serde_json::json!({"puuid": "abc-123"})) }),
        );
        let base = serve(router).await;
        let client = test_client(&base);

        let puuid = client.resolve_puuid("Sneaky", "NA1").await.unwrap();
        assert_eq!(puuid.as_deref(), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_none() {
        use axum::routing::get;
        let router = axum::Router::new().route(
            "/riot/account/v1/accounts/by-riot-id/{game}/{tag}",
            get(|| async { axum::http::StatusCode::NOT_FOUND }),
        );
        let base = serve(router).await;
        let client = test_client(&base);

        let puuid = client.resolve_puuid("Nobody", "NA1").await.unwrap();
        assert_eq!(puuid, None);
    }

    #[tokio::test]
    async fn test_retries_transient_failures_then_succeeds() {
        use axum::routing::get;
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicU32::new(0));
        let hits_handler = hits.clone();
        let router = axum::Router::new().route(
            "/lol/league/v4/entries/by-puuid/{puuid}",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        // First request is rate limited, second succeeds.
                        Err(axum::http::StatusCode::TOO_MANY_REQUESTS)
                    } else {
                        Ok(axum::Json(serde_json::json!([
                            {"queueType": "RANKED_SOLO_5x5", "tier": "GOLD", "rank": "II"}
                        ])))
                    }
                }
            }),
        );
        let base = serve(router).await;
        let client = test_client(&base);

        let entries = client.get_rank_entries("abc").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tier, "GOLD");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_error() {
        use axum::routing::get;
        let router = axum::Router::new().route(
            "/lol/league/v4/entries/by-puuid/{puuid}",
            get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = serve(router).await;
        let client = test_client(&base);

        let err = client.get_rank_entries("abc").await.unwrap_err();
        match err {
            RiotError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
