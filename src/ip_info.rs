// IP 地理信息解析：按顺序尝试多个查询策略，全部失败时降级为 Unknown 记录，从不向调用方报错。
use crate::config::GeoConfig;
use crate::error::SpeedtestError;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub isp: String,
}

impl ClientInfo {
    pub fn unknown(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            country: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            isp: UNKNOWN.to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.country == UNKNOWN && self.city == UNKNOWN && self.isp == UNKNOWN
    }
}

/// 单个策略的查询结果：完整信息，或只拿到了地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Complete(ClientInfo),
    AddressOnly(String),
}

/// 地理信息查询策略。`ip` 为空时查询本机（服务器）的公网信息。
#[async_trait]
pub trait GeoLookup: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, ip: Option<&str>) -> Result<Lookup, SpeedtestError>;
}

/// ipapi.co：返回国家、城市与运营商。
pub struct IpapiLookup {
    http: reqwest::Client,
    base_url: String,
}

impl IpapiLookup {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("构建 ipapi HTTP 客户端失败")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, ip: Option<&str>) -> String {
        match ip {
            Some(ip) => format!("{}/{ip}/json/", self.base_url),
            None => format!("{}/json/", self.base_url),
        }
    }
}

#[async_trait]
impl GeoLookup for IpapiLookup {
    fn name(&self) -> &str {
        "ipapi"
    }

    async fn lookup(&self, ip: Option<&str>) -> Result<Lookup, SpeedtestError> {
        let response = self
            .http
            .get(self.endpoint(ip))
            .send()
            .await
            .map_err(|err| SpeedtestError::ResolverDegraded(format!("ipapi request: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeedtestError::ResolverDegraded(format!(
                "ipapi status {status}"
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SpeedtestError::ResolverDegraded(format!("ipapi body: {err}")))?;
        parse_ipapi_payload(&payload, ip).map(Lookup::Complete)
    }
}

fn parse_ipapi_payload(payload: &Value, requested: Option<&str>) -> Result<ClientInfo, SpeedtestError> {
    // 限流时 ipapi 仍可能返回 200，并在 body 中带 error/reason。
    if payload.get("error").and_then(Value::as_bool).unwrap_or(false) {
        let reason = payload
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown reason");
        return Err(SpeedtestError::ResolverDegraded(format!("ipapi error: {reason}")));
    }
    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let ip = field("ip")
        .or_else(|| requested.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());
    Ok(ClientInfo {
        ip,
        country: field("country_name").unwrap_or_else(|| UNKNOWN.to_string()),
        city: field("city").unwrap_or_else(|| UNKNOWN.to_string()),
        isp: field("org").unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

/// ipinfo.io：只用来补全服务器自身的公网地址。
pub struct IpinfoAddressLookup {
    http: reqwest::Client,
    url: String,
}

impl IpinfoAddressLookup {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("构建 ipinfo HTTP 客户端失败")?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl GeoLookup for IpinfoAddressLookup {
    fn name(&self) -> &str {
        "ipinfo"
    }

    async fn lookup(&self, ip: Option<&str>) -> Result<Lookup, SpeedtestError> {
        if let Some(ip) = ip {
            return Ok(Lookup::AddressOnly(ip.to_string()));
        }
        let payload: Value = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SpeedtestError::ResolverDegraded(format!("ipinfo request: {err}")))?
            .json()
            .await
            .map_err(|err| SpeedtestError::ResolverDegraded(format!("ipinfo body: {err}")))?;
        payload
            .get("ip")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Lookup::AddressOnly(value.to_string()))
            .ok_or_else(|| SpeedtestError::ResolverDegraded("ipinfo body has no ip".to_string()))
    }
}

struct CachedInfo {
    info: ClientInfo,
    fetched_at: Instant,
}

/// 带有序降级链的解析器。
pub struct ClientInfoResolver {
    strategies: Vec<Arc<dyn GeoLookup>>,
    self_cache_ttl: Duration,
    self_cache: Mutex<Option<CachedInfo>>,
}

impl ClientInfoResolver {
    pub fn new(strategies: Vec<Arc<dyn GeoLookup>>, self_cache_ttl: Duration) -> Self {
        Self {
            strategies,
            self_cache_ttl,
            self_cache: Mutex::new(None),
        }
    }

    /// 不做任何外部查询，所有结果都是 Unknown。
    pub fn offline() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    pub fn from_config(config: &GeoConfig) -> anyhow::Result<Self> {
        if !config.enabled {
            return Ok(Self::offline());
        }
        let primary = IpapiLookup::new(&config.primary_url, Duration::from_secs(config.timeout_s))?;
        let fallback = IpinfoAddressLookup::new(
            &config.fallback_url,
            Duration::from_secs(config.fallback_timeout_s),
        )?;
        Ok(Self::new(
            vec![
                Arc::new(primary) as Arc<dyn GeoLookup>,
                Arc::new(fallback) as Arc<dyn GeoLookup>,
            ],
            Duration::from_secs(config.self_cache_s),
        ))
    }

    /// 查询指定地址（或服务器自身）的信息，结构总是完整的。
    pub async fn resolve(&self, ip: Option<&str>) -> ClientInfo {
        let ip = ip.map(str::trim).filter(|value| !value.is_empty());
        for strategy in &self.strategies {
            match strategy.lookup(ip).await {
                Ok(Lookup::Complete(info)) => return info,
                Ok(Lookup::AddressOnly(address)) => {
                    debug!(strategy = strategy.name(), "geolocation resolved address only");
                    return ClientInfo::unknown(address);
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), ip = ?ip, "{err}");
                }
            }
        }
        ClientInfo::unknown(ip.unwrap_or(UNKNOWN))
    }

    /// 服务器自身的公网信息；成功结果在 TTL 内复用，降级结果不缓存。
    pub async fn resolve_self(&self) -> ClientInfo {
        if let Some(info) = self.cached_self() {
            return info;
        }
        let info = self.resolve(None).await;
        if !info.is_degraded() && !self.self_cache_ttl.is_zero() {
            *self.self_cache.lock() = Some(CachedInfo {
                info: info.clone(),
                fetched_at: Instant::now(),
            });
        }
        info
    }

    pub async fn public_address(&self) -> String {
        self.resolve_self().await.ip
    }

    fn cached_self(&self) -> Option<ClientInfo> {
        let guard = self.self_cache.lock();
        guard
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.self_cache_ttl)
            .map(|cached| cached.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLookup {
        name: &'static str,
        outcome: Option<Lookup>,
        calls: AtomicUsize,
    }

    impl StubLookup {
        fn new(name: &'static str, outcome: Option<Lookup>) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GeoLookup for StubLookup {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, _ip: Option<&str>) -> Result<Lookup, SpeedtestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .clone()
                .ok_or_else(|| SpeedtestError::ResolverDegraded("rate limited".to_string()))
        }
    }

    fn chain(items: &[&Arc<StubLookup>]) -> Vec<Arc<dyn GeoLookup>> {
        items
            .iter()
            .map(|item| Arc::clone(item) as Arc<dyn GeoLookup>)
            .collect()
    }

    fn full(ip: &str) -> ClientInfo {
        ClientInfo {
            ip: ip.to_string(),
            country: "Japan".to_string(),
            city: "Tokyo".to_string(),
            isp: "Example Net".to_string(),
        }
    }

    #[tokio::test]
    async fn primary_success_wins() {
        let primary = StubLookup::new("primary", Some(Lookup::Complete(full("203.0.113.5"))));
        let secondary = StubLookup::new("secondary", Some(Lookup::AddressOnly("x".into())));
        let resolver = ClientInfoResolver::new(chain(&[&primary, &secondary]), Duration::ZERO);
        assert_eq!(resolver.resolve(Some("203.0.113.5")).await, full("203.0.113.5"));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn secondary_supplies_address_when_primary_fails() {
        let primary = StubLookup::new("primary", None);
        let secondary =
            StubLookup::new("secondary", Some(Lookup::AddressOnly("198.51.100.77".into())));
        let resolver = ClientInfoResolver::new(chain(&[&primary, &secondary]), Duration::ZERO);
        let info = resolver.resolve(None).await;
        assert_eq!(info, ClientInfo::unknown("198.51.100.77"));
        assert!(info.is_degraded());
    }

    #[tokio::test]
    async fn all_failures_degrade_to_unknown_with_known_address() {
        let first = StubLookup::new("a", None);
        let second = StubLookup::new("b", None);
        let resolver = ClientInfoResolver::new(chain(&[&first, &second]), Duration::ZERO);
        assert_eq!(
            resolver.resolve(Some(" 192.0.2.44 ")).await,
            ClientInfo::unknown("192.0.2.44")
        );
        assert_eq!(resolver.resolve(None).await, ClientInfo::unknown(UNKNOWN));
    }

    #[tokio::test]
    async fn offline_resolver_never_queries() {
        let resolver = ClientInfoResolver::offline();
        assert_eq!(resolver.public_address().await, UNKNOWN);
    }

    #[tokio::test]
    async fn self_lookup_is_cached_only_when_complete() {
        let primary = StubLookup::new("primary", Some(Lookup::Complete(full("203.0.113.1"))));
        let resolver = ClientInfoResolver::new(chain(&[&primary]), Duration::from_secs(60));
        resolver.resolve_self().await;
        resolver.resolve_self().await;
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);

        let failing = StubLookup::new("primary", None);
        let resolver = ClientInfoResolver::new(chain(&[&failing]), Duration::from_secs(60));
        resolver.resolve_self().await;
        resolver.resolve_self().await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ipapi_payload_maps_fields() {
        let payload = json!({
            "ip": "203.0.113.8",
            "country_name": "Germany",
            "city": "Berlin",
            "org": "AS64500 Example"
        });
        let info = parse_ipapi_payload(&payload, None).unwrap();
        assert_eq!(info.country, "Germany");
        assert_eq!(info.isp, "AS64500 Example");

        let partial = parse_ipapi_payload(&json!({ "city": "" }), Some("192.0.2.9")).unwrap();
        assert_eq!(partial.ip, "192.0.2.9");
        assert_eq!(partial.city, UNKNOWN);
    }

    #[test]
    fn ipapi_rate_limit_body_is_degraded() {
        let payload = json!({ "error": true, "reason": "RateLimited" });
        let err = parse_ipapi_payload(&payload, None).unwrap_err();
        assert!(matches!(err, SpeedtestError::ResolverDegraded(reason) if reason.contains("RateLimited")));
    }

    #[tokio::test]
    async fn ipinfo_passes_known_address_through() {
        let lookup =
            IpinfoAddressLookup::new("http://127.0.0.1:9/json", Duration::from_millis(50)).unwrap();
        assert_eq!(
            lookup.lookup(Some("192.0.2.3")).await.unwrap(),
            Lookup::AddressOnly("192.0.2.3".to_string())
        );
    }
}
