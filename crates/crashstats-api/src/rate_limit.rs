//! Per-caller request windows over the shared store
use crashstats_core::{Caller, SharedStore};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A rate such as `100/m`: `count` requests per `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    pub count: u64,
    pub period: Duration,
}

impl RateSpec {
    pub fn new(count: u64, period: Duration) -> Self {
        Self { count, period }
    }

    pub fn per_minute(count: u64) -> Self {
        Self::new(count, Duration::from_secs(60))
    }

    /// Requests allowed per second, for comparing rates of different periods
    fn per_second(&self) -> f64 {
        self.count as f64 / self.period.as_secs_f64()
    }
}

impl FromStr for RateSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected <count>/<s|m|h|d>, got {s:?}"))?;
        let count = count
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid request count in {s:?}"))?;
        let seconds = match unit.trim() {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86_400,
            other => return Err(format!("unknown period {other:?}")),
        };
        Ok(Self::new(count, Duration::from_secs(seconds)))
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.period.as_secs() {
            1 => "s",
            60 => "m",
            3600 => "h",
            86_400 => "d",
            secs => return write!(f, "{}/{}s", self.count, secs),
        };
        write!(f, "{}/{}", self.count, unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u64, limit: u64 },
    /// Valid-token caller, not counted
    Exempt,
    Limited,
}

impl RateDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateDecision::Limited)
    }
}

/// Fixed-window limiter.
///
/// Counters live in the injected [`SharedStore`] so every gateway instance
/// sees the same count. A failing store lets the request through.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    anonymous: RateSpec,
    authenticated: RateSpec,
    exempt_tokens: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, anonymous: RateSpec, authenticated: RateSpec) -> Self {
        Self {
            store,
            anonymous,
            authenticated,
            exempt_tokens: false,
        }
    }

    pub fn exempt_tokens(mut self, exempt: bool) -> Self {
        self.exempt_tokens = exempt;
        self
    }

    /// Rate applied to `caller`
    pub fn rate_for(&self, caller: &Caller) -> RateSpec {
        if caller.is_authenticated() {
            self.authenticated
        } else {
            self.anonymous
        }
    }

    pub async fn check(&self, caller: &Caller) -> RateDecision {
        if self.exempt_tokens && caller.is_token() && caller.is_authenticated() {
            return RateDecision::Exempt;
        }

        let rate = self.rate_for(caller);
        let key = format!("ratelimit:{}:{}", caller.rate_key(), rate.period.as_secs());
        match self.store.incr_window(&key, rate.period).await {
            Ok(count) if count > rate.count => RateDecision::Limited,
            Ok(count) => RateDecision::Allowed {
                count,
                limit: rate.count,
            },
            Err(err) => {
                warn!(key = %key, error = %err, "Rate limit store unavailable, allowing request");
                RateDecision::Allowed {
                    count: 0,
                    limit: rate.count,
                }
            }
        }
    }
}

/// True when the authenticated rate is at least as generous as the anonymous one
pub fn authenticated_not_lower(anonymous: &RateSpec, authenticated: &RateSpec) -> bool {
    authenticated.per_second() >= anonymous.per_second()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashstats_core::{InMemoryStore, StoreError, TokenGrant, UserAccount};
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn limiter(anonymous: u64, authenticated: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryStore::new(1024)),
            RateSpec::per_minute(anonymous),
            RateSpec::per_minute(authenticated),
        )
    }

    fn token_caller(id: u64, user: UserAccount) -> Caller {
        Caller::Token {
            grant: TokenGrant {
                id,
                user,
                permissions: Default::default(),
                expires_at: None,
                notes: String::new(),
            },
            ip: ip(1),
        }
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!("3/m".parse::<RateSpec>().unwrap(), RateSpec::per_minute(3));
        assert_eq!(
            "10/h".parse::<RateSpec>().unwrap(),
            RateSpec::new(10, Duration::from_secs(3600))
        );
        assert!("10".parse::<RateSpec>().is_err());
        assert!("x/m".parse::<RateSpec>().is_err());
        assert!("10/w".parse::<RateSpec>().is_err());
        assert_eq!(RateSpec::per_minute(100).to_string(), "100/m");
    }

    #[test]
    fn test_authenticated_comparison() {
        let anonymous = RateSpec::per_minute(100);
        assert!(authenticated_not_lower(&anonymous, &RateSpec::per_minute(1000)));
        assert!(authenticated_not_lower(&anonymous, &"6000/h".parse().unwrap()));
        assert!(!authenticated_not_lower(&anonymous, &RateSpec::per_minute(10)));
    }

    #[tokio::test]
    async fn test_anonymous_limit_per_ip() {
        let limiter = limiter(3, 6);
        let caller = Caller::anonymous(ip(1));
        for _ in 0..3 {
            assert!(!limiter.check(&caller).await.is_limited());
        }
        assert_eq!(limiter.check(&caller).await, RateDecision::Limited);

        // another address has its own window
        assert!(!limiter.check(&Caller::anonymous(ip(2))).await.is_limited());
    }

    #[tokio::test]
    async fn test_token_gets_higher_limit() {
        let limiter = limiter(3, 6);
        let caller = token_caller(7, UserAccount::new(1, "test"));
        for _ in 0..6 {
            assert!(!limiter.check(&caller).await.is_limited());
        }
        assert!(limiter.check(&caller).await.is_limited());
        // the token's address was never counted
        assert!(!limiter.check(&Caller::anonymous(ip(1))).await.is_limited());
    }

    #[tokio::test]
    async fn test_inactive_token_owner_counts_as_anonymous() {
        let limiter = limiter(1, 100);
        let caller = token_caller(7, UserAccount::new(1, "test").deactivated());
        assert!(!limiter.check(&caller).await.is_limited());
        assert!(limiter.check(&caller).await.is_limited());
    }

    #[tokio::test]
    async fn test_exempt_tokens() {
        let limiter = limiter(1, 1).exempt_tokens(true);
        let caller = token_caller(7, UserAccount::new(1, "test"));
        for _ in 0..5 {
            assert_eq!(limiter.check(&caller).await, RateDecision::Exempt);
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SharedStore for BrokenStore {
        async fn incr_window(&self, _key: &str, _window: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            RateSpec::per_minute(0),
            RateSpec::per_minute(0),
        );
        assert!(!limiter.check(&Caller::anonymous(ip(1))).await.is_limited());
    }
}
