//! Origin validation.
//!
//! Requests without an `Origin` header come from non-browser callers and are
//! allowed. In development only loopback and private-network origins pass;
//! elsewhere the injected [`OriginPolicy`] decides.

use std::collections::HashSet;
use std::fmt;

use axum::http::{header::ORIGIN, HeaderMap};
use thiserror::Error;
use url::{Host, Url};

/// Membership test for browser origins outside development.
pub trait OriginPolicy: Send + Sync + fmt::Debug {
    fn allows(&self, origin: &Url) -> bool;
}

/// Allowlist built from configuration. `"*"` accepts any origin.
#[derive(Debug, Clone, Default)]
pub struct StaticOriginAllowlist {
    any: bool,
    origins: HashSet<String>,
}

impl StaticOriginAllowlist {
    pub fn new(entries: &[String]) -> Self {
        let mut list = Self::default();
        for entry in entries {
            if entry.trim() == "*" {
                list.any = true;
                continue;
            }
            match Url::parse(entry.trim()) {
                Ok(url) => {
                    list.origins.insert(url.origin().ascii_serialization());
                }
                Err(e) => tracing::warn!(origin = %entry, error = %e, "Ignoring unparseable allowed origin"),
            }
        }
        list
    }

    /// True when the wildcard entry is present.
    pub fn allows_any(&self) -> bool {
        self.any
    }
}

impl OriginPolicy for StaticOriginAllowlist {
    fn allows(&self, origin: &Url) -> bool {
        self.any || self.origins.contains(&origin.origin().ascii_serialization())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("Invalid origin: {0}. Only localhost allowed in development")]
    NotLocal(String),
    #[error("Invalid origin: {0}")]
    NotAllowed(String),
}

/// Validate the `Origin` header, if any.
pub fn validate_origin(
    headers: &HeaderMap,
    is_development: bool,
    policy: &dyn OriginPolicy,
) -> Result<(), OriginError> {
    let Some(raw) = headers.get(ORIGIN) else {
        return Ok(());
    };
    let origin = String::from_utf8_lossy(raw.as_bytes()).into_owned();
    let parsed = Url::parse(&origin).ok();

    if is_development {
        return match parsed {
            Some(url) if is_local_origin(&url) => Ok(()),
            _ => Err(OriginError::NotLocal(origin)),
        };
    }

    match parsed {
        Some(url) if policy.allows(&url) => Ok(()),
        _ => Err(OriginError::NotAllowed(origin)),
    }
}

/// Loopback, RFC1918 private ranges, `localhost`, or a `.local` name.
pub fn is_local_origin(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".local")
        }
        None => false,
    }
}
