//! Deadline-bounded, blocking hostname resolution.
//!
//! A [`Resolver`] is built once per target (host, port, family, flags) and
//! queried repeatedly; each [`Resolver::resolve`] call blocks until the name
//! resolves, fails, or the deadline fires. Resolution rides the shared
//! reactor; a deadline expiry drops the in-flight lookup, which cancels it.
//!
//! Only the most recent result set matters to callers (the connector replaces
//! its endpoint list wholesale), so no caching happens here.

use std::net::{IpAddr, SocketAddr};

use hickory_resolver::config::{LookupIpStrategy, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, TokioResolver};

use crate::base::{Deadline, DnsError, Error, Result};
use crate::runtime;
use crate::{log_debug, log_trace, log_warn};

/// Which address family a resolution may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpFamily {
    V4,
    V6,
    #[default]
    Any,
}

impl IpFamily {
    fn strategy(self) -> LookupIpStrategy {
        match self {
            IpFamily::V4 => LookupIpStrategy::Ipv4Only,
            IpFamily::V6 => LookupIpStrategy::Ipv6Only,
            IpFamily::Any => LookupIpStrategy::Ipv4AndIpv6,
        }
    }

    fn permits(self, ip: IpAddr) -> bool {
        match self {
            IpFamily::V4 => ip.is_ipv4(),
            IpFamily::V6 => ip.is_ipv6(),
            IpFamily::Any => true,
        }
    }
}

/// Modifiers for how resolution is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveFlags {
    /// Only accept a literal IP address; never consult DNS.
    pub numeric_host: bool,
}

/// Blocking hostname-to-addresses resolver for one target.
///
/// Not safe for concurrent `resolve` calls; the connector serializes them on
/// its background thread.
pub struct Resolver {
    host: String,
    port: u16,
    family: IpFamily,
    flags: ResolveFlags,
    inner: TokioResolver,
}

impl Resolver {
    /// Build a resolver for `host:port`. Reads the system DNS configuration,
    /// falling back to defaults when it is unreadable.
    pub fn new(host: impl Into<String>, port: u16, family: IpFamily, flags: ResolveFlags) -> Self {
        // Entering the reactor lets the connection provider bind its sockets
        // to the crate runtime rather than whatever thread builds us.
        let _guard = runtime::reactor().enter();
        let mut builder = match TokioResolver::builder_tokio() {
            Ok(builder) => builder,
            Err(err) => {
                log_warn!("unreadable system DNS config ({err}), using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };
        builder.options_mut().ip_strategy = family.strategy();

        Resolver { host: host.into(), port, family, flags, inner: builder.build() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the target into one or more socket addresses.
    ///
    /// Success guarantees a non-empty list. Literal IP hosts short-circuit
    /// without touching DNS; with [`ResolveFlags::numeric_host`] set, a
    /// non-literal host fails with [`DnsError::HostNotFound`].
    pub fn resolve(&mut self, deadline: Deadline) -> Result<Vec<SocketAddr>> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            if !self.family.permits(ip) {
                return Err(Error::Dns(DnsError::HostNotFound));
            }
            return Ok(vec![SocketAddr::new(ip, self.port)]);
        }
        if self.flags.numeric_host {
            return Err(Error::Dns(DnsError::HostNotFound));
        }

        let host = self.host.clone();
        let lookup = runtime::block_on_deadline(deadline, async {
            self.inner.lookup_ip(host.as_str()).await.map_err(classify)
        })
        .map_err(|err| if err == Error::Timeout { Error::Dns(DnsError::Timeout) } else { err })?;

        let family = self.family;
        let port = self.port;
        let addrs: Vec<SocketAddr> = lookup
            .iter()
            .filter(|ip| family.permits(*ip))
            .map(|ip| SocketAddr::new(ip, port))
            .collect();

        if addrs.is_empty() {
            log_debug!("{} resolved to no usable {:?} addresses", self.host, self.family);
            return Err(Error::Dns(DnsError::HostNotFound));
        }
        log_trace!("{} resolved to {} address(es)", self.host, addrs.len());
        Ok(addrs)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("family", &self.family)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// NXDOMAIN and empty answer sets surface as hickory proto "no records"
/// errors; everything else (exhausted connections, server failures, internal
/// timeouts) is transient and worth retrying.
fn classify(err: ResolveError) -> Error {
    let text = err.to_string();
    if text.contains("no record") {
        Error::Dns(DnsError::HostNotFound)
    } else {
        Error::Dns(DnsError::TryAgain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn literal_v4_skips_dns() {
        let mut resolver =
            Resolver::new("127.0.0.1", 8080, IpFamily::Any, ResolveFlags::default());
        let addrs = resolver.resolve(Deadline::after(Duration::from_secs(1))).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse().unwrap()]);
    }

    #[test]
    fn literal_v6_skips_dns() {
        let mut resolver = Resolver::new("::1", 53, IpFamily::V6, ResolveFlags::default());
        let addrs = resolver.resolve(Deadline::after(Duration::from_secs(1))).unwrap();
        assert_eq!(addrs, vec!["[::1]:53".parse().unwrap()]);
    }

    #[test]
    fn literal_family_mismatch_fails() {
        let mut resolver = Resolver::new("127.0.0.1", 80, IpFamily::V6, ResolveFlags::default());
        let err = resolver.resolve(Deadline::after(Duration::from_secs(1))).unwrap_err();
        assert_eq!(err, Error::Dns(DnsError::HostNotFound));
    }

    #[test]
    fn numeric_host_flag_rejects_names() {
        let flags = ResolveFlags { numeric_host: true };
        let mut resolver = Resolver::new("localhost", 80, IpFamily::Any, flags);
        let err = resolver.resolve(Deadline::after(Duration::from_secs(1))).unwrap_err();
        assert_eq!(err, Error::Dns(DnsError::HostNotFound));
    }
}
