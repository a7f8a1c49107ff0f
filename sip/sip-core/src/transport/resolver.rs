use std::io;
use std::net::SocketAddr;
use tokio::net::lookup_host;

/// Resolver used by the endpoint to turn host names into socket addresses
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// Perform address resolution for the given `name`
    async fn resolve(&self, name: &str, port: u16) -> io::Result<Vec<SocketAddr>>;

    /// SRV-style lookup for `_sip._<proto>.<name>`.
    ///
    /// Called when a URI names a host without an explicit port. The default
    /// implementation ignores SRV records and performs a plain address
    /// lookup with the protocol's default port.
    async fn resolve_srv(
        &self,
        _proto: &str,
        name: &str,
        default_port: u16,
    ) -> io::Result<Vec<SocketAddr>> {
        self.resolve(name, default_port).await
    }
}

/// Resolves hostnames using the system's DNS resolver
///
/// This resolver is the default one used by the endpoint. Covers most use cases.
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(lookup_host((name, port)).await?.collect())
    }
}

/// Resolver which consults DNS SRV records before falling back to A/AAAA
/// lookups, implemented on top of `hickory-resolver`.
pub struct SrvResolver {
    dns: hickory_resolver::TokioResolver,
}

impl SrvResolver {
    /// Create a resolver from the system's DNS configuration
    pub fn new() -> io::Result<Self> {
        let dns = hickory_resolver::TokioResolver::builder_tokio()
            .map_err(io::Error::other)?
            .build();

        Ok(Self { dns })
    }
}

#[async_trait::async_trait]
impl Resolver for SrvResolver {
    async fn resolve(&self, name: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let lookup = self.dns.lookup_ip(name).await.map_err(io::Error::other)?;

        Ok(lookup.iter().map(|ip| SocketAddr::new(ip, port)).collect())
    }

    async fn resolve_srv(
        &self,
        proto: &str,
        name: &str,
        default_port: u16,
    ) -> io::Result<Vec<SocketAddr>> {
        let service = format!("_sip._{}.{}", proto, name);

        let srv = match self.dns.srv_lookup(service).await {
            Ok(srv) => srv,
            Err(e) => {
                log::debug!("no SRV records for {}, {}", name, e);

                return self.resolve(name, default_port).await;
            }
        };

        let mut addrs = vec![];

        for record in srv.iter() {
            let target = record.target().to_utf8();

            match self.resolve(target.trim_end_matches('.'), record.port()).await {
                Ok(resolved) => addrs.extend(resolved),
                Err(e) => log::debug!("failed to resolve SRV target {}, {}", target, e),
            }
        }

        if addrs.is_empty() {
            self.resolve(name, default_port).await
        } else {
            Ok(addrs)
        }
    }
}
