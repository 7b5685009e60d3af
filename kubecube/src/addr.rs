//! Remote ssh addresses and API server URIs.

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Host every merged cluster's server is rewritten to. Expected to resolve
/// to the local end of the ssh tunnel (usually via `/etc/hosts`).
pub const LOCAL_PROXY_HOST: &str = "kubernetes";

/// `user@host` of the remote master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    pub user: Option<String>,
    pub host: String,
}

impl RemoteAddr {
    pub fn new(user: &str, ip: &str) -> Result<Self> {
        let host = ip.trim();
        if host.is_empty() {
            return Err(Error::EmptyRemoteIp);
        }

        let user = user.trim();
        Ok(Self {
            user: (!user.is_empty()).then(|| user.to_string()),
            host: host.to_string(),
        })
    }

    /// Everything after the last `@` is the host.
    pub fn parse(addr: &str) -> Self {
        match addr.rsplit_once('@') {
            Some((user, host)) => Self {
                user: Some(user.to_string()),
                host: host.to_string(),
            },
            None => Self {
                user: None,
                host: addr.to_string(),
            },
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{user}@{}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn of(server: &str) -> Option<Self> {
        let scheme = server.split_once("://")?.0;
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_server(server: &str) -> Option<Url> {
    if server.contains("://") {
        Url::parse(server).ok()
    } else {
        Url::parse(&format!("http://{server}")).ok()
    }
}

/// Host part of a server address; a scheme is optional. IPv6 hosts come
/// back without brackets so they compare equal to a bare remote IP.
pub fn server_host(server: &str) -> Option<String> {
    let url = parse_server(server)?;
    match url.host()? {
        Host::Ipv6(addr) => Some(addr.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Domain(domain) => Some(domain.to_string()),
    }
}

/// Port written in the server address, if any.
pub fn explicit_port(server: &str) -> Option<u16> {
    let url = Url::parse(server).ok()?;
    url.port()
}

/// Port the server listens on, falling back to the scheme default.
pub fn server_port(server: &str) -> u16 {
    parse_server(server)
        .and_then(|url| url.port_or_known_default())
        .unwrap_or(80)
}

/// `scheme://kubernetes:<port>`
pub fn local_server(scheme: Scheme, port: u16) -> String {
    format!("{scheme}://{LOCAL_PROXY_HOST}:{port}")
}
