//! Virtual host resolution.
//!
//! Grounded on `mklib_vhost_config` (`MKV_SERVERNAME` splits a comma-separated alias list and
//! truncates each alias at `MK_HOSTNAME_LEN`, `MKV_DOCUMENTROOT` sets the filesystem root) and
//! `mklib_host_find` (case-insensitive linear scan over aliases, falling back to the first
//! configured host when the `Host` header matches nothing).

use std::path::PathBuf;

/// Matches Monkey's `MK_HOSTNAME_LEN`.
pub const MAX_HOSTNAME_LEN: usize = 255;

/// One configured virtual host: a set of `Host:` header aliases and the document root they serve
/// from.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    aliases: Vec<String>,
    document_root: PathBuf,
}

impl VirtualHost {
    pub fn new(aliases: Vec<String>, document_root: PathBuf) -> Result<Self, crate::error::ConfigError> {
        for alias in &aliases {
            if alias.len() > MAX_HOSTNAME_LEN {
                return Err(crate::error::ConfigError::HostnameTooLong);
            }
        }
        Ok(Self {
            aliases,
            document_root,
        })
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn document_root(&self) -> &std::path::Path {
        &self.document_root
    }

    fn matches(&self, host: &str) -> bool {
        self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(host))
    }
}

/// The full set of configured virtual hosts. The first one registered is the default, served
/// whenever the `Host` header matches no alias (or is absent, for HTTP/1.0).
#[derive(Debug, Clone, Default)]
pub struct VirtualHosts {
    hosts: Vec<VirtualHost>,
}

impl VirtualHosts {
    pub fn new(hosts: Vec<VirtualHost>) -> Self {
        Self { hosts }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn list(&self) -> &[VirtualHost] {
        &self.hosts
    }

    /// Resolves a `Host:` header value (stripped of any `:port` suffix by the caller) to a virtual
    /// host, falling back to the default (first-registered) host.
    pub fn resolve(&self, host: Option<&str>) -> Option<&VirtualHost> {
        if self.hosts.is_empty() {
            return None;
        }
        if let Some(host) = host {
            if let Some(vhost) = self.hosts.iter().find(|v| v.matches(host)) {
                return Some(vhost);
            }
        }
        self.hosts.first()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vhost(aliases: &[&str]) -> VirtualHost {
        VirtualHost::new(
            aliases.iter().map(|s| s.to_string()).collect(),
            PathBuf::from("/srv/www"),
        )
        .unwrap()
    }

    #[test]
    fn resolves_case_insensitively() {
        let hosts = VirtualHosts::new(vec![vhost(&["example.com", "www.example.com"])]);
        assert!(hosts.resolve(Some("EXAMPLE.COM")).is_some());
    }

    #[test]
    fn falls_back_to_default_host() {
        let hosts = VirtualHosts::new(vec![vhost(&["example.com"]), vhost(&["other.test"])]);
        let resolved = hosts.resolve(Some("unknown.test")).unwrap();
        assert_eq!(resolved.aliases(), ["example.com"]);
    }

    #[test]
    fn falls_back_when_host_header_absent() {
        let hosts = VirtualHosts::new(vec![vhost(&["example.com"])]);
        assert!(hosts.resolve(None).is_some());
    }

    #[test]
    fn rejects_alias_longer_than_max_hostname_len() {
        let alias = "a".repeat(MAX_HOSTNAME_LEN + 1);
        assert!(VirtualHost::new(vec![alias], PathBuf::from("/srv")).is_err());
    }
}
