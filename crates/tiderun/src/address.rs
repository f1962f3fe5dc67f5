//! # Address Scheme
//!
//! Every topic a node publishes to or subscribes on is a separator-joined
//! path under one of two domains, `service` or `client`. Each domain has four
//! subdomains:
//!
//! | subdomain | token | service form              | client form           |
//! |-----------|-------|---------------------------|-----------------------|
//! | broadcast | `bc`  | `service.bc.<svc>`        | `client.bc`           |
//! | balance   | `lb`  | `service.lb.<svc>`        | (unused)              |
//! | node      | `nd`  | `service.nd.<svc>.<node>` | `client.nd.<entity>`  |
//! | multicast | `mc`  | `service.mc.<group>`      | `client.mc.<group>`   |
//!
//! ## Invariants
//! - **Prefix Exact**: a path is inside a subdomain only if the subdomain is a
//!   proper directory ancestor. `svc.lb2.x` is not inside `svc.lb`.
//! - **Single Source**: all address construction goes through `NodeDetails`,
//!   so the separator and domain names live in one place.

pub const BROADCAST: &str = "bc";
pub const BALANCE: &str = "lb";
pub const NODE: &str = "nd";
pub const MULTICAST: &str = "mc";

/// Joins non-empty segments with `sep`.
pub fn join(sep: char, segments: &[&str]) -> String {
    let mut out = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push(sep);
        }
        out.push_str(segment);
    }
    out
}

/// Splits `path` at its last separator into `(dir, base)`.
pub fn split(sep: char, path: &str) -> (&str, &str) {
    match path.rfind(sep) {
        Some(at) => (&path[..at], &path[at + sep.len_utf8()..]),
        None => ("", path),
    }
}

/// Last segment of `path`.
pub fn base(sep: char, path: &str) -> &str {
    split(sep, path).1
}

/// Everything before the last segment of `path`.
pub fn dir(sep: char, path: &str) -> &str {
    split(sep, path).0
}

/// One address subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    root: String,
    sep: char,
}

impl Domain {
    pub fn new(root: impl Into<String>, sep: char) -> Self {
        Self { root: root.into(), sep }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn separator(&self) -> char {
        self.sep
    }

    /// True if `path` is strictly nested under this domain.
    pub fn in_subdomain(&self, path: &str) -> bool {
        self.relative(path).is_some()
    }

    /// True if `path` is this domain's root itself.
    pub fn same_subdomain(&self, path: &str) -> bool {
        path == self.root
    }

    /// Root or anything beneath it.
    pub fn contains(&self, path: &str) -> bool {
        self.same_subdomain(path) || self.in_subdomain(path)
    }

    /// The part of `path` below this domain, if it is strictly nested.
    pub fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.root.as_str())?;
        let rest = rest.strip_prefix(self.sep)?;
        (!rest.is_empty()).then_some(rest)
    }

    /// Appends segments below the root.
    pub fn join(&self, segments: &[&str]) -> String {
        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push(self.root.as_str());
        all.extend_from_slice(segments);
        join(self.sep, &all)
    }

    pub fn child(&self, name: &str) -> Domain {
        Domain::new(self.join(&[name]), self.sep)
    }
}

/// Which subdomain an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrKind {
    Broadcast,
    Balance,
    Node,
    Multicast,
}

/// A domain plus its four derived subdomains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDetails {
    pub domain: Domain,
    pub broadcast: Domain,
    pub balance: Domain,
    pub node: Domain,
    pub multicast: Domain,
}

impl NodeDetails {
    pub fn new(domain: impl Into<String>, sep: char) -> Self {
        let domain = Domain::new(domain, sep);
        Self {
            broadcast: domain.child(BROADCAST),
            balance: domain.child(BALANCE),
            node: domain.child(NODE),
            multicast: domain.child(MULTICAST),
            domain,
        }
    }

    pub fn separator(&self) -> char {
        self.domain.separator()
    }

    /// True if `addr` lives anywhere under this domain.
    pub fn in_domain(&self, addr: &str) -> bool {
        self.domain.in_subdomain(addr)
    }

    pub fn classify(&self, addr: &str) -> Option<AddrKind> {
        if self.broadcast.contains(addr) {
            Some(AddrKind::Broadcast)
        } else if self.balance.in_subdomain(addr) {
            Some(AddrKind::Balance)
        } else if self.node.in_subdomain(addr) {
            Some(AddrKind::Node)
        } else if self.multicast.in_subdomain(addr) {
            Some(AddrKind::Multicast)
        } else {
            None
        }
    }

    /// The domain-wide broadcast address (used by the client domain).
    pub fn broadcast_root(&self) -> String {
        self.broadcast.root().to_string()
    }

    pub fn broadcast_addr(&self, service: &str) -> String {
        self.broadcast.join(&[service])
    }

    pub fn balance_addr(&self, service: &str) -> String {
        self.balance.join(&[service])
    }

    /// Unicast address of one service node.
    pub fn node_addr(&self, service: &str, node_id: &str) -> String {
        self.node.join(&[service, node_id])
    }

    /// Unicast address of one client entity.
    pub fn entity_addr(&self, entity_id: &str) -> String {
        self.node.join(&[entity_id])
    }

    pub fn multicast_addr(&self, group: &str) -> String {
        self.multicast.join(&[group])
    }

    /// The path below the node subdomain, e.g. the entity of a client address.
    pub fn node_target<'a>(&self, addr: &'a str) -> Option<&'a str> {
        self.node.relative(addr)
    }

    /// The group name of a multicast address.
    pub fn multicast_group<'a>(&self, addr: &'a str) -> Option<&'a str> {
        self.multicast.relative(addr)
    }
}
