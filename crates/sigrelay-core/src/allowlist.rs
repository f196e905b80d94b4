//! Destination admission control
//!
//! Every relay target must pass [`Allowlist::admit`] before any network I/O
//! happens. Admission is an exact, case-normalised hostname match against a
//! set fixed at startup; there is no wildcard or suffix matching, so
//! `evil.ca.gov.ua` is not admitted just because `ca.gov.ua` is.

use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Longest destination string (in characters) that will be parsed at all
pub const MAX_ADDRESS_LENGTH: usize = 255;

/// Trust-service hosts admitted when no allowlist is configured
pub const DEFAULT_HOSTS: &[&str] = &[
    "ca.gov.ua",
    "czo.gov.ua",
    "zc.bank.gov.ua",
    "acskidd.gov.ua",
    "ca.informjust.ua",
    "csk.uz.gov.ua",
    "masterkey.ua",
    "ocsp.masterkey.ua",
    "tsp.masterkey.ua",
    "csk.uss.gov.ua",
    "csk.ukrsibbank.com",
    "acsk.privatbank.ua",
    "ca.mil.gov.ua",
    "acsk.dpsu.gov.ua",
    "acsk.er.gov.ua",
    "ca.mvs.gov.ua",
    "canbu.bank.gov.ua",
    "uakey.com.ua",
    "altersign.com.ua",
    "ca.altersign.com.ua",
    "ocsp.altersign.com.ua",
    "acsk.treasury.gov.ua",
    "ocsp.treasury.gov.ua",
    "ca.oschadbank.ua",
    "ca.gp.gov.ua",
    "acsk.oree.com.ua",
    "ca.treasury.gov.ua",
    "ca.depositsign.com",
    "csk.pivdenny.ua",
    "xca.credit-agricole.com.ua",
    "ca.iit.com.ua",
    "ca.tascombank.com.ua",
    "ca.tascombank.ua",
    "ssign.diia.gov.ua",
    "test2-ssign.diia.org.ua",
    "depositsign.com",
    "pki.pumb.ua",
    "ca.alfabank.kiev.ua",
    "cesaris.itsway.kiev.ua",
    "ca.credit-agricole.ua",
    "sserver2.iit.com.ua",
    "192.168.30.10",
    "skey.fozzy.ua",
    "skey-test.fozzy.ua",
    "microservice.alfabank.kiev.ua",
    "ca.e-life.com.ua",
    "ocsp.e-life.com.ua",
    "tsp.e-life.com.ua",
    "cmp.e-life.com.ua",
    "cabinet.e-life.com.ua",
    "ca.bankalliance.ua",
    "ca.vchasno.ua",
    "cs.vchasno.ua",
    "qca.ukrgasbank.com",
    "kepserver.ukrtransnafta.com",
    "root-test.czo.gov.ua",
    "ca-test.czo.gov.ua",
    "smart-sign.tax.gov.ua",
    "ca.tax.gov.ua",
    "apiext.pumb.ua",
    "ca.pravex.com.ua",
    "ca.diia.gov.ua",
    "cihsm-dev-api.cipher.com.ua",
    "test2-ca.diia.org.ua",
    "vtms-api-csk.ukrgasbank.com",
    "ca.sensebank.com.ua",
    "vtms-api-qca.ukrgasbank.com",
    "cihsm-api.bankalliance.ua",
];

/// Why a destination was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No destination given
    Empty,
    /// Longer than [`MAX_ADDRESS_LENGTH`]
    TooLong,
    /// Not an absolute URL
    Malformed,
    /// Scheme other than `http` or `https`
    UnsupportedScheme,
    /// Host is not on the allowlist
    UnknownHost,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty address"),
            Self::TooLong => write!(f, "address longer than {MAX_ADDRESS_LENGTH} characters"),
            Self::Malformed => write!(f, "address is not an absolute URL"),
            Self::UnsupportedScheme => write!(f, "scheme must be http or https"),
            Self::UnknownHost => write!(f, "host is not on the allowlist"),
        }
    }
}

/// A destination URL that passed admission control
///
/// Only [`Allowlist::admit`] constructs this type, so holding one is proof
/// that the hostname was checked for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    url: Url,
}

impl Destination {
    /// The parsed URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the destination uses TLS
    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Hostname as matched against the allowlist
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Host suitable for socket connection and SNI (IPv6 without brackets)
    pub fn connect_host(&self) -> String {
        match self.url.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        }
    }

    /// Port, falling back to the scheme default
    pub fn port(&self) -> u16 {
        self.url
            .port_or_known_default()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }

    /// Value for the outbound `Host` header
    pub fn authority(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// Path component only
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Request target (path and query) exactly as given by the caller
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Immutable set of hostnames the relay may contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    hosts: HashSet<String>,
}

impl Allowlist {
    /// Create an allowlist from hostnames (normalised to lowercase)
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// The compiled-in trust-service hosts
    pub fn builtin() -> Self {
        Self::new(DEFAULT_HOSTS.iter().copied())
    }

    /// Exact hostname membership
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Number of admitted hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no host is admitted
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Run admission control on a raw destination string
    ///
    /// Checks are applied in order and stop at the first failure: length,
    /// absolute-URL parse, scheme, exact host membership.
    pub fn admit(&self, raw: &str) -> Result<Destination, Rejection> {
        if raw.is_empty() {
            return Err(Rejection::Empty);
        }
        // Byte length bounds the char count from above, so oversized input is
        // refused without walking it.
        if raw.len() > MAX_ADDRESS_LENGTH * 4 || raw.chars().count() > MAX_ADDRESS_LENGTH {
            return Err(Rejection::TooLong);
        }

        let url = Url::parse(raw).map_err(|_| Rejection::Malformed)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::UnsupportedScheme);
        }

        match url.host_str() {
            Some(host) if self.contains(host) => Ok(Destination { url }),
            _ => Err(Rejection::UnknownHost),
        }
    }

    /// Accept/reject view of [`Allowlist::admit`]
    pub fn is_allowed(&self, raw: &str) -> bool {
        self.admit(raw).is_ok()
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::builtin()
    }
}
