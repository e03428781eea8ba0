//! Connection string parsing.
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error::ArgumentError;
use crate::error::Result;

pub const DEFAULT_PORT: u16 = 27017;
pub const URI_SCHEME: &str = "mongodb://";

/// Encapsulates the hostname and port of a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Host {
    pub host_name: String,
    pub port: u16,
}

impl Host {
    pub fn new(host_name: &str, port: u16) -> Host {
        Host {
            host_name: host_name.to_ascii_lowercase(),
            port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.host_name.contains(':') {
            write!(fmt, "[{}]:{}", self.host_name, self.port)
        } else {
            write!(fmt, "{}:{}", self.host_name, self.port)
        }
    }
}

/// Encapsulates information for connection to one or more MongoDB hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub hosts: Vec<Host>,
    pub database: Option<String>,
    /// Raw URI options, keyed by their lowercased name.
    pub options: BTreeMap<String, String>,
}

impl ConnectionString {
    /// Returns the raw value of a URI option, matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Parses an option holding a millisecond duration or count.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            Some(val) => val
                .parse::<u64>()
                .map(Some)
                .map_err(|_| {
                    ArgumentError(format!(
                        "{} must be a non-negative integer, got '{}'.",
                        key, val
                    ))
                }),
            None => Ok(None),
        }
    }
}

/// Parses a MongoDB connection string URI as defined by
/// [the manual](http://docs.mongodb.org/manual/reference/connection-string/).
pub fn parse(address: &str) -> Result<ConnectionString> {
    let addr = match address.strip_prefix(URI_SCHEME) {
        Some(addr) => addr,
        None => {
            return Err(ArgumentError(
                "MongoDB connection string must start with 'mongodb://'.".to_owned(),
            ))
        }
    };

    let (host_str, path_str) = partition(addr, "/");

    if path_str.is_empty() && host_str.contains('?') {
        return Err(ArgumentError(
            "A '/' is required between the host list and any options.".to_owned(),
        ));
    }

    if host_str.contains('@') {
        return Err(ArgumentError(
            "Credentials in the connection string are not supported.".to_owned(),
        ));
    }

    let hosts = split_hosts(host_str)?;

    let (dbase, opts) = partition(path_str, "?");
    let database = if dbase.is_empty() {
        None
    } else {
        Some(dbase.to_owned())
    };

    let options = if opts.is_empty() {
        BTreeMap::new()
    } else {
        split_options(opts)?
    };

    Ok(ConnectionString {
        hosts,
        database,
        options,
    })
}

// Parses a literal IPv6 literal host entity of the form [host] or [host]:port
fn parse_ipv6_literal_host(entity: &str) -> Result<Host> {
    match entity.find("]:") {
        Some(idx) => match entity[idx + 2..].parse::<u16>() {
            Ok(port) => Ok(Host::new(&entity[1..idx], port)),
            Err(_) => Err(ArgumentError("Port must be an integer.".to_owned())),
        },
        None if entity.ends_with(']') => Ok(Host::new(&entity[1..entity.len() - 1], DEFAULT_PORT)),
        None => Err(ArgumentError(
            "An IPv6 address must be enclosed in '[' and ']' according to RFC 2732.".to_owned(),
        )),
    }
}

/// Parses a host entity of the form host or host:port, and redirects IPv6 entities.
/// All host names are lowercased.
pub fn parse_host(entity: &str) -> Result<Host> {
    if entity.starts_with('[') {
        parse_ipv6_literal_host(entity)
    } else if entity.contains(':') {
        let (host, port) = partition(entity, ":");
        if port.contains(':') {
            return Err(ArgumentError(
                "Reserved characters such as ':' must be escaped according to RFC 2396. \
                 An IPv6 address literal must be enclosed in '[' and ']' according to RFC 2732."
                    .to_owned(),
            ));
        }
        match port.parse::<u16>() {
            Ok(val) => Ok(Host::new(host, val)),
            Err(_) => Err(ArgumentError("Port must be an unsigned integer.".to_owned())),
        }
    } else {
        Ok(Host::new(entity, DEFAULT_PORT))
    }
}

// Splits and parses comma-separated hosts.
fn split_hosts(host_str: &str) -> Result<Vec<Host>> {
    let mut hosts = Vec::new();
    for entity in host_str.split(',') {
        if entity.is_empty() {
            return Err(ArgumentError("Empty host, or extra comma in host list.".to_owned()));
        }
        hosts.push(parse_host(entity)?);
    }
    Ok(hosts)
}

// Determines the option delimiter and collects key=value pairs.
fn split_options(opts: &str) -> Result<BTreeMap<String, String>> {
    let delim = match (opts.contains('&'), opts.contains(';')) {
        (true, true) => {
            return Err(ArgumentError(
                "Cannot mix '&' and ';' for option separators.".to_owned(),
            ))
        }
        (true, false) => '&',
        _ => ';',
    };

    let mut options = BTreeMap::new();
    for opt in opts.split(delim) {
        if !opt.contains('=') {
            return Err(ArgumentError(
                "InvalidURI: MongoDB URI options are key=value pairs.".to_owned(),
            ));
        }
        let (key, val) = partition(opt, "=");
        options.insert(key.to_ascii_lowercase(), val.to_owned());
    }
    Ok(options)
}

// Partitions a string around the left-most occurrence of the separator, if it exists.
fn partition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.find(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => (string, ""),
    }
}
