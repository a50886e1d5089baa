//! Interface parameters exchanged in the handshake response

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{Error, Result};

/// Parameters for the virtual interface, as pushed by the gateway.
///
/// # Grammar
///
/// Space-separated fields, each `key,value[,value]`. Only the first character
/// of the key is significant:
///
/// | key | values                   | meaning        |
/// |-----|--------------------------|----------------|
/// | `m` | `mtu`                    | interface MTU  |
/// | `a` | `address,prefix_len`     | local address  |
/// | `r` | `network,prefix_len`     | route          |
/// | `d` | `address`                | DNS server     |
/// | `s` | `domain`                 | search domain  |
///
/// Fields with any other key are ignored so that gateways can add new ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceParameters {
    pub mtu: Option<u16>,
    pub addresses: Vec<IpNet>,
    pub routes: Vec<IpNet>,
    pub dns_servers: Vec<IpAddr>,
    pub search_domains: Vec<String>,
}

impl InterfaceParameters {
    /// Parse a parameter string
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// First IPv4 address assigned to the interface, if any
    pub fn ipv4_address(&self) -> Option<IpNet> {
        self.addresses.iter().copied().find(|net| net.addr().is_ipv4())
    }

    /// IPv6 addresses assigned to the interface
    pub fn ipv6_addresses(&self) -> impl Iterator<Item = IpNet> + '_ {
        self.addresses.iter().copied().filter(|net| net.addr().is_ipv6())
    }
}

impl FromStr for InterfaceParameters {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut params = InterfaceParameters::default();

        for field in s.split_whitespace() {
            let values: Vec<&str> = field.split(',').collect();
            let Some(key) = values[0].chars().next() else {
                continue;
            };

            match key {
                'm' => params.mtu = Some(parse_mtu(field, value(field, &values, 1)?)?),
                'a' => params.addresses.push(parse_net(field, &values)?),
                'r' => params.routes.push(parse_net(field, &values)?),
                'd' => params.dns_servers.push(parse_ip(field, value(field, &values, 1)?)?),
                's' => params.search_domains.push(value(field, &values, 1)?.to_string()),
                _ => {}
            }
        }

        Ok(params)
    }
}

impl fmt::Display for InterfaceParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();

        if let Some(mtu) = self.mtu {
            fields.push(format!("m,{}", mtu));
        }
        for net in &self.addresses {
            fields.push(format!("a,{},{}", net.addr(), net.prefix_len()));
        }
        for net in &self.routes {
            fields.push(format!("r,{},{}", net.addr(), net.prefix_len()));
        }
        for dns in &self.dns_servers {
            fields.push(format!("d,{}", dns));
        }
        for domain in &self.search_domains {
            fields.push(format!("s,{}", domain));
        }

        write!(f, "{}", fields.join(" "))
    }
}

fn value<'a>(field: &str, values: &[&'a str], index: usize) -> Result<&'a str> {
    match values.get(index) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::malformed(field, format!("missing value #{}", index))),
    }
}

fn parse_mtu(field: &str, raw: &str) -> Result<u16> {
    // The MTU travels as a signed short
    let mtu: i16 = raw
        .parse()
        .map_err(|_| Error::malformed(field, format!("invalid MTU `{}`", raw)))?;

    match u16::try_from(mtu) {
        Ok(mtu) if mtu > 0 => Ok(mtu),
        _ => Err(Error::malformed(field, format!("MTU {} out of range", mtu))),
    }
}

fn parse_ip(field: &str, raw: &str) -> Result<IpAddr> {
    raw.parse()
        .map_err(|_| Error::malformed(field, format!("invalid IP address `{}`", raw)))
}

fn parse_net(field: &str, values: &[&str]) -> Result<IpNet> {
    let addr = parse_ip(field, value(field, values, 1)?)?;
    let raw_prefix = value(field, values, 2)?;
    let prefix: u8 = raw_prefix
        .parse()
        .map_err(|_| Error::malformed(field, format!("invalid prefix length `{}`", raw_prefix)))?;

    IpNet::new(addr, prefix).map_err(|e| Error::malformed(field, e.to_string()))
}
