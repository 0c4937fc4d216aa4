use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use bytes::{Buf, BufMut};

use super::error::HostParseError;

pub const ADDRESS_SIZE: usize = 16;

/// Size of a host in its binary wire encoding.
pub const HOST_WIRE_SIZE: usize = 2 + ADDRESS_SIZE + 2;

/// Internet layer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Internet {
    #[default]
    None = 0,
    Ipv4 = 1,
    Ipv6 = 2,
}

impl Internet {
    pub fn name(self) -> Option<&'static str> {
        match self {
            Internet::Ipv4 => Some("IPv4"),
            Internet::Ipv6 => Some("IPv6"),
            Internet::None => None,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Internet::None),
            1 => Some(Internet::Ipv4),
            2 => Some(Internet::Ipv6),
            _ => None,
        }
    }
}

/// Transport layer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Transport {
    #[default]
    None = 0,
    Tcp = 1,
}

impl Transport {
    pub fn name(self) -> Option<&'static str> {
        match self {
            Transport::Tcp => Some("TCP"),
            Transport::None => None,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Transport::None),
            1 => Some(Transport::Tcp),
            _ => None,
        }
    }
}

/// A network host.
///
/// Zero-valued fields mean "unspecified": opening an interface on such a
/// host lets the system pick the protocol, address or port. IPv4 addresses
/// occupy the first four bytes of `address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Host {
    pub internet: Internet,
    pub transport: Transport,
    pub address: [u8; ADDRESS_SIZE],
    pub port: u16,
}

impl Host {
    pub const UNSPECIFIED: Host = Host {
        internet: Internet::None,
        transport: Transport::None,
        address: [0u8; ADDRESS_SIZE],
        port: 0,
    };

    pub fn new(ip: IpAddr, port: u16) -> Self {
        let mut address = [0u8; ADDRESS_SIZE];
        let internet = match ip {
            IpAddr::V4(v4) => {
                address[..4].copy_from_slice(&v4.octets());
                Internet::Ipv4
            }
            IpAddr::V6(v6) => {
                address.copy_from_slice(&v6.octets());
                Internet::Ipv6
            }
        };
        Self {
            internet,
            transport: Transport::Tcp,
            address,
            port,
        }
    }

    /// `None` if no internet protocol is set.
    pub fn ip(&self) -> Option<IpAddr> {
        match self.internet {
            Internet::Ipv4 => {
                let [a, b, c, d, ..] = self.address;
                Some(IpAddr::V4(Ipv4Addr::new(a, b, c, d)))
            }
            Internet::Ipv6 => Some(IpAddr::V6(Ipv6Addr::from(self.address))),
            Internet::None => None,
        }
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip().map(|ip| SocketAddr::new(ip, self.port))
    }

    pub fn is_unspecified(&self) -> bool {
        self.internet == Internet::None
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.internet as u8);
        buf.put_u8(self.transport as u8);
        buf.put_slice(&self.address);
        buf.put_u16(self.port);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, HostParseError> {
        if buf.remaining() < HOST_WIRE_SIZE {
            return Err(HostParseError::Truncated);
        }
        let internet = buf.get_u8();
        let internet = Internet::from_u8(internet).ok_or(HostParseError::UnknownProtocol(internet))?;
        let transport = buf.get_u8();
        let transport =
            Transport::from_u8(transport).ok_or(HostParseError::UnknownProtocol(transport))?;
        let mut address = [0u8; ADDRESS_SIZE];
        buf.copy_to_slice(&mut address);
        let port = buf.get_u16();

        Ok(Self {
            internet,
            transport,
            address,
            port,
        })
    }
}

impl From<SocketAddr> for Host {
    fn from(addr: SocketAddr) -> Self {
        Host::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ",
            self.internet.name().unwrap_or("?"),
            self.transport.name().unwrap_or("?")
        )?;
        match self.ip() {
            Some(IpAddr::V4(ip)) => write!(f, "{}", ip)?,
            Some(IpAddr::V6(ip)) => write!(f, "[{}]", ip)?,
            None => f.write_str("?")?,
        }
        write!(f, ":{}", self.port)
    }
}

/// Parses `<ipv4|ipv6|none>[/<tcp|none>] <address>[:<port>]`.
///
/// Keywords are case-insensitive and any component may be left out. A
/// missing internet protocol is guessed from whether the address is
/// bracketed, a missing transport means TCP, and a missing address or port
/// is left unspecified.
impl FromStr for Host {
    type Err = HostParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut rest = text.trim_start();

        let internet = take_keyword(
            &mut rest,
            &[
                ("ipv4", Internet::Ipv4),
                ("ipv6", Internet::Ipv6),
                ("none", Internet::None),
            ],
        );

        rest = rest.trim_start();
        let transport = match rest.strip_prefix('/') {
            Some(after) => {
                rest = after.trim_start();
                take_keyword(&mut rest, &[("tcp", Transport::Tcp), ("none", Transport::None)])
                    .ok_or_else(|| {
                        HostParseError::UnknownTransport(
                            rest.split_whitespace().next().unwrap_or_default().to_string(),
                        )
                    })?
            }
            None => Transport::Tcp,
        };

        rest = rest.trim_start();
        let bracketed = match rest.strip_prefix('[') {
            Some(after) => {
                rest = after.trim_start();
                true
            }
            None => false,
        };
        let internet = internet.unwrap_or(if bracketed {
            Internet::Ipv6
        } else {
            Internet::Ipv4
        });

        let before = rest;
        let address = take_address(&mut rest, internet)?;
        let address_text = &before[..before.len() - rest.len()];

        rest = rest.trim_start();
        if bracketed {
            rest = rest
                .strip_prefix(']')
                .ok_or_else(|| HostParseError::InvalidAddress {
                    internet: internet.name().unwrap_or("none"),
                    text: format!("[{}", address_text),
                })?
                .trim_start();
        }

        let port = match rest.strip_prefix(':') {
            Some(after) => {
                let after = after.trim_start();
                let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                let port = after[..digits]
                    .parse::<u16>()
                    .map_err(|_| HostParseError::InvalidPort(after.to_string()))?;
                rest = &after[digits..];
                port
            }
            None => 0,
        };

        let rest = rest.trim();
        if !rest.is_empty() {
            return Err(HostParseError::TrailingInput(rest.to_string()));
        }

        Ok(Host {
            internet,
            transport,
            address,
            port,
        })
    }
}

fn take_keyword<T: Copy>(rest: &mut &str, keywords: &[(&str, T)]) -> Option<T> {
    for &(keyword, value) in keywords {
        if let Some(prefix) = rest.get(..keyword.len()) {
            if prefix.eq_ignore_ascii_case(keyword) {
                *rest = &rest[keyword.len()..];
                return Some(value);
            }
        }
    }
    None
}

fn take_address(rest: &mut &str, internet: Internet) -> Result<[u8; ADDRESS_SIZE], HostParseError> {
    let allowed = |c: char| match internet {
        Internet::Ipv4 => c.is_ascii_digit() || c == '.',
        Internet::Ipv6 => c.is_ascii_hexdigit() || c == ':' || c == '.',
        Internet::None => false,
    };
    let length = rest.len() - rest.trim_start_matches(allowed).len();
    let text = &rest[..length];
    *rest = &rest[length..];

    let mut address = [0u8; ADDRESS_SIZE];
    if text.is_empty() {
        return Ok(address);
    }

    let invalid = || HostParseError::InvalidAddress {
        internet: internet.name().unwrap_or("none"),
        text: text.to_string(),
    };
    match internet {
        Internet::Ipv4 => {
            let ip: Ipv4Addr = text.parse().map_err(|_| invalid())?;
            address[..4].copy_from_slice(&ip.octets());
        }
        Internet::Ipv6 => {
            let ip: Ipv6Addr = text.parse().map_err(|_| invalid())?;
            address.copy_from_slice(&ip.octets());
        }
        Internet::None => return Err(invalid()),
    }
    Ok(address)
}
