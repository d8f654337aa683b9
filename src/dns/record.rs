//! DNS record model
//!
//! Typed record variants with a zone-file text form, plus the domain name
//! type used across the resolver pipeline. The text form `NAME TTL IN QTYPE
//! RDATA` is what the dynamic store persists and what the HTTP control plane
//! speaks; `to_rr`/`from_rr` bridge to the wire types of hickory-proto.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use hickory_proto::rr::rdata::{self, SRV, TXT};
use hickory_proto::rr::{Name, RData, Record as WireRecord, RecordType as WireRecordType};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default TTL applied where a record source does not specify one.
pub const DEFAULT_TTL: u32 = 3600;

/// A domain name, held fully-qualified (trailing dot) with case preserved.
///
/// Equality and hashing are on the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labels without the root (`example.com.` yields `["example", "com"]`).
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.trim_end_matches('.').split('.')
    }

    /// Hierarchical storage key: labels reversed and joined with `/`.
    ///
    /// `example.com.` becomes `/com/example`.
    pub fn to_path(&self) -> String {
        let mut labels: Vec<&str> = self.labels().collect();
        labels.reverse();
        format!("/{}", labels.join("/"))
    }

    fn validate(s: &str) -> Result<(), Error> {
        let trimmed = s.trim_end_matches('.');
        if trimmed.is_empty() || s.len() > 255 {
            return Err(Error::Argument(format!("invalid domain: \"{}\"", s)));
        }
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > 63 {
                return Err(Error::Argument(format!("invalid domain: \"{}\"", s)));
            }
            if !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*')
            {
                return Err(Error::Argument(format!("invalid domain: \"{}\"", s)));
            }
        }
        Ok(())
    }

    fn to_name(&self) -> Result<Name, Error> {
        Name::from_str(&self.0).map_err(Error::from)
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Argument(format!("invalid domain: \"{}\"", s)));
        }
        let fqdn = if s.ends_with('.') {
            s.to_string()
        } else {
            format!("{}.", s)
        };
        Self::validate(&fqdn)?;
        Ok(Domain(fqdn))
    }
}

impl TryFrom<String> for Domain {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> String {
        d.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The reverse-lookup domain for an address (`127.1.2.3` maps to
/// `3.2.1.127.in-addr.arpa.`).
pub fn reverse_address(ip: &IpAddr) -> Domain {
    let name = match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles = String::with_capacity(64);
            for byte in v6.octets().iter().rev() {
                nibbles.push_str(&format!("{:x}.{:x}.", byte & 0x0f, byte >> 4));
            }
            format!("{}ip6.arpa.", nibbles)
        }
    };
    Domain(name)
}

/// Supported DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    PTR,
    TXT,
    SRV,
    NS,
    MX,
}

impl RecordType {
    /// Convert to the hickory-proto record type
    pub fn to_wire(&self) -> WireRecordType {
        match self {
            RecordType::A => WireRecordType::A,
            RecordType::AAAA => WireRecordType::AAAA,
            RecordType::CNAME => WireRecordType::CNAME,
            RecordType::PTR => WireRecordType::PTR,
            RecordType::TXT => WireRecordType::TXT,
            RecordType::SRV => WireRecordType::SRV,
            RecordType::NS => WireRecordType::NS,
            RecordType::MX => WireRecordType::MX,
        }
    }

    /// Convert from the hickory-proto record type; `None` for anything this
    /// server does not serve.
    pub fn from_wire(rt: WireRecordType) -> Option<Self> {
        match rt {
            WireRecordType::A => Some(RecordType::A),
            WireRecordType::AAAA => Some(RecordType::AAAA),
            WireRecordType::CNAME => Some(RecordType::CNAME),
            WireRecordType::PTR => Some(RecordType::PTR),
            WireRecordType::TXT => Some(RecordType::TXT),
            WireRecordType::SRV => Some(RecordType::SRV),
            WireRecordType::NS => Some(RecordType::NS),
            WireRecordType::MX => Some(RecordType::MX),
            _ => None,
        }
    }

    /// All supported record types
    pub fn all() -> &'static [RecordType] {
        &[
            RecordType::A,
            RecordType::AAAA,
            RecordType::CNAME,
            RecordType::PTR,
            RecordType::TXT,
            RecordType::SRV,
            RecordType::NS,
            RecordType::MX,
        ]
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::PTR => "PTR",
            RecordType::TXT => "TXT",
            RecordType::SRV => "SRV",
            RecordType::NS => "NS",
            RecordType::MX => "MX",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "PTR" => Ok(RecordType::PTR),
            "TXT" => Ok(RecordType::TXT),
            "SRV" => Ok(RecordType::SRV),
            "NS" => Ok(RecordType::NS),
            "MX" => Ok(RecordType::MX),
            _ => Err(Error::Argument(format!("unsupported record type: {}", s))),
        }
    }
}

/// An A or AAAA record; the variant on the wire follows the address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub name: Domain,
    pub ttl: u32,
    pub address: IpAddr,
}

impl AddressRecord {
    pub fn is_v4(&self) -> bool {
        self.address.is_ipv4()
    }
}

/// A CNAME record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnameRecord {
    pub name: Domain,
    pub ttl: u32,
    pub target: Domain,
}

/// A PTR record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtrRecord {
    pub name: Domain,
    pub ttl: u32,
    pub target: Domain,
}

/// A TXT record holding a single character-string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    pub name: Domain,
    pub ttl: u32,
    pub text: String,
}

/// An SRV record; the name is expected to encode service and protocol
/// (`_svc._proto.host`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub name: Domain,
    pub ttl: u32,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Domain,
}

/// An NS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsRecord {
    pub name: Domain,
    pub ttl: u32,
    pub target: Domain,
}

/// An MX record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub name: Domain,
    pub ttl: u32,
    pub preference: u16,
    pub target: Domain,
}

/// A typed DNS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Address(AddressRecord),
    Cname(CnameRecord),
    Ptr(PtrRecord),
    Txt(TxtRecord),
    Srv(SrvRecord),
    Ns(NsRecord),
    Mx(MxRecord),
}

impl Record {
    pub fn name(&self) -> &Domain {
        match self {
            Record::Address(r) => &r.name,
            Record::Cname(r) => &r.name,
            Record::Ptr(r) => &r.name,
            Record::Txt(r) => &r.name,
            Record::Srv(r) => &r.name,
            Record::Ns(r) => &r.name,
            Record::Mx(r) => &r.name,
        }
    }

    pub fn ttl(&self) -> u32 {
        match self {
            Record::Address(r) => r.ttl,
            Record::Cname(r) => r.ttl,
            Record::Ptr(r) => r.ttl,
            Record::Txt(r) => r.ttl,
            Record::Srv(r) => r.ttl,
            Record::Ns(r) => r.ttl,
            Record::Mx(r) => r.ttl,
        }
    }

    pub fn set_ttl(&mut self, ttl: u32) {
        match self {
            Record::Address(r) => r.ttl = ttl,
            Record::Cname(r) => r.ttl = ttl,
            Record::Ptr(r) => r.ttl = ttl,
            Record::Txt(r) => r.ttl = ttl,
            Record::Srv(r) => r.ttl = ttl,
            Record::Ns(r) => r.ttl = ttl,
            Record::Mx(r) => r.ttl = ttl,
        }
    }

    pub fn qtype(&self) -> RecordType {
        match self {
            Record::Address(r) => {
                if r.is_v4() {
                    RecordType::A
                } else {
                    RecordType::AAAA
                }
            }
            Record::Cname(_) => RecordType::CNAME,
            Record::Ptr(_) => RecordType::PTR,
            Record::Txt(_) => RecordType::TXT,
            Record::Srv(_) => RecordType::SRV,
            Record::Ns(_) => RecordType::NS,
            Record::Mx(_) => RecordType::MX,
        }
    }

    /// Variant-specific validation; every stored record must pass this.
    pub fn validate(&self) -> Result<(), Error> {
        Domain::validate(self.name().as_str())?;
        match self {
            Record::Address(_) | Record::Txt(_) => Ok(()),
            Record::Cname(r) => Domain::validate(r.target.as_str()),
            Record::Ptr(r) => Domain::validate(r.target.as_str()),
            Record::Ns(r) => Domain::validate(r.target.as_str()),
            Record::Mx(r) => Domain::validate(r.target.as_str()),
            Record::Srv(r) => {
                if r.port == 0 {
                    return Err(Error::Argument(format!("invalid port: \"{}\"", r.port)));
                }
                Domain::validate(r.target.as_str())
            }
        }
    }

    /// Convert to a hickory-proto resource record.
    pub fn to_rr(&self) -> Result<WireRecord, Error> {
        let name = self.name().to_name()?;
        let ttl = self.ttl();
        let rdata = match self {
            Record::Address(r) => match r.address {
                IpAddr::V4(ip) => RData::A(ip.into()),
                IpAddr::V6(ip) => RData::AAAA(ip.into()),
            },
            Record::Cname(r) => RData::CNAME(rdata::CNAME(r.target.to_name()?)),
            Record::Ptr(r) => RData::PTR(rdata::PTR(r.target.to_name()?)),
            Record::Txt(r) => RData::TXT(TXT::new(vec![r.text.clone()])),
            Record::Srv(r) => RData::SRV(SRV::new(
                r.priority,
                r.weight,
                r.port,
                r.target.to_name()?,
            )),
            Record::Ns(r) => RData::NS(rdata::NS(r.target.to_name()?)),
            Record::Mx(r) => RData::MX(rdata::MX::new(r.preference, r.target.to_name()?)),
        };
        Ok(WireRecord::from_rdata(name, ttl, rdata))
    }

    /// Convert from a hickory-proto resource record. Types outside the
    /// supported set yield an argument error.
    pub fn from_rr(rr: &WireRecord) -> Result<Record, Error> {
        let name: Domain = rr.name().to_string().parse()?;
        let ttl = rr.ttl();
        let record = match rr.data() {
            RData::A(a) => Record::Address(AddressRecord {
                name,
                ttl,
                address: IpAddr::V4(a.0),
            }),
            RData::AAAA(a) => Record::Address(AddressRecord {
                name,
                ttl,
                address: IpAddr::V6(a.0),
            }),
            RData::CNAME(c) => Record::Cname(CnameRecord {
                name,
                ttl,
                target: c.0.to_string().parse()?,
            }),
            RData::PTR(p) => Record::Ptr(PtrRecord {
                name,
                ttl,
                target: p.0.to_string().parse()?,
            }),
            RData::TXT(t) => {
                let text = t
                    .txt_data()
                    .first()
                    .map(|d| String::from_utf8_lossy(d).into_owned())
                    .unwrap_or_default();
                Record::Txt(TxtRecord { name, ttl, text })
            }
            RData::SRV(s) => Record::Srv(SrvRecord {
                name,
                ttl,
                priority: s.priority(),
                weight: s.weight(),
                port: s.port(),
                target: s.target().to_string().parse()?,
            }),
            RData::NS(n) => Record::Ns(NsRecord {
                name,
                ttl,
                target: n.0.to_string().parse()?,
            }),
            RData::MX(m) => Record::Mx(MxRecord {
                name,
                ttl,
                preference: m.preference(),
                target: m.exchange().to_string().parse()?,
            }),
            _ => {
                return Err(Error::Argument(format!(
                    "unsupported record type: {}",
                    rr.record_type()
                )))
            }
        };
        Ok(record)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Address(r) => {
                let qtype = if r.is_v4() { "A" } else { "AAAA" };
                write!(f, "{} {} IN {} {}", r.name, r.ttl, qtype, r.address)
            }
            Record::Cname(r) => write!(f, "{} {} IN CNAME {}", r.name, r.ttl, r.target),
            Record::Ptr(r) => write!(f, "{} {} IN PTR {}", r.name, r.ttl, r.target),
            Record::Txt(r) => write!(f, "{} {} IN TXT \"{}\"", r.name, r.ttl, r.text),
            Record::Srv(r) => write!(
                f,
                "{} {} IN SRV {} {} {} {}",
                r.name, r.ttl, r.priority, r.weight, r.port, r.target
            ),
            Record::Ns(r) => write!(f, "{} {} IN NS {}", r.name, r.ttl, r.target),
            Record::Mx(r) => write!(f, "{} {} IN MX {} {}", r.name, r.ttl, r.preference, r.target),
        }
    }
}

fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => Some((&s[..i], &s[i..])),
        None => Some((s, "")),
    }
}

impl FromStr for Record {
    type Err = Error;

    /// Parse one line of zone-file syntax: `NAME [TTL] IN QTYPE RDATA`.
    /// A missing TTL falls back to [`DEFAULT_TTL`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Argument(format!("invalid format: {}", s.trim()));

        let (name_tok, rest) = split_token(s).ok_or_else(invalid)?;
        let name: Domain = name_tok.parse().map_err(|_| invalid())?;

        let (tok, rest) = split_token(rest).ok_or_else(invalid)?;
        let (ttl, rest) = if tok.eq_ignore_ascii_case("IN") {
            (DEFAULT_TTL, rest)
        } else {
            let ttl: u32 = tok.parse().map_err(|_| invalid())?;
            let (class_tok, rest) = split_token(rest).ok_or_else(invalid)?;
            if !class_tok.eq_ignore_ascii_case("IN") {
                return Err(invalid());
            }
            (ttl, rest)
        };

        let (qtype_tok, rdata) = split_token(rest).ok_or_else(invalid)?;
        let qtype: RecordType = qtype_tok.parse().map_err(|_| invalid())?;
        let rdata = rdata.trim();
        if rdata.is_empty() {
            return Err(invalid());
        }

        let record = match qtype {
            RecordType::A | RecordType::AAAA => {
                let address: IpAddr = rdata.parse().map_err(|_| invalid())?;
                if (qtype == RecordType::A) != address.is_ipv4() {
                    return Err(invalid());
                }
                Record::Address(AddressRecord { name, ttl, address })
            }
            RecordType::CNAME => Record::Cname(CnameRecord {
                name,
                ttl,
                target: rdata.parse().map_err(|_| invalid())?,
            }),
            RecordType::PTR => Record::Ptr(PtrRecord {
                name,
                ttl,
                target: rdata.parse().map_err(|_| invalid())?,
            }),
            RecordType::NS => Record::Ns(NsRecord {
                name,
                ttl,
                target: rdata.parse().map_err(|_| invalid())?,
            }),
            RecordType::TXT => {
                let text = if rdata.len() >= 2 && rdata.starts_with('"') && rdata.ends_with('"') {
                    rdata[1..rdata.len() - 1].to_string()
                } else {
                    rdata.to_string()
                };
                Record::Txt(TxtRecord { name, ttl, text })
            }
            RecordType::SRV => {
                let fields: Vec<&str> = rdata.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(invalid());
                }
                Record::Srv(SrvRecord {
                    name,
                    ttl,
                    priority: fields[0].parse().map_err(|_| invalid())?,
                    weight: fields[1].parse().map_err(|_| invalid())?,
                    port: fields[2].parse().map_err(|_| invalid())?,
                    target: fields[3].parse().map_err(|_| invalid())?,
                })
            }
            RecordType::MX => {
                let fields: Vec<&str> = rdata.split_whitespace().collect();
                if fields.len() != 2 {
                    return Err(invalid());
                }
                Record::Mx(MxRecord {
                    name,
                    ttl,
                    preference: fields[0].parse().map_err(|_| invalid())?,
                    target: fields[1].parse().map_err(|_| invalid())?,
                })
            }
        };

        record.validate()?;
        Ok(record)
    }
}
