//! Static zone resolver
//!
//! Immutable lookup tables built from one declarative config at startup:
//! forward maps keyed by (qtype, name) plus PTR records synthesized from
//! every address entry. Always authoritative for its scope.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::StaticZoneConfig;
use crate::dns::message::{Request, ResponseSink};
use crate::dns::record::{
    reverse_address, AddressRecord, CnameRecord, Domain, PtrRecord, Record, RecordType, TxtRecord,
};
use crate::dns::resolver::Resolver;
use crate::error::Result;

pub struct StaticResolver {
    entries: HashMap<(RecordType, Domain), Vec<Record>>,
}

impl StaticResolver {
    pub fn from_config(config: &StaticZoneConfig) -> Result<Self> {
        let ttl = config.default_ttl();
        let mut resolver = Self {
            entries: HashMap::new(),
        };

        for (name, ips) in &config.address {
            for ip in ips {
                resolver.insert(Record::Address(AddressRecord {
                    name: name.clone(),
                    ttl,
                    address: *ip,
                }))?;
                resolver.insert(Record::Ptr(PtrRecord {
                    name: reverse_address(ip),
                    ttl,
                    target: name.clone(),
                }))?;
            }
        }

        for (name, targets) in &config.cname {
            for target in targets {
                resolver.insert(Record::Cname(CnameRecord {
                    name: name.clone(),
                    ttl,
                    target: target.clone(),
                }))?;
            }
        }

        for (name, texts) in &config.text {
            for text in texts {
                resolver.insert(Record::Txt(TxtRecord {
                    name: name.clone(),
                    ttl,
                    text: text.clone(),
                }))?;
            }
        }

        for (name, services) in &config.service {
            for service in services {
                resolver.insert(service.to_record(name, ttl)?)?;
            }
        }

        Ok(resolver)
    }

    fn insert(&mut self, record: Record) -> Result<()> {
        record.validate()?;
        self.entries
            .entry((record.qtype(), record.name().clone()))
            .or_default()
            .push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        if let Some(records) = self.entries.get(&(req.qtype, req.name.clone())) {
            for record in records {
                sink.add(record.clone())?;
            }
        }
        Ok(())
    }

    fn recursion_available(&self) -> bool {
        false
    }
}
