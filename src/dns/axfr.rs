//! Outgoing full zone transfers (AXFR).
//!
//! A transfer is the zone's SOA, then the answers for every non-apex location, then their glue,
//! then the SOA again. The records are streamed to the client in envelopes, i.e. one DNS
//! message each, kept at about [`ENVELOPE_LIMIT`] octets of record data.

use crate::dns::synth::{RecordKind, Synthesizer};
use crate::error::Error;
use crate::zone::APEX;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::warn;
use trust_dns_proto::rr::{Name, Record};
use trust_dns_proto::serialize::binary::BinEncodable;

/// Octets of record data after which an envelope is closed.
pub const ENVELOPE_LIMIT: usize = 1000;

/// Envelopes produced ahead of the connection writer.
const ENVELOPE_QUEUE: usize = 4;

/// Every record of the zone, in transfer order.
pub async fn transfer(synth: &Synthesizer<'_>) -> Result<Vec<Record>, Error> {
    let zone = synth.zone();
    let apex = Name::from_str(&zone.name)?;
    let soa = synth.soa(&apex, synth.apex().await?.as_ref())?;

    let mut answers = Vec::new();
    let mut extras = Vec::new();
    for location in zone.locations.iter().filter(|location| *location != APEX) {
        let owner = match Name::from_str(&zone.fqdn(location)) {
            Ok(owner) => owner,
            Err(err) => {
                warn!(zone = %zone.name, location = %location, "not transferring invalid location: {err}");
                continue;
            }
        };
        let record = synth.store().record(zone, location).await?;
        for kind in RecordKind::TRANSFERRED {
            let synthesized = synth.synthesize(kind, &owner, record.as_ref()).await?;
            answers.extend(synthesized.answers);
            extras.extend(synthesized.extras);
        }
    }

    let mut records = Vec::with_capacity(answers.len() + extras.len() + 2);
    records.push(soa.clone());
    records.extend(answers);
    records.extend(extras);
    records.push(soa);
    Ok(records)
}

/// Groups records into envelopes. An envelope is closed before the record that would take it
/// past the limit, so only an envelope holding a single record can be larger.
#[derive(Debug)]
struct Envelopes {
    limit: usize,
    current: Vec<Record>,
    length: usize,
}

impl Envelopes {
    fn new(limit: usize) -> Self {
        Envelopes {
            limit,
            current: Vec::new(),
            length: 0,
        }
    }

    fn push(&mut self, record: Record) -> Option<Vec<Record>> {
        let length = wire_len(&record);
        let full = if !self.current.is_empty() && self.length + length > self.limit {
            self.length = 0;
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.length += length;
        self.current.push(record);
        full
    }

    fn finish(self) -> Option<Vec<Record>> {
        (!self.current.is_empty()).then_some(self.current)
    }
}

fn wire_len(record: &Record) -> usize {
    record.to_bytes().map_or(0, |bytes| bytes.len())
}

/// Split `records` into envelopes of at most `limit` octets of record data.
pub fn envelopes(records: Vec<Record>, limit: usize) -> Vec<Vec<Record>> {
    let mut envelopes = Envelopes::new(limit);
    let mut out: Vec<Vec<Record>> = records
        .into_iter()
        .filter_map(|record| envelopes.push(record))
        .collect();
    out.extend(envelopes.finish());
    out
}

/// Produce the envelopes of `records` on a separate task. The bounded channel lets the
/// connection writer throttle the producer, and the producer stops once the receiver is gone.
pub fn spawn_envelopes(records: Vec<Record>, limit: usize) -> mpsc::Receiver<Vec<Record>> {
    let (tx, rx) = mpsc::channel(ENVELOPE_QUEUE);
    tokio::spawn(async move {
        let mut envelopes = Envelopes::new(limit);
        for record in records {
            if let Some(envelope) = envelopes.push(record) {
                if tx.send(envelope).await.is_err() {
                    return;
                }
            }
        }
        if let Some(envelope) = envelopes.finish() {
            let _ = tx.send(envelope).await;
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::synth::split_txt;
    use crate::kv_store::{InMemoryKvStore, KvStore, ZoneStore};
    use std::sync::Arc;
    use trust_dns_proto::rr::rdata::TXT;
    use trust_dns_proto::rr::{RData, RecordType};

    async fn zone_store(docs: &[(&str, &str)]) -> ZoneStore {
        let kv = Arc::new(InMemoryKvStore::default());
        for (label, doc) in docs {
            kv.hset("_dns:example.com.", label, doc).await.unwrap();
        }
        ZoneStore::new(kv, "_dns:", "")
    }

    fn txt_record(len: usize) -> Record {
        Record::from_rdata(
            Name::from_str("t.example.com.").unwrap(),
            60,
            RData::TXT(TXT::new(split_txt(&"x".repeat(len)))),
        )
    }

    #[tokio::test]
    async fn transfer_is_bracketed_by_soa() {
        let store = zone_store(&[
            ("@", r#"{"soa": {"ns": "ns1.example.com.", "mbox": "hostmaster.example.com."}, "a": [{"ip": "192.0.2.9"}]}"#),
            ("www", r#"{"a": [{"ip": "192.0.2.1"}], "txt": [{"text": "hello"}]}"#),
            ("mail", r#"{"a": [{"ip": "192.0.2.25"}]}"#),
            ("*.dyn", r#"{"aaaa": [{"ip": "2001:db8::1"}]}"#),
            ("sub", r#"{"mx": [{"host": "mail.example.com.", "preference": 5}]}"#),
        ])
        .await;
        let zone = store.load_zone("example.com.").await.unwrap().unwrap();
        let synth = Synthesizer::new(&store, &zone, 300);
        let records = transfer(&synth).await.unwrap();

        let first = records.first().unwrap();
        let last = records.last().unwrap();
        assert_eq!(first.record_type(), RecordType::SOA);
        assert_eq!(first, last);
        assert_eq!(
            records
                .iter()
                .filter(|rr| rr.record_type() == RecordType::SOA)
                .count(),
            2
        );

        // apex A isn't part of the transfer, every other location is
        let types: Vec<RecordType> = records[1..records.len() - 1]
            .iter()
            .map(Record::record_type)
            .collect();
        assert_eq!(
            types,
            vec![
                RecordType::AAAA, // *.dyn
                RecordType::A,    // mail
                RecordType::MX,   // sub
                RecordType::A,    // www
                RecordType::TXT,  // www
                RecordType::A,    // glue for mail.example.com.
            ]
        );
    }

    #[tokio::test]
    async fn transfer_of_zone_without_soa_uses_default() {
        let store = zone_store(&[("www", r#"{"a": [{"ip": "192.0.2.1"}]}"#)]).await;
        let zone = store.load_zone("example.com.").await.unwrap().unwrap();
        let synth = Synthesizer::new(&store, &zone, 300);
        let records = transfer(&synth).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record_type(), RecordType::SOA);
        assert_eq!(records[0], records[2]);
    }

    #[tokio::test]
    async fn malformed_soa_does_not_abort_transfer() {
        let store = zone_store(&[
            ("@", r#"{"soa": {"ns": "bad..name.", "mbox": "hostmaster.example.com."}}"#),
            ("www", r#"{"a": [{"ip": "192.0.2.1"}]}"#),
        ])
        .await;
        let zone = store.load_zone("example.com.").await.unwrap().unwrap();
        let synth = Synthesizer::new(&store, &zone, 300);
        let records = transfer(&synth).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record_type(), RecordType::SOA);
        assert_eq!(records[1].record_type(), RecordType::A);
    }

    #[test]
    fn envelopes_respect_limit() {
        let records: Vec<Record> = (0..40).map(|_| txt_record(100)).collect();
        let record_len = wire_len(&records[0]);
        let all = envelopes(records.clone(), ENVELOPE_LIMIT);

        assert!(all.len() > 1);
        assert_eq!(all.iter().map(Vec::len).sum::<usize>(), records.len());
        for envelope in &all {
            let length: usize = envelope.iter().map(wire_len).sum();
            assert!(length <= ENVELOPE_LIMIT, "{length}");
        }
        assert_eq!(all[0].len(), ENVELOPE_LIMIT / record_len);
        assert_eq!(all.concat(), records);
    }

    #[test]
    fn oversized_record_travels_alone() {
        let records = vec![txt_record(10), txt_record(1200), txt_record(10)];
        let all = envelopes(records, ENVELOPE_LIMIT);
        assert_eq!(all.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 1, 1]);

        let records = vec![txt_record(10), txt_record(1200)];
        let all = envelopes(records, ENVELOPE_LIMIT);
        assert_eq!(all.len(), 2);
        assert!(all[1].iter().map(wire_len).sum::<usize>() > ENVELOPE_LIMIT);
    }

    #[tokio::test]
    async fn spawned_envelopes_match() {
        let records: Vec<Record> = (0..25).map(|i| txt_record(10 + i * 7)).collect();
        let expected = envelopes(records.clone(), ENVELOPE_LIMIT);

        let mut rx = spawn_envelopes(records, ENVELOPE_LIMIT);
        let mut received = Vec::new();
        while let Some(envelope) = rx.recv().await {
            received.push(envelope);
        }
        assert_eq!(received, expected);
    }
}
