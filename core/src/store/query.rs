use crate::model::{RateSummary, Record};
use std::cmp::Ordering;

/// Selects records by field equality. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub sensor: Option<String>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_sensor(sensor: impl Into<String>) -> Self {
        Self {
            sensor: Some(sensor.into()),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.sensor
            .as_deref()
            .map_or(true, |sensor| record.sensor == sensor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Full,
    /// Only `mac` and `rate`; detection payloads are never copied.
    RateSummary,
}

/// Rate descending, `mac` ascending on equal rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec;

impl SortSpec {
    /// Compares `(rate, mac)` keys.
    pub fn compare(&self, a: (f64, &str), b: (f64, &str)) -> Ordering {
        b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Full(Record),
    Summary(RateSummary),
}

impl Document {
    pub fn mac(&self) -> &str {
        match self {
            Document::Full(record) => &record.mac,
            Document::Summary(summary) => &summary.mac,
        }
    }

    pub fn rate(&self) -> f64 {
        match self {
            Document::Full(record) => record.rate,
            Document::Summary(summary) => summary.rate,
        }
    }

    pub fn sort_key(&self) -> (f64, &str) {
        (self.rate(), self.mac())
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Document::Full(record) => Some(record),
            Document::Summary(_) => None,
        }
    }

    pub fn into_summary(self) -> RateSummary {
        match self {
            Document::Full(record) => RateSummary {
                mac: record.mac,
                rate: record.rate,
            },
            Document::Summary(summary) => summary,
        }
    }
}

/// Runs a query over an in-memory slice of records in insertion order.
pub fn apply<'a, I>(
    records: I,
    filter: &Filter,
    projection: Projection,
    sort: Option<SortSpec>,
) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut documents: Vec<Document> = records
        .into_iter()
        .filter(|record| filter.matches(record))
        .map(|record| match projection {
            Projection::Full => Document::Full(record.clone()),
            Projection::RateSummary => Document::Summary(record.summary()),
        })
        .collect();

    if let Some(order) = sort {
        documents.sort_by(|a, b| order.compare(a.sort_key(), b.sort_key()));
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mac: &str, sensor: &str, rate: f64) -> Record {
        let mut record = Record::new(mac, "", sensor, vec![]);
        record.rate = rate;
        record
    }

    #[test]
    fn filter_and_projection_drop_other_sensors_and_payloads() {
        let records = vec![
            record("a", "temp", 1.0),
            record("b", "humidity", 2.0),
            record("c", "temp", 3.0),
        ];
        let docs = apply(
            &records,
            &Filter::by_sensor("temp"),
            Projection::RateSummary,
            None,
        );
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| matches!(d, Document::Summary(_))));
        assert_eq!(docs[0].mac(), "a");
    }

    #[test]
    fn sort_orders_rate_descending_then_mac() {
        let records = vec![
            record("b", "temp", 1.0),
            record("c", "temp", 5.0),
            record("a", "temp", 1.0),
        ];
        let docs = apply(
            &records,
            &Filter::all(),
            Projection::RateSummary,
            Some(SortSpec),
        );
        let macs: Vec<&str> = docs.iter().map(Document::mac).collect();
        assert_eq!(macs, vec!["c", "a", "b"]);
    }
}
