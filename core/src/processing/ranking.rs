use crate::model::{RateSummary, Ranking};
use crate::prelude::DeviceResult;
use crate::store::{Document, Filter, Projection, RecordStore, SortSpec};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// How equal rates translate into positions.
///
/// Ordering itself is always rate descending, then `mac` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiePolicy {
    /// Equal rates share a position: 1 + the number of strictly higher rates.
    #[default]
    Shared,
    /// Position is the 1-based index in the sorted order.
    Ordinal,
}

/// Ranks a device among every device reporting the same sensor type.
pub struct RankingEngine {
    tie_policy: TiePolicy,
    logger: LogManager,
}

impl RankingEngine {
    pub fn new(tie_policy: TiePolicy) -> Self {
        Self {
            tie_policy,
            logger: LogManager::new("ranking"),
        }
    }

    /// Returns `Ok(None)` when no record for `mac` exists under `sensor`.
    ///
    /// When a device has several records for the sensor, its highest rate
    /// is the one ranked.
    pub fn rank(
        &self,
        store: &dyn RecordStore,
        sensor: &str,
        mac: &str,
    ) -> DeviceResult<Option<Ranking>> {
        let documents = store.find_by(
            &Filter::by_sensor(sensor),
            Projection::RateSummary,
            Some(SortSpec),
        )?;
        let summaries: Vec<RateSummary> = documents
            .into_iter()
            .map(Document::into_summary)
            .collect();

        let ranking = self.locate(summaries, mac);
        match ranking {
            Some(found) => self.logger.detail(&format!(
                "{} / {} ranked {} at {:.6} Hz",
                mac, sensor, found.ranking, found.rate
            )),
            None => self
                .logger
                .detail(&format!("{} has no records for sensor {}", mac, sensor)),
        }
        Ok(ranking)
    }

    /// Positions `mac` within `summaries`. The store's ordering is not
    /// trusted; summaries are re-sorted here.
    pub fn locate(&self, mut summaries: Vec<RateSummary>, mac: &str) -> Option<Ranking> {
        let order = SortSpec;
        summaries.sort_by(|a, b| order.compare(a.sort_key(), b.sort_key()));

        let index = summaries.iter().position(|summary| summary.mac == mac)?;
        let rate = summaries[index].rate;
        let ranking = match self.tie_policy {
            TiePolicy::Ordinal => index + 1,
            TiePolicy::Shared => summaries[..index].iter().filter(|s| s.rate > rate).count() + 1,
        };
        Some(Ranking { ranking, rate })
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(TiePolicy::default())
    }
}
