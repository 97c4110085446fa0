//! Attribution of an aggregate liveliness loss to a single entity.
//!
//! The liveliness monitor only reports that the number of alive entities
//! dropped. Which entity went silent is inferred from the heartbeat history:
//! the entity that is most overdue relative to its own cadence is the most
//! likely culprit. This is a best-effort guess bounded by what the history
//! still holds, never a proof.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::events::HeartbeatRecord;
use super::stamp::Stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosisError {
    #[error("no heartbeat evidence with an established cadence")]
    NoEvidence,
}

/// How much the diagnosis can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// The entity has a cadence over several intervals and is late against it.
    Established,
    /// Thin evidence: only one interval observed, or the entity is not
    /// actually late against its cadence.
    Sparse,
}

/// Evidence gathered for one entity out of a history snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspect {
    pub entity_id: i32,
    pub last_seen: Stamp,
    pub samples: usize,
    /// Mean gap between consecutive heartbeats. `None` with a single sample.
    pub mean_interval_nanos: Option<i64>,
    /// Time since the last heartbeat.
    pub overdue_nanos: i64,
}

impl Suspect {
    /// How far past its expected next heartbeat the entity is.
    pub fn lateness_nanos(&self) -> Option<i64> {
        self.mean_interval_nanos
            .map(|mean| self.overdue_nanos.saturating_sub(mean))
    }

    fn rank(&self, other: &Self) -> Ordering {
        let by_evidence = match (self.lateness_nanos(), other.lateness_nanos()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => other.overdue_nanos.cmp(&self.overdue_nanos),
        };
        by_evidence.then(self.entity_id.cmp(&other.entity_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosedLoss {
    pub entity_id: i32,
    pub last_seen: Stamp,
    pub samples: usize,
    pub mean_interval_nanos: i64,
    pub overdue_nanos: i64,
    pub confidence: Confidence,
}

fn mean_interval(timestamps: &[Stamp]) -> Option<i64> {
    if timestamps.len() < 2 {
        return None;
    }
    let total: i128 = timestamps
        .windows(2)
        .map(|pair| pair[1].nanos_since(pair[0]) as i128)
        .sum();
    Some((total / (timestamps.len() as i128 - 1)) as i64)
}

/// Every entity in the snapshot ordered from most to least likely culprit.
///
/// Entities with an established cadence come first, ordered by how far they
/// are behind their own mean interval. Entities seen only once follow,
/// ordered by raw silence. Equal ranks go to the lower entity id.
pub fn rank_suspects(snapshot: &[HeartbeatRecord], now: Stamp) -> Vec<Suspect> {
    let mut per_entity: BTreeMap<i32, Vec<Stamp>> = BTreeMap::new();
    for record in snapshot {
        per_entity
            .entry(record.entity_id)
            .or_default()
            .push(record.timestamp);
    }

    let mut suspects: Vec<Suspect> = per_entity
        .into_iter()
        .filter_map(|(entity_id, timestamps)| {
            let last_seen = *timestamps.last()?;
            Some(Suspect {
                entity_id,
                last_seen,
                samples: timestamps.len(),
                mean_interval_nanos: mean_interval(&timestamps),
                overdue_nanos: now.nanos_since(last_seen),
            })
        })
        .collect();

    suspects.sort_by(Suspect::rank);
    suspects
}

/// The entity most likely responsible for a liveliness loss observed at `now`.
pub fn diagnose(snapshot: &[HeartbeatRecord], now: Stamp) -> Result<DiagnosedLoss, DiagnosisError> {
    let suspects = rank_suspects(snapshot, now);
    let culprit = suspects.first().ok_or(DiagnosisError::NoEvidence)?;
    let (Some(mean_interval_nanos), Some(lateness)) =
        (culprit.mean_interval_nanos, culprit.lateness_nanos())
    else {
        // Only single-sample entities are left.
        return Err(DiagnosisError::NoEvidence);
    };

    let confidence = if lateness > 0 && culprit.samples > 2 {
        Confidence::Established
    } else {
        Confidence::Sparse
    };

    Ok(DiagnosedLoss {
        entity_id: culprit.entity_id,
        last_seen: culprit.last_seen,
        samples: culprit.samples,
        mean_interval_nanos,
        overdue_nanos: culprit.overdue_nanos,
        confidence,
    })
}
