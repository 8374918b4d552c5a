//! Consultant similarity from cumulated mission experience
//!
//! Features are vectorized over their sorted names, min-max scaled to [0, 1]
//! and compared with brute-force cosine k-nearest neighbours.

use crate::error::CoreError;
use crate::models::{ConsultantId, Dataset, LeadId, MissionNature};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Neighbours returned by a prediction; also the minimum population to fit a model
pub const NEIGHBOURS: usize = 5;

/// Feature name to value; tags, profile level, company, manager and experience
pub type ExperienceFeatures = BTreeMap<String, f64>;

/// Experience of a consultant, weighted down as it ages
///
/// Each lead worked on adds its time spent to every lead tag, divided by the square
/// root of the months since the last day on it and doubled for the lead or mission
/// responsible.
pub fn consultant_cumulated_experience(
    ds: &Dataset,
    consultant_id: ConsultantId,
    today: NaiveDate,
) -> Result<ExperienceFeatures, CoreError> {
    let consultant = ds.consultant(consultant_id)?;

    let mut per_lead: BTreeMap<LeadId, (f64, NaiveDate)> = BTreeMap::new();
    let mut span: Option<(NaiveDate, NaiveDate)> = None;
    for t in ds.timesheets.iter().filter(|t| t.consultant_id == consultant.id) {
        let Some(mission) = ds.missions.get(&t.mission_id) else {
            continue;
        };
        if mission.nature != MissionNature::Prod {
            continue;
        }
        span = Some(match span {
            Some((first, last)) => (first.min(t.working_date), last.max(t.working_date)),
            None => (t.working_date, t.working_date),
        });
        if let Some(lead_id) = mission.lead_id {
            let entry = per_lead.entry(lead_id).or_insert((0.0, t.working_date));
            entry.0 += t.charge;
            entry.1 = entry.1.max(t.working_date);
        }
    }

    let mut features = ExperienceFeatures::new();
    for (lead_id, (charge, end)) in per_lead {
        let Some(lead) = ds.leads.get(&lead_id) else {
            continue;
        };
        let months = (today - end).num_days() as f64 / 30.0;
        let mut weighted = charge / months.max(1.0).sqrt();
        let responsible = lead.responsible_id == Some(consultant.id)
            || ds
                .missions
                .values()
                .any(|m| m.lead_id == Some(lead_id) && m.responsible_id == Some(consultant.id));
        if responsible {
            weighted *= 2.0;
        }
        for tag in &lead.tags {
            *features.entry(tag.clone()).or_default() += weighted;
        }
    }

    features.insert("Profil".to_string(), ds.profile_level(consultant) as f64);
    features.insert(ds.subsidiary_name(consultant.company_id), 1.0);
    if let Some(manager) = consultant.manager_id.and_then(|id| ds.consultants.get(&id)) {
        features.insert(manager.trigramme.clone(), 1.0);
    }
    let experience = span.map_or(0, |(first, last)| (last - first).num_days());
    features.insert("experience".to_string(), experience as f64);
    Ok(features)
}

fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Nearest neighbour model fitted on the productive workforce
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityModel {
    feature_names: Vec<String>,
    min: Vec<f64>,
    /// max - min, 1 where the feature is constant
    range: Vec<f64>,
    /// Scaled sample vectors, aligned with `consultant_ids`
    samples: Vec<Vec<f64>>,
    consultant_ids: Vec<ConsultantId>,
}

impl SimilarityModel {
    /// Fit on active, productive, non subcontractor consultants
    ///
    /// `None` with fewer than [`NEIGHBOURS`] of them.
    pub fn fit(ds: &Dataset, today: NaiveDate) -> Option<Self> {
        let samples: Vec<(ConsultantId, ExperienceFeatures)> = ds
            .productive_consultants()
            .into_iter()
            .filter_map(|c| {
                consultant_cumulated_experience(ds, c.id, today)
                    .ok()
                    .map(|f| (c.id, f))
            })
            .collect();
        Self::fit_features(samples)
    }

    pub fn fit_features(samples: Vec<(ConsultantId, ExperienceFeatures)>) -> Option<Self> {
        if samples.len() < NEIGHBOURS {
            debug!(samples = samples.len(), "Not enough consultants to fit a similarity model");
            return None;
        }
        let feature_names: Vec<String> = samples
            .iter()
            .flat_map(|(_, f)| f.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let raw: Vec<Vec<f64>> = samples
            .iter()
            .map(|(_, f)| vectorize(&feature_names, f))
            .collect();
        let mut min = vec![f64::INFINITY; feature_names.len()];
        let mut max = vec![f64::NEG_INFINITY; feature_names.len()];
        for row in &raw {
            for (i, value) in row.iter().enumerate() {
                min[i] = min[i].min(*value);
                max[i] = max[i].max(*value);
            }
        }
        let range = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| if hi > lo { hi - lo } else { 1.0 })
            .collect();

        let mut model = Self {
            feature_names,
            min,
            range,
            samples: Vec::new(),
            consultant_ids: samples.iter().map(|(id, _)| *id).collect(),
        };
        model.samples = raw.iter().map(|row| model.scale(row)).collect();
        debug!(
            consultants = model.consultant_ids.len(),
            features = model.feature_names.len(),
            "Similarity model fitted"
        );
        Some(model)
    }

    pub fn consultant_ids(&self) -> &[ConsultantId] {
        &self.consultant_ids
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn scale(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.min.iter().zip(&self.range))
            .map(|(value, (min, range))| (value - min) / range)
            .collect()
    }

    /// Consultants closest to `features`, nearest first
    ///
    /// Features unknown to the model are ignored. Without `scale` the raw
    /// values are compared to the scaled samples.
    pub fn predict_similar(&self, features: &ExperienceFeatures, scale: bool) -> Vec<ConsultantId> {
        let mut vector = vectorize(&self.feature_names, features);
        if scale {
            vector = self.scale(&vector);
        }
        let mut distances: Vec<(f64, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, sample)| (cosine_distance(&vector, sample), i))
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances
            .into_iter()
            .take(NEIGHBOURS)
            .map(|(_, i)| self.consultant_ids[i])
            .collect()
    }
}

fn vectorize(feature_names: &[String], features: &ExperienceFeatures) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| features.get(name).copied().unwrap_or(0.0))
        .collect()
}

/// Consultants similar to the given one, nearest first, the consultant excluded
pub fn predict_similar_consultant(
    ds: &Dataset,
    model: &SimilarityModel,
    consultant_id: ConsultantId,
    today: NaiveDate,
) -> Result<Vec<ConsultantId>, CoreError> {
    let features = consultant_cumulated_experience(ds, consultant_id, today)?;
    Ok(model
        .predict_similar(&features, true)
        .into_iter()
        .filter(|id| *id != consultant_id)
        .collect())
}
