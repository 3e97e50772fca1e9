use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use crate::emotion::{EmotionKey, EmotionVector};
use crate::state::{StoreSnapshot, VisitId, VisitRecord};

/// One visit as written to a JSONL export
#[derive(Debug, Clone, Serialize)]
pub struct ExportVisit {
    pub id: VisitId,
    pub url: String,

    /// Only the emotions the classifier reported for this visit
    pub emotions: EmotionVector,

    /// Highest-scoring emotion, if any were reported
    pub dominant: Option<EmotionKey>,
}

impl From<VisitRecord> for ExportVisit {
    fn from(record: VisitRecord) -> Self {
        let dominant = record.emotions.dominant().map(|(key, _)| key);
        Self {
            id: record.id,
            url: record.url,
            emotions: record.emotions,
            dominant,
        }
    }
}

/// Write visits as JSONL, one object per line
pub fn export_to_jsonl<W: Write, I: IntoIterator<Item = VisitRecord>>(
    records: I,
    writer: &mut W,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut *writer, &ExportVisit::from(record))?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Aggregate for one emotion across all visits that reported it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionStats {
    /// Visits that carry a score for this emotion
    pub scored: usize,
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub visits: usize,
    /// Visits recorded with no recognized emotion at all
    pub unscored: usize,
    pub emotions: BTreeMap<EmotionKey, EmotionStats>,
    pub dominant_counts: BTreeMap<EmotionKey, usize>,
}

/// Summarize a snapshot. Means are taken over scored visits only; a missing
/// score is unknown, not zero.
pub fn summarize(snapshot: &StoreSnapshot) -> StoreSummary {
    let mut sums: BTreeMap<EmotionKey, (usize, f64, f64)> = BTreeMap::new();
    let mut dominant_counts = BTreeMap::new();
    let mut unscored = 0;

    for visit in snapshot.visits() {
        match visit.emotions.dominant() {
            Some((key, _)) => *dominant_counts.entry(key).or_insert(0) += 1,
            None => unscored += 1,
        }
        for (key, score) in visit.emotions.iter() {
            let entry = sums.entry(key).or_insert((0, 0.0, f64::MIN));
            entry.0 += 1;
            entry.1 += score;
            entry.2 = entry.2.max(score);
        }
    }

    let emotions = EmotionKey::ALL
        .iter()
        .map(|key| {
            let stats = match sums.get(key) {
                Some(&(scored, sum, max)) => EmotionStats {
                    scored,
                    mean: Some(sum / scored as f64),
                    max: Some(max),
                },
                None => EmotionStats {
                    scored: 0,
                    mean: None,
                    max: None,
                },
            };
            (*key, stats)
        })
        .collect();

    StoreSummary {
        visits: snapshot.visit_count(),
        unscored,
        emotions,
        dominant_counts,
    }
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Visits: {} ({} without scores)", self.visits, self.unscored)?;
        for (key, stats) in &self.emotions {
            match stats.mean {
                Some(mean) => writeln!(
                    f,
                    "  {:<9} scored {:>5}  mean {:.3}  dominant {}",
                    key.as_str(),
                    stats.scored,
                    mean,
                    self.dominant_counts.get(key).copied().unwrap_or(0)
                )?,
                None => writeln!(f, "  {:<9} no scores", key.as_str())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::merge_visit;

    fn snapshot_with(visits: &[(&str, EmotionVector)]) -> StoreSnapshot {
        visits
            .iter()
            .fold(StoreSnapshot::default(), |current, (url, emotions)| {
                merge_visit(&current, url, emotions).1
            })
    }

    #[test]
    fn test_export_visits_to_jsonl() {
        let snapshot = snapshot_with(&[
            (
                "https://a.example",
                EmotionVector::new()
                    .with(EmotionKey::Joy, 0.9)
                    .with(EmotionKey::Fear, 0.1),
            ),
            ("https://b.example", EmotionVector::new().with(EmotionKey::Anger, 0.8)),
        ]);

        let mut buffer = Vec::new();
        let written = export_to_jsonl(snapshot.visits(), &mut buffer).unwrap();
        assert_eq!(written, 2);

        let output = String::from_utf8(buffer).unwrap();
        assert!(output.ends_with('\n'));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["url"], "https://a.example");
        assert_eq!(first["emotions"]["joy"], 0.9);
        assert_eq!(first["emotions"]["fear"], 0.1);
        assert!(first["emotions"].get("anger").is_none());
        assert_eq!(first["dominant"], "joy");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], 2);
        assert_eq!(second["dominant"], "anger");
    }

    #[test]
    fn test_export_empty_store() {
        let mut buffer = Vec::new();
        let written = export_to_jsonl(StoreSnapshot::default().visits(), &mut buffer).unwrap();
        assert_eq!(written, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_visit_without_scores_exports_null_dominant() {
        let snapshot = snapshot_with(&[("https://quiet.example", EmotionVector::new())]);
        let mut buffer = Vec::new();
        export_to_jsonl(snapshot.visits(), &mut buffer).unwrap();

        let line: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(line["emotions"], serde_json::json!({}));
        assert!(line["dominant"].is_null());
    }

    #[test]
    fn test_summary_means_skip_absent_scores() {
        let snapshot = snapshot_with(&[
            ("https://a.example", EmotionVector::new().with(EmotionKey::Joy, 0.8)),
            (
                "https://b.example",
                EmotionVector::new()
                    .with(EmotionKey::Joy, 0.4)
                    .with(EmotionKey::Sadness, 0.6),
            ),
            ("https://c.example", EmotionVector::new()),
        ]);

        let summary = summarize(&snapshot);
        assert_eq!(summary.visits, 3);
        assert_eq!(summary.unscored, 1);

        let joy = &summary.emotions[&EmotionKey::Joy];
        assert_eq!(joy.scored, 2);
        assert!((joy.mean.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(joy.max, Some(0.8));

        // Only one visit has sadness; the other two do not drag the mean down.
        let sadness = &summary.emotions[&EmotionKey::Sadness];
        assert_eq!(sadness.scored, 1);
        assert_eq!(sadness.mean, Some(0.6));

        let anger = &summary.emotions[&EmotionKey::Anger];
        assert_eq!(anger.scored, 0);
        assert_eq!(anger.mean, None);

        assert_eq!(summary.dominant_counts.get(&EmotionKey::Joy), Some(&1));
        assert_eq!(summary.dominant_counts.get(&EmotionKey::Sadness), Some(&1));
        assert_eq!(summary.emotions.len(), 6);
    }

    #[test]
    fn test_summary_display() {
        let snapshot = snapshot_with(&[(
            "https://a.example",
            EmotionVector::new().with(EmotionKey::Surprise, 0.5),
        )]);
        let text = summarize(&snapshot).to_string();
        assert!(text.starts_with("Visits: 1 (0 without scores)"));
        assert!(text.contains("surprise"));
        assert!(text.contains("anger     no scores"));
    }
}
