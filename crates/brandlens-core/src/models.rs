//! Passive data carried between the backend and the dashboard surfaces.
//!
//! Everything here is precomputed server-side; the client only stores and
//! renders it.

use serde::{Deserialize, Serialize};

/// A workspace/application the logged-in user belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
}

/// A product (brand/site) that can be analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Share of positive/neutral/negative mentions, each in 0..=1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

/// One competitor row in the visibility comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorRank {
    pub name: String,
    pub visibility_score: f64,
    pub rank: u32,
}

/// A cited source surfaced by the AI responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCitation {
    pub url: String,
    pub title: String,
    pub mentions: u32,
}

/// The precomputed analytics payload returned by the status endpoint once
/// an analysis run has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityReport {
    pub resource_id: String,
    pub visibility_score: f64,
    #[serde(default)]
    pub sentiment: SentimentBreakdown,
    #[serde(default)]
    pub competitors: Vec<CompetitorRank>,
    #[serde(default)]
    pub citations: Vec<SourceCitation>,
    /// Epoch millis the report was generated at, server clock.
    pub generated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_deserializes_with_missing_optional_sections() {
        let json = r#"{
            "resourceId": "prod-42",
            "visibilityScore": 61.5,
            "generatedAt": 1700000000000
        }"#;
        let report: VisibilityReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.resource_id, "prod-42");
        assert!(report.competitors.is_empty());
        assert!(report.citations.is_empty());
        assert_eq!(report.sentiment, SentimentBreakdown::default());
    }

    #[test]
    fn test_product_roundtrip_uses_camel_case() {
        let product = Product {
            id: "p1".into(),
            name: "Acme".into(),
            domain: Some("acme.io".into()),
        };
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("\"domain\""));
        let back: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }
}
