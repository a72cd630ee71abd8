use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    #[default]
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    const MEDIUM_THRESHOLD: f64 = 0.4;
    const HIGH_THRESHOLD: f64 = 0.75;

    /// Buckets a normalized score for engines that report numeric confidence.
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() || score < Self::MEDIUM_THRESHOLD {
            ConfidenceTier::Low
        } else if score < Self::HIGH_THRESHOLD {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::High
        }
    }
}

/// Incremental view of a running capture, refreshed on every engine progress callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub surface_count: u32,
    pub object_count: u32,
    pub confidence_tier: ConfidenceTier,
}

/// Room extents in metres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoomDimensions {
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

impl RoomDimensions {
    pub fn floor_area(&self) -> f64 {
        self.width * self.length
    }

    pub fn volume(&self) -> f64 {
        self.width * self.length * self.height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedSurface {
    pub category: String,
    pub confidence: ConfidenceTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedObject {
    pub category: String,
    pub confidence: ConfidenceTier,
    pub dimensions: Option<RoomDimensions>,
}

/// Unrefined capture data. The engine token is meaningful only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawCapture {
    pub token: String,
}

/// Processed result held in memory until the user decides to save it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRoom {
    pub token: String,
    pub confidence: ConfidenceTier,
    pub dimensions: Option<RoomDimensions>,
    #[serde(default)]
    pub surfaces: Vec<CapturedSurface>,
    #[serde(default)]
    pub objects: Vec<CapturedObject>,
}

impl ProcessedRoom {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            surface_count: self.surfaces.len() as u32,
            object_count: self.objects.len() as u32,
            dimensions: self.dimensions,
            floor_area: self.dimensions.map(|d| d.floor_area()),
            volume: self.dimensions.map(|d| d.volume()),
            confidence: self.confidence,
            room_type: RoomType::infer(self.objects.iter().map(|o| o.category.as_str())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Bedroom,
    Kitchen,
    Bathroom,
    LivingRoom,
    DiningRoom,
    Unknown,
}

impl RoomType {
    /// Guesses the room's purpose from the furniture the engine classified.
    pub fn infer<'a>(categories: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: Vec<String> = categories
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let has = |name: &str| categories.iter().any(|c| c == name);

        if has("bed") {
            RoomType::Bedroom
        } else if has("stove") || has("refrigerator") || has("oven") {
            RoomType::Kitchen
        } else if has("toilet") || has("bathtub") {
            RoomType::Bathroom
        } else if has("sofa") || has("television") {
            RoomType::LivingRoom
        } else if has("table") && has("chair") {
            RoomType::DiningRoom
        } else {
            RoomType::Unknown
        }
    }
}

/// Summary returned to callers alongside a committed scene file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub surface_count: u32,
    pub object_count: u32,
    pub dimensions: Option<RoomDimensions>,
    pub floor_area: Option<f64>,
    pub volume: Option<f64>,
    pub confidence: ConfidenceTier,
    pub room_type: RoomType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(category: &str) -> CapturedObject {
        CapturedObject {
            category: category.into(),
            confidence: ConfidenceTier::High,
            dimensions: None,
        }
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(ConfidenceTier::from_score(0.1), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(0.5), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.9), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(f64::NAN), ConfidenceTier::Low);
    }

    #[test]
    fn room_type_prefers_bed_over_other_furniture() {
        assert_eq!(RoomType::infer(["chair", "Bed", "table"]), RoomType::Bedroom);
        assert_eq!(RoomType::infer(["refrigerator"]), RoomType::Kitchen);
        assert_eq!(RoomType::infer(["table", "chair"]), RoomType::DiningRoom);
        assert_eq!(RoomType::infer(["storage"]), RoomType::Unknown);
    }

    #[test]
    fn summary_counts_and_measures_room() {
        let room = ProcessedRoom {
            token: "room-1".into(),
            confidence: ConfidenceTier::Medium,
            dimensions: Some(RoomDimensions {
                width: 3.0,
                height: 2.5,
                length: 4.0,
            }),
            surfaces: vec![
                CapturedSurface {
                    category: "wall".into(),
                    confidence: ConfidenceTier::High,
                },
                CapturedSurface {
                    category: "floor".into(),
                    confidence: ConfidenceTier::High,
                },
            ],
            objects: vec![object("sofa")],
        };

        let summary = room.summary();
        assert_eq!(summary.surface_count, 2);
        assert_eq!(summary.object_count, 1);
        assert_eq!(summary.floor_area, Some(12.0));
        assert_eq!(summary.volume, Some(30.0));
        assert_eq!(summary.room_type, RoomType::LivingRoom);
    }
}
