use serde::{Deserialize, Serialize};

use crate::model::content::ContentItem;
use crate::model::history::PredictionResult;
use crate::model::knowledge_point::{KnowledgePoint, KpId};

// ---------------------------------------------------------------------------
// Learning path output types
// ---------------------------------------------------------------------------

/// Role of a module within a learning path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prerequisite,
    Target,
    FollowUp,
}

/// One knowledge point's slot in a path, with its ranked content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathModule {
    pub stage: Stage,
    pub kp: KnowledgePoint,
    pub content: Vec<ContentItem>,
    /// True when the catalog had nothing and the content was synthesized.
    pub synthesized: bool,
}

impl PathModule {
    /// Saturates instead of wrapping on absurd durations.
    pub fn minutes(&self) -> u32 {
        self.content
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.est_minutes))
    }
}

/// A complete learning path around a goal knowledge point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub goal: KnowledgePoint,
    pub modules: Vec<PathModule>,
    /// Sum of `est_minutes` over every emitted content item.
    pub total_minutes: u32,
    /// Present only when the goal came from the weakness predictor.
    pub prediction: Option<PredictionResult>,
}

impl LearningPath {
    pub fn new(goal: KnowledgePoint, modules: Vec<PathModule>) -> Self {
        let total_minutes = modules
            .iter()
            .fold(0u32, |acc, module| acc.saturating_add(module.minutes()));
        Self {
            goal,
            modules,
            total_minutes,
            prediction: None,
        }
    }

    pub fn with_prediction(mut self, prediction: PredictionResult) -> Self {
        self.prediction = Some(prediction);
        self
    }

    /// Knowledge point ids in module order.
    pub fn kp_ids(&self) -> Vec<KpId> {
        self.modules.iter().map(|m| m.kp.id).collect()
    }

    pub fn modules_in(&self, stage: Stage) -> impl Iterator<Item = &PathModule> {
        self.modules.iter().filter(move |m| m.stage == stage)
    }
}
