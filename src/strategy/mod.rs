//! Strategy engine: indicators, feature extraction and scoring.
//!
//! Everything in here is pure. Given the same candles, order-book snapshots
//! and context, the pipeline yields a bit-identical `ScoreResult`.

pub mod features;
pub mod indicators;
pub mod scoring;

use crate::types::ScoreResult;
use features::{FeatureExtractor, FeatureInput, FeatureSet};
use scoring::{InitiationSignal, ScoringEngine};

/// Outcome of running the whole pipeline for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub features: FeatureSet,
    pub score: ScoreResult,
    pub initiation: Option<InitiationSignal>,
}

/// Feature extraction → scoring → initiation check, as one step.
pub struct Pipeline {
    extractor: FeatureExtractor,
    engine: ScoringEngine,
}

impl Pipeline {
    pub fn new(extractor: FeatureExtractor, engine: ScoringEngine) -> Self {
        Self { extractor, engine }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn evaluate(&self, input: &FeatureInput<'_>) -> Evaluation {
        let features = self.extractor.extract(input);
        let score = self.engine.score(&features);
        let initiation = self.engine.detect_initiation(input.intraday);
        Evaluation { features, score, initiation }
    }
}
