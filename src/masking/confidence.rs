// Confidence Merger - merges and scores entities from all detection engines
// Resolves overlapping detections and deduplicates

use std::collections::HashMap;

use tracing::debug;

use crate::masking::entity::{DetectedEntity, DetectionSource, EntityType, ScoredEntity};

struct TypeScore {
    text: String,
    start: usize,
    end: usize,
    confidence_sum: f64,
    count: usize,
    sources: Vec<DetectionSource>,
}

/// Groups overlapping detections, picks the winning type per group and
/// computes the final confidence. The emitted set is non-overlapping and
/// sorted by start; anything else is a merger bug.
pub struct ConfidenceMerger {
    min_confidence: f64,
}

impl ConfidenceMerger {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn merge_and_score(&self, mut entities: Vec<DetectedEntity>) -> Vec<ScoredEntity> {
        if entities.is_empty() {
            return Vec::new();
        }
        let input_count = entities.len();

        entities.sort_by_key(|e| (e.start, std::cmp::Reverse(e.end)));

        let mut scored = Vec::new();
        let mut group: Vec<DetectedEntity> = Vec::new();
        let mut group_end = 0;
        for entity in entities {
            if !group.is_empty() && entity.start < group_end {
                group_end = group_end.max(entity.end);
                group.push(entity);
            } else {
                if let Some(best) = self.score_group(&group) {
                    if best.confidence >= self.min_confidence {
                        scored.push(best);
                    }
                }
                group_end = entity.end;
                group = vec![entity];
            }
        }
        if let Some(best) = self.score_group(&group) {
            if best.confidence >= self.min_confidence {
                scored.push(best);
            }
        }

        scored.sort_by_key(|e| e.start);
        debug_assert!(
            scored.windows(2).all(|w| w[0].end <= w[1].start),
            "merger produced overlapping entities"
        );

        debug!(
            input = input_count,
            output = scored.len(),
            "merged detections"
        );
        scored
    }

    fn score_group(&self, group: &[DetectedEntity]) -> Option<ScoredEntity> {
        if group.is_empty() {
            return None;
        }

        if let [entity] = group {
            return Some(ScoredEntity {
                text: entity.text.clone(),
                entity_type: entity.entity_type,
                start: entity.start,
                end: entity.end,
                confidence: (entity.confidence * entity.source.weight()).min(0.99),
                sources: vec![entity.source],
                priority: entity.entity_type.priority(),
            });
        }

        let mut type_scores: HashMap<EntityType, TypeScore> = HashMap::new();
        for entity in group {
            let weighted = entity.confidence * entity.source.weight();
            let slot = type_scores
                .entry(entity.entity_type)
                .or_insert_with(|| TypeScore {
                    text: entity.text.clone(),
                    start: entity.start,
                    end: entity.end,
                    confidence_sum: 0.0,
                    count: 0,
                    sources: Vec::new(),
                });
            slot.confidence_sum += weighted;
            slot.count += 1;
            if !slot.sources.contains(&entity.source) {
                slot.sources.push(entity.source);
            }
            // Keep the longest surface text observed for the type
            if entity.text.len() > slot.text.len() {
                slot.text = entity.text.clone();
                slot.start = entity.start;
                slot.end = entity.end;
            }
        }

        let mut best: Option<(EntityType, f64)> = None;
        for (entity_type, slot) in &type_scores {
            let multi_source_boost = 1.0 + 0.1 * (slot.count as f64 - 1.0);
            let priority_weight = f64::from(entity_type.priority()) / 10.0;
            let score = (slot.confidence_sum / slot.count as f64)
                * multi_source_boost
                * (1.0 + priority_weight);

            let wins = match &best {
                None => true,
                Some((current, best_score)) => {
                    let current_slot = &type_scores[current];
                    let candidate_slot = slot;
                    if score != *best_score {
                        score > *best_score
                    } else if candidate_slot.text.len() != current_slot.text.len() {
                        // Tie: the longer surface text wins
                        candidate_slot.text.len() > current_slot.text.len()
                    } else {
                        // Then the earlier span
                        candidate_slot.start < current_slot.start
                    }
                }
            };
            if wins {
                best = Some((*entity_type, score));
            }
        }

        let (entity_type, score) = best?;
        let slot = &type_scores[&entity_type];
        Some(ScoredEntity {
            text: slot.text.clone(),
            entity_type,
            start: slot.start,
            end: slot.end,
            confidence: score.min(0.99),
            sources: slot.sources.clone(),
            priority: entity_type.priority(),
        })
    }
}
