use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::model::{ContentItem, ContentKind, KnowledgePoint};

const KIND_CYCLE: [ContentKind; 4] = [
    ContentKind::Video,
    ContentKind::Reading,
    ContentKind::Quiz,
    ContentKind::Practice,
];

/// Deterministic stand-in content for a knowledge point with nothing in the
/// catalog. The same `(kp, seed)` always yields the same items.
pub fn synthesize(kp: &KnowledgePoint, seed: u64, count: usize) -> Vec<ContentItem> {
    let mut hasher = Sha256::new();
    hasher.update(kp.id.to_le_bytes());
    hasher.update(seed.to_le_bytes());
    let mut rng = StdRng::from_seed(hasher.finalize().into());

    (0..count)
        .map(|i| {
            let kind = KIND_CYCLE[i % KIND_CYCLE.len()].clone();
            let id = format!("placeholder-{}-{}", kp.id, i + 1);
            ContentItem {
                title: format!("{} {}: {}", kind_title(&kind), i + 1, kp.name),
                url: format!("https://example.com/{id}"),
                id,
                kind,
                kp_id: kp.id,
                est_minutes: rng.gen_range(5..=15),
                difficulty: rng.gen_range(1..=3),
                metadata: json!({"generated": true, "seed": seed})
                    .as_object()
                    .cloned(),
            }
        })
        .collect()
}

fn kind_title(kind: &ContentKind) -> &'static str {
    match kind {
        ContentKind::Video => "Video",
        ContentKind::Reading => "Reading",
        ContentKind::Quiz => "Quiz",
        ContentKind::Practice => "Practice",
        ContentKind::Assessment => "Assessment",
        ContentKind::Other(_) => "Activity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp() -> KnowledgePoint {
        KnowledgePoint::new(6, "Recursion", 3)
    }

    #[test]
    fn test_same_seed_same_items() {
        assert_eq!(synthesize(&kp(), 6, 3), synthesize(&kp(), 6, 3));
    }

    #[test]
    fn test_different_seed_different_items() {
        assert_ne!(synthesize(&kp(), 6, 3), synthesize(&kp(), 7, 3));
    }

    #[test]
    fn test_shape() {
        let items = synthesize(&kp(), 6, 5);
        assert_eq!(items.len(), 5);
        let kinds: Vec<_> = items.iter().map(|i| i.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ContentKind::Video,
                ContentKind::Reading,
                ContentKind::Quiz,
                ContentKind::Practice,
                ContentKind::Video,
            ]
        );
        for item in &items {
            assert_eq!(item.kp_id, 6);
            assert!((5..=15).contains(&item.est_minutes));
            assert!((1..=3).contains(&item.difficulty));
            assert_eq!(item.metadata.as_ref().unwrap()["generated"], true);
            assert!(item.clone().validate().is_ok());
        }
        assert_eq!(items[0].id, "placeholder-6-1");
    }
}
