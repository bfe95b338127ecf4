//! Offline template-based generation
//!
//! Combines description templates with randomly drawn shot parameters. No
//! network access; the same seed always yields the same dataset.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shot_schema::{
    AimConstraint, CameraPath, Height, Lens, Modifier, ShotParameterRecord, TrainingExample,
};
use tracing::{debug, info};

use crate::templates::{
    render, templates_for, ANGLES, DOLLY_DISTANCES, DURATIONS, FOCAL_LENGTHS, FOLLOW_HEIGHTS,
    FOLLOW_OFFSETS, HEIGHTS, HEIGHT_SPLIT, LOW_ANGLE_THRESHOLD, MODIFIERS, MOODS, RADII, TARGETS,
};

const PROGRESS_EVERY: usize = 100;

/// Seeded generator of synthetic training examples
pub struct LocalGenerator {
    rng: StdRng,
    seed: u64,
}

impl LocalGenerator {
    /// Create a generator. Without a seed one is drawn from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        debug!(seed, "Local generator seeded");
        LocalGenerator {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed in use, so a run can be reproduced.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate exactly `count` examples.
    pub fn generate(&mut self, count: usize) -> Vec<TrainingExample> {
        let mut examples = Vec::with_capacity(count);
        for i in 0..count {
            examples.push(self.example());
            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(generated = i + 1, total = count, "Local generation progress");
            }
        }
        examples
    }

    /// Generate one example with a uniformly chosen path type.
    pub fn example(&mut self) -> TrainingExample {
        let tag = *self.pick(&CameraPath::TAGS);
        let record = self.record(tag);
        let input = self.describe(tag, &record);
        TrainingExample::new(input, record)
    }

    fn record(&mut self, tag: &str) -> ShotParameterRecord {
        let duration = *self.pick(DURATIONS);
        let focal_length = *self.pick(FOCAL_LENGTHS);

        let path = match tag {
            "orbit" => {
                let radius = *self.pick(RADII);
                let angle = *self.pick(ANGLES);
                let height = self.rng.gen_bool(0.5).then(|| self.height_range());
                CameraPath::Orbit {
                    radius,
                    angle: Some(angle),
                    height,
                }
            }
            "dolly" => CameraPath::Dolly {
                distance: *self.pick(DOLLY_DISTANCES),
            },
            "crane" => CameraPath::Crane {
                height: self.height_range(),
                radius: None,
            },
            "follow" => CameraPath::Follow {
                offset: *self.pick(FOLLOW_OFFSETS),
                height: Some(Height::Fixed(*self.pick(FOLLOW_HEIGHTS))),
            },
            _ => CameraPath::Linear {
                radius: None,
                distance: None,
            },
        };

        let mut modifiers = Vec::new();
        if self.rng.gen_bool(0.4) {
            modifiers.push(Modifier::Handheld {
                intensity: round2(self.rng.gen_range(0.1..=0.4)),
            });
        }
        if self.rng.gen_bool(0.2) {
            modifiers.push(Modifier::Shake {
                intensity: round2(self.rng.gen_range(0.2..=0.6)),
            });
        }

        ShotParameterRecord {
            shot_name: format!("{} Shot", title_case(tag)),
            duration,
            path,
            constraint: AimConstraint::look_at_selection(),
            modifiers,
            lens: Some(Lens::fixed(focal_length)),
        }
    }

    fn describe(&mut self, tag: &str, record: &ShotParameterRecord) -> String {
        let template = *self.pick(templates_for(tag));
        let target = *self.pick(TARGETS);
        let mood = *self.pick(MOODS);
        let modifier = *self.pick(MODIFIERS);
        let mut description = render(template, target, mood, modifier);

        if self.rng.gen_bool(0.5) {
            if self.rng.gen_bool(0.5) {
                description.push_str(&format!("，{}秒", record.duration));
            } else {
                description.push_str(&format!(", {}s", record.duration));
            }
        }

        if starts_low(&record.path) {
            let prefix = if self.rng.gen_bool(0.5) {
                "低角度"
            } else {
                "low angle "
            };
            description.insert_str(0, prefix);
        }

        description
    }

    fn height_range(&mut self) -> Height {
        let (low, high) = HEIGHTS.split_at(HEIGHT_SPLIT);
        Height::Range {
            start: *self.pick(low),
            end: *self.pick(high),
        }
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }
}

/// Animated height that begins close to the ground.
fn starts_low(path: &CameraPath) -> bool {
    let height = match path {
        CameraPath::Orbit { height, .. } | CameraPath::Follow { height, .. } => height.as_ref(),
        CameraPath::Crane { height, .. } => Some(height),
        _ => None,
    };
    matches!(height, Some(Height::Range { start, .. }) if *start < LOW_ANGLE_THRESHOLD)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn title_case(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generates_exact_count() {
        let mut gen = LocalGenerator::new(Some(7));
        for count in [0, 1, 57, 250] {
            assert_eq!(gen.generate(count).len(), count);
        }
    }

    #[test]
    fn test_every_example_validates() {
        let mut gen = LocalGenerator::new(Some(42));
        for example in gen.generate(500) {
            example.validate().expect("generated example must be valid");
        }
    }

    #[test]
    fn test_same_seed_same_dataset() {
        let a = LocalGenerator::new(Some(1234)).generate(50);
        let b = LocalGenerator::new(Some(1234)).generate(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = LocalGenerator::new(Some(1)).generate(50);
        let b = LocalGenerator::new(Some(2)).generate(50);
        assert_ne!(a, b);
    }

    #[test]
    fn test_all_path_types_appear() {
        let tags: HashSet<&str> = LocalGenerator::new(Some(9))
            .generate(300)
            .iter()
            .map(|e| e.output.path.tag())
            .collect();
        assert_eq!(tags.len(), CameraPath::TAGS.len());
    }

    #[test]
    fn test_low_angle_prefix_matches_height() {
        for example in LocalGenerator::new(Some(5)).generate(400) {
            let prefixed =
                example.input.starts_with("低角度") || example.input.starts_with("low angle ");
            assert_eq!(
                prefixed,
                starts_low(&example.output.path),
                "input {:?}",
                example.input
            );
        }
    }

    #[test]
    fn test_record_shape_follows_path_type() {
        for example in LocalGenerator::new(Some(11)).generate(200) {
            let record = &example.output;
            assert_eq!(record.shot_name, format!("{} Shot", title_case(record.path.tag())));
            assert_eq!(record.constraint, AimConstraint::look_at_selection());
            assert!(record.lens.is_some());
            assert!(record.modifiers.len() <= 2);
            for modifier in &record.modifiers {
                assert!((0.1..=0.6).contains(&modifier.intensity()));
            }
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("orbit"), "Orbit");
        assert_eq!(title_case(""), "");
    }
}
