use std::f32::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

const MAX_SPAWN: usize = 6;
const SPAWN_PER_PULSE: f32 = 12.0;
const ANGULAR_STEP: f32 = 0.02;
const LIFE_DECAY: f32 = 0.985;
/// Particles below this life are pruned.
pub const MIN_LIFE: f32 = 0.08;
/// Fraction of a sector a spawned particle may stray from its center.
const SECTOR_JITTER: f32 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub theta: f32,
    pub radius: f32,
    /// Angular speed in radians per frame step.
    pub speed: f32,
    pub life: f32,
}

impl Particle {
    pub fn size(&self, thickness: f32) -> f32 {
        (2.0 + (1.0 - self.life) * 3.0) * (1.0 + 0.4 * (thickness - 1.0))
    }

    pub fn alpha(&self) -> f32 {
        0.2 + self.life * 0.6
    }
}

/// Where and how many particles to spawn this frame.
#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    pub count: usize,
    pub base_radius: f32,
    /// Extra radius drawn uniformly from `0..spread`.
    pub spread: f32,
    pub segments: u8,
    pub pulse_width: f32,
}

/// Bounded particle pool with its own seeded generator.
#[derive(Debug, Clone)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    rng: StdRng,
}

impl ParticlePool {
    pub fn new(seed: u64, capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Spawn count for a beat pulse: proportional, at most six per frame.
    pub fn spawn_count(pulse: f32) -> usize {
        if !pulse.is_finite() || pulse <= 0.0 {
            return 0;
        }
        ((pulse * SPAWN_PER_PULSE).floor() as usize).min(MAX_SPAWN)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    /// Adds up to `emitter.count` particles without exceeding `cap`. Returns
    /// how many were added.
    pub fn emit(&mut self, emitter: Emitter, cap: usize) -> usize {
        if self.particles.len() > cap {
            self.particles.truncate(cap);
        }
        let room = cap - self.particles.len();
        let count = emitter.count.min(room);
        let segments = emitter.segments.max(1) as usize;
        let sector = TAU / segments as f32;
        let jitter = sector * SECTOR_JITTER * emitter.pulse_width.max(0.0);

        for spawned in 0..count {
            let theta = if segments == 1 {
                self.rng.gen_range(0.0..TAU)
            } else {
                let center = (spawned % segments) as f32 * sector + sector * 0.5;
                center + self.rng.gen_range(-0.5_f32..0.5) * jitter
            };
            let radius = emitter.base_radius + self.rng.gen::<f32>() * emitter.spread;
            let speed = 0.6 + self.rng.gen::<f32>() * 1.2;
            self.particles.push(Particle {
                theta,
                radius,
                speed,
                life: 1.0,
            });
        }
        count
    }

    /// One simulation step: orbit, age, and prune.
    pub fn advance(&mut self) {
        for particle in &mut self.particles {
            particle.theta = (particle.theta + particle.speed * ANGULAR_STEP).rem_euclid(TAU);
            particle.life *= LIFE_DECAY;
        }
        self.particles.retain(|particle| particle.life >= MIN_LIFE);
    }
}
