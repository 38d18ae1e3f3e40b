//! Seeded mulberry32 generator used for cosmetic particle placement.

use rand::RngCore;

#[derive(Clone, Debug)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Particle {
    pub x: u16,
    pub y: u16,
    pub duration: u16,
}

/// Places `count` particles inside a `width` x `height` area. The same seed
/// always yields the same field.
pub fn particle_field(seed: u32, width: u16, height: u16, count: usize) -> Vec<Particle> {
    let mut rng = Mulberry32::new(seed);
    (0..count)
        .map(|_| {
            let x = (rng.next_f64() * f64::from(width)).floor() as u16;
            let y = (rng.next_f64() * f64::from(height)).floor() as u16;
            let duration = 10 + (rng.next_f64() * 10.0).floor() as u16;
            Particle { x, y, duration }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn next_u32__known_seeds__match_reference_sequence() {
        let mut zero = Mulberry32::new(0);
        assert_eq!(
            [zero.next_u32(), zero.next_u32(), zero.next_u32()],
            [1_144_304_738, 1_416_247, 958_946_056]
        );

        let mut page_seed = Mulberry32::new(20_250_816);
        assert_eq!(
            [page_seed.next_u32(), page_seed.next_u32(), page_seed.next_u32()],
            [3_683_750_487, 860_789_376, 362_942_895]
        );
    }

    #[test]
    fn next_f64__seed_one__matches_reference_float() {
        let mut rng = Mulberry32::new(1);
        assert_eq!(rng.next_f64(), 0.627_073_940_588_161_3);
    }

    #[test]
    fn particle_field__same_seed__is_reproducible_and_in_bounds() {
        // given
        let seed = 20_250_817;

        // when
        let first = particle_field(seed, 80, 24, 20);
        let second = particle_field(seed, 80, 24, 20);

        // then
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
        assert!(first.iter().all(|p| p.x < 80 && p.y < 24));
        assert!(first.iter().all(|p| (10..20).contains(&p.duration)));
    }

    #[test]
    fn particle_field__empty_area__keeps_particles_at_origin() {
        let field = particle_field(7, 0, 0, 3);
        assert!(field.iter().all(|p| p.x == 0 && p.y == 0));
    }
}
