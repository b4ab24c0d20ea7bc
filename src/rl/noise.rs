use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Ornstein-Uhlenbeck process for temporally correlated exploration noise,
/// injected into off-policy actor-critic models at construction time.
#[derive(Debug)]
pub struct OrnsteinUhlenbeckNoise {
    mu: Vec<f32>,
    sigma: f32,
    theta: f32,
    dt: f32,
    state: Vec<f32>,
    rng: StdRng,
}

impl OrnsteinUhlenbeckNoise {
    /// Zero-mean noise over `n_actions` dimensions.
    pub fn new(n_actions: usize, sigma: f32) -> Self {
        Self::seeded(n_actions, sigma, rand::random())
    }

    pub fn seeded(n_actions: usize, sigma: f32, seed: u64) -> Self {
        OrnsteinUhlenbeckNoise {
            mu: vec![0.0; n_actions],
            sigma,
            theta: 0.15,
            dt: 1e-2,
            state: vec![0.0; n_actions],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    /// Advance the process one step and return the noise vector.
    pub fn sample(&mut self) -> Vec<f32> {
        for (x, mu) in self.state.iter_mut().zip(&self.mu) {
            let z: f32 = self.rng.sample(StandardNormal);
            let dx = self.theta * (mu - *x) * self.dt + self.sigma * self.dt.sqrt() * z;
            *x += dx;
        }
        self.state.clone()
    }

    /// Reset the process to its mean.
    pub fn reset(&mut self) {
        self.state.clone_from(&self.mu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_dimensionality() {
        let mut noise = OrnsteinUhlenbeckNoise::seeded(4, 0.5, 1);
        assert_eq!(noise.dim(), 4);
        assert_eq!(noise.sample().len(), 4);
    }

    #[test]
    fn test_noise_reverts_toward_mean_after_reset() {
        let mut noise = OrnsteinUhlenbeckNoise::seeded(2, 0.5, 2);
        for _ in 0..100 {
            noise.sample();
        }
        noise.reset();
        assert_eq!(noise.state, vec![0.0, 0.0]);
    }

    #[test]
    fn test_noise_is_correlated_not_constant() {
        let mut noise = OrnsteinUhlenbeckNoise::seeded(1, 0.5, 3);
        let a = noise.sample()[0];
        let b = noise.sample()[0];
        // Consecutive samples differ but stay in a sane range for sigma=0.5
        assert_ne!(a, b);
        assert!(b.abs() < 5.0);
    }
}
