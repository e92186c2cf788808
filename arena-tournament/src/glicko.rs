//! Glicko-2 ratings
//!
//! Implements the rating period update from Glickman's "Example of the
//! Glicko-2 system" (2012). Ratings live on the Glicko scale (1500 centre);
//! the update runs on the internal Glicko-2 scale.

use std::f64::consts::PI;

use arena_core::GenomeId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::GlickoConfig;

/// Glicko scale to Glicko-2 scale
const SCALE: f64 = 173.7178;
const CENTRE: f64 = 1500.0;
/// Convergence tolerance of the volatility iteration
const EPSILON: f64 = 1e-6;

/// Rating, deviation and volatility of one player
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlickoPlayer {
    pub rating: f64,
    pub rd: f64,
    pub vol: f64,
}

impl GlickoPlayer {
    pub fn new(rating: f64, rd: f64, vol: f64) -> Self {
        Self { rating, rd, vol }
    }

    /// Pessimistic skill estimate, `rating - 2 * rd`
    pub fn conservative_rating(&self) -> f64 {
        self.rating - 2.0 * self.rd
    }

    fn mu(&self) -> f64 {
        (self.rating - CENTRE) / SCALE
    }

    fn phi(&self) -> f64 {
        self.rd / SCALE
    }
}

/// The rating system
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glicko2 {
    tau: f64,
}

impl Glicko2 {
    pub fn new(tau: f64) -> Self {
        Self { tau }
    }

    /// New rating after one period
    ///
    /// `results` pairs each opponent's pre-period rating with this player's
    /// score in [0, 1]. With no results only the deviation grows.
    pub fn rate(&self, player: GlickoPlayer, results: &[(GlickoPlayer, f64)]) -> GlickoPlayer {
        let mu = player.mu();
        let phi = player.phi();

        if results.is_empty() {
            let phi_star = (phi * phi + player.vol * player.vol).sqrt();
            return GlickoPlayer::new(player.rating, phi_star * SCALE, player.vol);
        }

        let mut v_inv = 0.0;
        let mut delta_sum = 0.0;
        for (opponent, score) in results {
            let g = g(opponent.phi());
            let e = expected(mu, opponent.mu(), g);
            v_inv += g * g * e * (1.0 - e);
            delta_sum += g * (score - e);
        }
        let v = 1.0 / v_inv;
        let delta = v * delta_sum;

        let vol = self.new_volatility(phi, player.vol, v, delta);
        let phi_star = (phi * phi + vol * vol).sqrt();
        let new_phi = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let new_mu = mu + new_phi * new_phi * delta_sum;

        GlickoPlayer::new(new_mu * SCALE + CENTRE, new_phi * SCALE, vol)
    }

    /// Step 5: Illinois iteration for the new volatility
    fn new_volatility(&self, phi: f64, sigma: f64, v: f64, delta: f64) -> f64 {
        let tau = self.tau;
        let a = (sigma * sigma).ln();
        let phi2 = phi * phi;
        let delta2 = delta * delta;

        let f = |x: f64| {
            let ex = x.exp();
            let denom = phi2 + v + ex;
            ex * (delta2 - phi2 - v - ex) / (2.0 * denom * denom) - (x - a) / (tau * tau)
        };

        let mut big_a = a;
        let mut big_b = if delta2 > phi2 + v {
            (delta2 - phi2 - v).ln()
        } else {
            let mut k = 1.0;
            while f(a - k * tau) < 0.0 {
                k += 1.0;
            }
            a - k * tau
        };

        let mut f_a = f(big_a);
        let mut f_b = f(big_b);
        while (big_b - big_a).abs() > EPSILON {
            let big_c = big_a + (big_a - big_b) * f_a / (f_b - f_a);
            let f_c = f(big_c);
            if f_c * f_b <= 0.0 {
                big_a = big_b;
                f_a = f_b;
            } else {
                f_a /= 2.0;
            }
            big_b = big_c;
            f_b = f_c;
        }

        (big_a / 2.0).exp()
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn expected(mu: f64, mu_j: f64, g_j: f64) -> f64 {
    1.0 / (1.0 + (-g_j * (mu - mu_j)).exp())
}

/// One rated game: `score` is the first player's result in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatedMatch {
    pub a: GenomeId,
    pub b: GenomeId,
    pub score: f64,
}

/// Ratings for one evaluation session, keyed by genome id
#[derive(Clone, Debug)]
pub struct RatingRegistry {
    system: Glicko2,
    defaults: GlickoPlayer,
    players: FxHashMap<GenomeId, GlickoPlayer>,
}

impl RatingRegistry {
    pub fn new(config: &GlickoConfig) -> Self {
        Self {
            system: Glicko2::new(config.tau),
            defaults: GlickoPlayer::new(
                config.default_rating,
                config.default_rd,
                config.default_vol,
            ),
            players: FxHashMap::default(),
        }
    }

    pub fn system(&self) -> Glicko2 {
        self.system
    }

    pub fn get(&self, id: GenomeId) -> Option<&GlickoPlayer> {
        self.players.get(&id)
    }

    pub fn rating(&self, id: GenomeId) -> Option<f64> {
        self.players.get(&id).map(|p| p.rating)
    }

    /// Existing rating, or a default one registered now
    pub fn get_or_create(&mut self, id: GenomeId) -> GlickoPlayer {
        *self.players.entry(id).or_insert(self.defaults)
    }

    pub fn insert(&mut self, id: GenomeId, player: GlickoPlayer) {
        self.players.insert(id, player);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Apply one rating period in a single batch
    ///
    /// Every result is computed against pre-period ratings. Registered
    /// players without a game this period have their deviation inflated.
    pub fn apply_period(&mut self, matches: &[RatedMatch]) {
        let mut results: FxHashMap<GenomeId, Vec<(GlickoPlayer, f64)>> = FxHashMap::default();
        for m in matches {
            let a = self.get_or_create(m.a);
            let b = self.get_or_create(m.b);
            results.entry(m.a).or_default().push((b, m.score));
            results.entry(m.b).or_default().push((a, 1.0 - m.score));
        }

        let updated: Vec<(GenomeId, GlickoPlayer)> = self
            .players
            .iter()
            .map(|(&id, &player)| {
                let games = results.get(&id).map(Vec::as_slice).unwrap_or(&[]);
                (id, self.system.rate(player, games))
            })
            .collect();

        self.players.extend(updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_glickman_worked_example() {
        let system = Glicko2::new(0.5);
        let player = GlickoPlayer::new(1500.0, 200.0, 0.06);
        let results = [
            (GlickoPlayer::new(1400.0, 30.0, 0.06), 1.0),
            (GlickoPlayer::new(1550.0, 100.0, 0.06), 0.0),
            (GlickoPlayer::new(1700.0, 300.0, 0.06), 0.0),
        ];

        let rated = system.rate(player, &results);

        assert!(close(rated.rating, 1464.06, 0.01), "rating {}", rated.rating);
        assert!(close(rated.rd, 151.52, 0.01), "rd {}", rated.rd);
        assert!(close(rated.vol, 0.05999, 1e-5), "vol {}", rated.vol);
    }

    #[test]
    fn test_idle_period_inflates_deviation() {
        let system = Glicko2::new(0.5);
        let player = GlickoPlayer::new(1600.0, 50.0, 0.06);
        let rated = system.rate(player, &[]);

        assert_eq!(rated.rating, 1600.0);
        assert!(rated.rd > 50.0);
        assert_eq!(rated.vol, 0.06);
    }

    #[test]
    fn test_conservative_rating() {
        let player = GlickoPlayer::new(1500.0, 350.0, 0.06);
        assert_eq!(player.conservative_rating(), 800.0);
        assert!(GlickoPlayer::new(100.0, 350.0, 0.06).conservative_rating() < 0.0);
    }

    #[test]
    fn test_registry_defaults() {
        let config = GlickoConfig::default();
        let mut registry = RatingRegistry::new(&config);
        let id = GenomeId::pack(1, 1).unwrap();

        assert!(registry.rating(id).is_none());
        let created = registry.get_or_create(id);
        assert_eq!(created, GlickoPlayer::new(1500.0, 350.0, 0.06));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_apply_period_is_symmetric_for_equal_players() {
        let config = GlickoConfig::default();
        let mut registry = RatingRegistry::new(&config);
        let a = GenomeId::pack(0, 1).unwrap();
        let b = GenomeId::pack(0, 2).unwrap();

        registry.apply_period(&[RatedMatch { a, b, score: 1.0 }]);

        let ra = registry.rating(a).unwrap();
        let rb = registry.rating(b).unwrap();
        assert!(ra > 1500.0);
        assert!(rb < 1500.0);
        assert!(close(ra - 1500.0, 1500.0 - rb, 1e-9));
    }

    #[test]
    fn test_apply_period_uses_pre_period_ratings() {
        let config = GlickoConfig::default();
        let a = GenomeId::pack(0, 1).unwrap();
        let b = GenomeId::pack(0, 2).unwrap();
        let c = GenomeId::pack(0, 3).unwrap();

        // Batched: both of a's games see the original ratings of b and c
        let mut batched = RatingRegistry::new(&config);
        batched.apply_period(&[
            RatedMatch { a, b, score: 1.0 },
            RatedMatch { a: b, b: c, score: 1.0 },
        ]);

        let system = Glicko2::new(config.tau);
        let start = GlickoPlayer::new(1500.0, 350.0, 0.06);
        let expected_b = system.rate(start, &[(start, 0.0), (start, 1.0)]);
        assert!(close(batched.get(b).unwrap().rating, expected_b.rating, 1e-9));
    }

    #[test]
    fn test_apply_period_inflates_idle_players() {
        let config = GlickoConfig {
            default_rd: 100.0,
            ..Default::default()
        };
        let mut registry = RatingRegistry::new(&config);
        let idle = GenomeId::pack(0, 9).unwrap();
        registry.get_or_create(idle);

        registry.apply_period(&[RatedMatch {
            a: GenomeId::pack(0, 1).unwrap(),
            b: GenomeId::pack(0, 2).unwrap(),
            score: 0.5,
        }]);

        assert!(registry.get(idle).unwrap().rd > 100.0);
        assert_eq!(registry.rating(idle), Some(1500.0));
    }
}
