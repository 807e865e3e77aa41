//! Stepwise interpolation between two parameter sets.

use alien_core::SimulationParameters;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Walks a fixed sequence of parameter sets from a source to a target.
pub trait ParametersCalculator: Send {
    /// Advance one step towards the target and return the parameters there.
    fn next(&mut self) -> SimulationParameters;
    /// Go back one step towards the source.
    fn previous(&mut self) -> SimulationParameters;
    fn is_target_reached(&self) -> bool;
    fn is_source_reached(&self) -> bool;
    fn source(&self) -> &SimulationParameters;
}

/// Produces calculators with randomly perturbed targets.
pub trait CalculatorFactory: Send {
    fn create_with_random_target(
        &self,
        source: &SimulationParameters,
        rng: &mut dyn RngCore,
    ) -> Box<dyn ParametersCalculator>;
}

/// Linear interpolation over the continuous physics parameters; discrete
/// limits stay at their source values.
#[derive(Debug, Clone)]
pub struct LinearParametersCalculator {
    source: SimulationParameters,
    target: SimulationParameters,
    steps: u32,
    position: u32,
}

impl LinearParametersCalculator {
    #[must_use]
    pub fn new(source: SimulationParameters, target: SimulationParameters, steps: u32) -> Self {
        Self {
            source,
            target,
            steps: steps.max(1),
            position: 0,
        }
    }

    #[must_use]
    pub fn target(&self) -> &SimulationParameters {
        &self.target
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    fn current(&self) -> SimulationParameters {
        let t = self.position as f32 / self.steps as f32;
        let lerp = |from: f32, to: f32| from + (to - from) * t;
        let lerp64 = |from: f64, to: f64| from + (to - from) * f64::from(t);
        let (s, e) = (&self.source, &self.target);
        SimulationParameters {
            cell_min_energy: lerp64(s.cell_min_energy, e.cell_min_energy),
            token_creation_energy: lerp64(s.token_creation_energy, e.token_creation_energy),
            cell_max_force: lerp(s.cell_max_force, e.cell_max_force),
            cell_fusion_velocity: lerp(s.cell_fusion_velocity, e.cell_fusion_velocity),
            cell_function_weapon_strength: lerp(
                s.cell_function_weapon_strength,
                e.cell_function_weapon_strength,
            ),
            radiation_prob: lerp(s.radiation_prob, e.radiation_prob),
            radiation_exponent: lerp(s.radiation_exponent, e.radiation_exponent),
            radiation_factor: lerp(s.radiation_factor, e.radiation_factor),
            ..s.clone()
        }
    }
}

impl ParametersCalculator for LinearParametersCalculator {
    fn next(&mut self) -> SimulationParameters {
        self.position = (self.position + 1).min(self.steps);
        self.current()
    }

    fn previous(&mut self) -> SimulationParameters {
        self.position = self.position.saturating_sub(1);
        self.current()
    }

    fn is_target_reached(&self) -> bool {
        self.position == self.steps
    }

    fn is_source_reached(&self) -> bool {
        self.position == 0
    }

    fn source(&self) -> &SimulationParameters {
        &self.source
    }
}

/// Factory for [`LinearParametersCalculator`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinearCalculatorFactory {
    /// Number of steps from source to target.
    pub steps: u32,
    /// Largest relative deviation of a target value from its source value.
    pub max_deviation: f32,
}

impl Default for LinearCalculatorFactory {
    fn default() -> Self {
        Self {
            steps: 10,
            max_deviation: 0.25,
        }
    }
}

impl CalculatorFactory for LinearCalculatorFactory {
    fn create_with_random_target(
        &self,
        source: &SimulationParameters,
        rng: &mut dyn RngCore,
    ) -> Box<dyn ParametersCalculator> {
        let deviation = self.max_deviation.clamp(0.0, 0.95);
        let mut factor = || {
            if deviation == 0.0 {
                1.0
            } else {
                rng.random_range(1.0 - deviation..=1.0 + deviation)
            }
        };
        let target = SimulationParameters {
            cell_min_energy: source.cell_min_energy * f64::from(factor()),
            token_creation_energy: source.token_creation_energy * f64::from(factor()),
            cell_max_force: source.cell_max_force * factor(),
            cell_fusion_velocity: source.cell_fusion_velocity * factor(),
            cell_function_weapon_strength: source.cell_function_weapon_strength * factor(),
            radiation_prob: (source.radiation_prob * factor()).clamp(0.0, 1.0),
            radiation_exponent: source.radiation_exponent * factor(),
            radiation_factor: source.radiation_factor * factor(),
            ..source.clone()
        };
        Box::new(LinearParametersCalculator::new(
            source.clone(),
            target,
            self.steps,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn target() -> SimulationParameters {
        SimulationParameters {
            cell_max_force: 1.6,
            radiation_prob: 0.5,
            ..SimulationParameters::default()
        }
    }

    #[test]
    fn walks_to_target_and_back() {
        let source = SimulationParameters::default();
        let mut calculator = LinearParametersCalculator::new(source.clone(), target(), 4);
        assert!(calculator.is_source_reached());

        let first = calculator.next();
        assert!((first.cell_max_force - 1.0).abs() < 1e-6);
        for _ in 0..3 {
            calculator.next();
        }
        assert!(calculator.is_target_reached());
        assert!((calculator.next().cell_max_force - 1.6).abs() < 1e-6);

        while !calculator.is_source_reached() {
            calculator.previous();
        }
        assert_eq!(calculator.source(), &source);
        assert_eq!(calculator.previous(), source);
    }

    #[test]
    fn random_targets_stay_valid_and_keep_discrete_limits() {
        let source = SimulationParameters::default();
        let factory = LinearCalculatorFactory::default();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut calculator = factory.create_with_random_target(&source, &mut rng);
            while !calculator.is_target_reached() {
                let step = calculator.next();
                step.validate().expect("interpolated parameters stay valid");
                assert_eq!(step.cell_max_token, source.cell_max_token);
                assert_eq!(step.cell_max_distance, source.cell_max_distance);
            }
        }
    }
}
