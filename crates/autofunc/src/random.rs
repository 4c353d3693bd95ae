//! Random variable initialization.

use rand::Rng;
use rand::distr::StandardUniform;
use rand_distr::StandardNormal;

use crate::variable::Variable;

impl Variable {
    /// Create a variable with uniform random values in [0, 1).
    ///
    /// # Example
    ///
    /// ```
    /// use autofunc::Variable;
    ///
    /// let x = Variable::random(4);
    /// assert_eq!(x.len(), 4);
    /// assert!(x.vector().iter().all(|v| (0.0..1.0).contains(v)));
    /// ```
    pub fn random(len: usize) -> Self {
        Self::random_with_rng(len, &mut rand::rng())
    }

    /// Create a variable with uniform random values using a specific RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use autofunc::Variable;
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let a = Variable::random_with_rng(3, &mut StdRng::seed_from_u64(42));
    /// let b = Variable::random_with_rng(3, &mut StdRng::seed_from_u64(42));
    /// assert_eq!(a.vector(), b.vector());
    /// assert_ne!(a.id(), b.id());
    /// ```
    pub fn random_with_rng<R: Rng>(len: usize, rng: &mut R) -> Self {
        Self::new((0..len).map(|_| rng.sample(StandardUniform)).collect())
    }

    /// Create a variable with standard normal random values.
    pub fn randn(len: usize) -> Self {
        Self::randn_with_rng(len, &mut rand::rng())
    }

    /// Create a variable with standard normal random values using a specific RNG.
    pub fn randn_with_rng<R: Rng>(len: usize, rng: &mut R) -> Self {
        Self::new(
            (0..len)
                .map(|_| rng.sample::<f64, _>(StandardNormal))
                .collect(),
        )
    }
}
