//! Functions to generate random sequences
use rand::Rng;
use rv::dist::Gaussian;
use rv::traits::Rv;

/// Concatenated draws from Gaussian segments given as `(mu, sigma, len)`.
///
/// # Panics
/// If a `sigma` is not positive and finite.
pub fn gaussian_segments<R: Rng>(rng: &mut R, segments: &[(f64, f64, usize)]) -> Vec<f64> {
    segments
        .iter()
        .flat_map(|&(mu, sigma, len)| {
            let g = Gaussian::new(mu, sigma).expect("Arguments should be valid");
            g.sample(len, rng)
        })
        .collect()
}

/// Generate a series of draws from two Gaussian process that switches
/// at `switch` into the sequence.
///
/// # Example
/// ```rust
/// use bayescpd::generators::discontinuous_jump;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// let mut rng: StdRng = StdRng::seed_from_u64(0x12345);
/// // Generate a sequence of 1000 numbers from two Gaussian, G(0, 1) and G(10, 5),
/// // switching from the first to the second at 500 steps.
/// let seq: Vec<f64> = discontinuous_jump(
///     &mut rng,
///     0.0,
///     1.0,
///     10.0,
///     5.0,
///     500,
///     1000
/// );
/// assert_eq!(seq.len(), 1000);
/// ```
///
/// # Panics
/// If a `sigma` is not positive and finite or `switch > size`.
pub fn discontinuous_jump<R: Rng>(
    rng: &mut R,
    mu_1: f64,
    sigma_1: f64,
    mu_2: f64,
    sigma_2: f64,
    switch: usize,
    size: usize,
) -> Vec<f64> {
    gaussian_segments(rng, &[(mu_1, sigma_1, switch), (mu_2, sigma_2, size - switch)])
}

/// Ninety samples from `N(100, 10)`, `N(30, 5)` and `N(50, 20)` with
/// changepoints at indices 30 and 70.
pub fn three_segments<R: Rng>(rng: &mut R) -> Vec<f64> {
    gaussian_segments(rng, &[(100.0, 10.0, 30), (30.0, 5.0, 40), (50.0, 20.0, 20)])
}
