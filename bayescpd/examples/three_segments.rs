//! Segment a synthetic three-level trace with both detectors.
//!
//! Run with `RUST_LOG=bayescpd=debug` to see the detector logs.

use bayescpd::{generators, BayesOffline, BayesOnline, Likelihood, Prior, DEFAULT_TRUNCATE};
use rand::{rngs::SmallRng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = SmallRng::seed_from_u64(0xABCD);
    println!("Generating sequence");
    let seq = generators::three_segments(&mut rng);

    let offline = BayesOffline::new(Prior::Const, Likelihood::Gaussian);
    let out = offline.find_changepoints_1d(&seq, DEFAULT_TRUNCATE, true)?;
    println!("ln evidence: {:.4}", out.ln_evidence);
    println!("offline change points: {:?}", out.changepoints(0.5));

    let geometric = BayesOffline::from_names("geometric", &[0.05], "ifm")?;
    let out = geometric.find_changepoints_1d(&seq, DEFAULT_TRUNCATE, false)?;
    println!("offline change points (geometric, ifm): {:?}", out.changepoints(0.5));

    let mut online = BayesOnline::default();
    let p = online.find_changepoints(&seq, 5)?;
    let online_cps: Vec<usize> = p
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= 0.5)
        .map(|(i, _)| i)
        .collect();
    println!("online change points: {online_cps:?}");
    println!("online MAP change points: {:?}", online.map_changepoints());

    Ok(())
}
