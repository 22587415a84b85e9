//! This library provides Bayesian Change Point Detection (CPD) tools such as
//!  * Offline exact CPD over a complete series as `BayesOffline`
//!  * Online run-length CPD as `BayesOnline`
//!
//! Both detectors work in the log domain where it matters and can be run on
//! a reference or an accelerated [`Engine`].
//!
//! ```rust
//! use bayescpd::{BayesOffline, BayesOnline, Likelihood, Prior, DEFAULT_TRUNCATE};
//!
//! let data: Vec<f64> = (0..80).map(|i| if i < 40 { (i % 3) as f64 } else { 20.0 + (i % 3) as f64 }).collect();
//!
//! let offline = BayesOffline::new(Prior::Const, Likelihood::Gaussian);
//! let out = offline.find_changepoints_1d(&data, DEFAULT_TRUNCATE, false).unwrap();
//! assert_eq!(out.prob.len(), data.len() - 1);
//!
//! let mut online = BayesOnline::default();
//! let p = online.find_changepoints(&data, 3).unwrap();
//! assert_eq!(p.len(), data.len() - 3);
//! ```
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

mod engine;
pub use engine::Engine;

mod error;
pub use error::{CpdError, Result};

pub mod generators;

mod hazard;
pub use hazard::Hazard;

mod likelihood;
pub use likelihood::Likelihood;

pub mod numeric;

mod offline;
pub use offline::{BayesOffline, OfflineOutput, DEFAULT_TRUNCATE};

mod online;
pub use online::BayesOnline;

mod predictive;
pub use predictive::{ln_t_pdf, t_pdf, LocScaleT, StudentT};

mod prior;
pub use prior::Prior;

pub mod utils;

pub use rv;
