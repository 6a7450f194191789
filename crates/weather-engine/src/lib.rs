//! Ensemble weather reconstruction for crop simulation.
//!
//! For a sub-region and planting date the engine picks soil and weather
//! sample points ([`sampling`]), builds a complete daily weather series for
//! every weather point ([`reconstruct`]) and hands the resulting ensemble to
//! an external [`CropSimulator`].
//!
//! Weather past the end of the historical record is stitched from a forecast
//! ensemble member whose missing radiation is predicted by a
//! [`RadiationModel`], and from earlier years beyond the forecast horizon.

pub mod config;
pub mod ensemble;
pub mod error;
pub mod harmonic;
pub mod knn;
pub mod radiation;
pub mod reconstruct;
pub mod sampling;
pub mod smoothing;

pub use config::EngineConfig;
pub use ensemble::{
    run_season, CropSimulator, EnsembleBuilder, EnsembleMember, EnsembleRequest, Management,
    NitrogenApplication, SeasonEnsemble, SeasonReport, SimulationOutcome, SoilTemperature,
};
pub use error::{EngineError, Result};
pub use harmonic::HarmonicFit;
pub use knn::KnnRegressor;
pub use radiation::RadiationModel;
pub use reconstruct::{Branch, PointWeather, WeatherReconstructor};
pub use sampling::{pair_samples, select_soils, Pairing, SamplePair, SoilSelection};
