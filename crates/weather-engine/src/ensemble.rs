//! Spatial sampling ensemble builder and the crop simulator hand-off.

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use raster_store::{Domain, RasterStore, RasterTable, SliceFilter, SoilMask, SoilPoint};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use agro_common::{DateRange, Variable};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::reconstruct::{PointWeather, WeatherReconstructor};
use crate::sampling::{pair_samples, select_soils, Pairing};

/// Static parameters attached to every member when both are present.
pub const TAV: &str = "tav";
pub const TAMP: &str = "tamp";

/// Share of immature outcomes above which a season run is flagged.
const IMMATURE_WARN_FRACTION: f64 = 0.5;

/// What to sample for one season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleRequest {
    pub admin1: String,
    pub planting: NaiveDate,
    /// Pairs to draw; the configured ensemble size when `None`.
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub pairing: Pairing,
    /// Forecast member for every point; drawn per point when `None`.
    #[serde(default)]
    pub member: Option<i32>,
}

impl EnsembleRequest {
    pub fn new(admin1: impl Into<String>, planting: NaiveDate) -> Self {
        Self {
            admin1: admin1.into(),
            planting,
            size: None,
            pairing: Pairing::default(),
            member: None,
        }
    }
}

/// Soil annual mean temperature and amplitude at a weather point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilTemperature {
    pub tav: f64,
    pub tamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    /// Position in the drawn sample list.
    pub index: usize,
    pub soil: SoilPoint,
    pub weather: PointWeather,
    pub soil_temperature: Option<SoilTemperature>,
}

/// Simulation inputs for one sub-region and planting date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonEnsemble {
    pub admin1: String,
    pub planting: NaiveDate,
    pub window: DateRange,
    pub soil_mask: Option<SoilMask>,
    pub members: Vec<EnsembleMember>,
    /// Sample points dropped for unusable weather.
    pub skipped: usize,
}

pub struct EnsembleBuilder {
    store: RasterStore,
    reconstructor: WeatherReconstructor,
}

impl EnsembleBuilder {
    pub fn new(store: RasterStore, config: EngineConfig) -> Self {
        let reconstructor = WeatherReconstructor::new(store.clone(), config);
        Self {
            store,
            reconstructor,
        }
    }

    pub fn reconstructor(&self) -> &WeatherReconstructor {
        &self.reconstructor
    }

    fn config(&self) -> &EngineConfig {
        self.reconstructor.config()
    }

    /// Sample soils and weather in `request.admin1` and reconstruct weather
    /// for every pair. Points with unusable weather are logged and skipped.
    #[instrument(skip_all, fields(domain = %domain, admin1 = %request.admin1, planting = %request.planting))]
    pub async fn build<R: Rng + Send>(
        &self,
        domain: &Domain,
        request: &EnsembleRequest,
        rng: &mut R,
    ) -> Result<SeasonEnsemble> {
        let config = self.config();
        let admin1 = request.admin1.as_str();
        self.store.schema.check_admin1(domain, admin1).await?;

        let window = self.reconstructor.window(request.planting)?;
        let selection = select_soils(&self.store, domain, admin1, config.min_samples).await?;

        // Weather pixels come from the first simulated day, or the last
        // historical day when the window starts beyond the record.
        let latest = self.reconstructor.latest_historical(domain).await?;
        let pixel_date = window.from.min(latest);
        let pixels = self
            .store
            .gateway
            .pixel_centroids(
                domain,
                &RasterTable::Series(config.reanalysis, Variable::Rain),
                pixel_date,
                admin1,
            )
            .await?;
        if request.pairing == Pairing::AllRandom && pixels.is_empty() {
            return Err(EngineError::NoWeatherPixels {
                admin1: admin1.to_string(),
                date: pixel_date,
            });
        }

        let size = request.size.unwrap_or(config.ensemble_size);
        let pairs = pair_samples(&selection.soils, &pixels, size, request.pairing, rng);
        let with_soil_temperature = self.has_soil_temperature(domain).await?;
        info!(
            soils = selection.soils.len(),
            pixels = pixels.len(),
            pairs = pairs.len(),
            "Reconstructing ensemble weather"
        );

        let mut members = Vec::with_capacity(pairs.len());
        let mut skipped = 0;
        for (index, pair) in pairs.iter().enumerate() {
            let (lon, lat) = pair.weather;
            let weather = match self
                .reconstructor
                .point_weather(domain, lon, lat, window, request.member, rng)
                .await
            {
                Ok(weather) => weather,
                Err(e) if e.is_point_skip() => {
                    warn!(lon = lon, lat = lat, error = %e, "Skipping sample point");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let soil_temperature = if with_soil_temperature {
                self.soil_temperature(domain, lon, lat).await?
            } else {
                None
            };
            members.push(EnsembleMember {
                index,
                soil: selection.soils[pair.soil].clone(),
                weather,
                soil_temperature,
            });
        }

        if members.is_empty() {
            warn!(skipped, "Every sample point was skipped");
        }

        Ok(SeasonEnsemble {
            admin1: request.admin1.clone(),
            planting: request.planting,
            window,
            soil_mask: selection.mask,
            members,
            skipped,
        })
    }

    async fn has_soil_temperature(&self, domain: &Domain) -> Result<bool> {
        let table = RasterTable::Static;
        if !self.store.gateway.table_exists(domain, &table.name()).await? {
            return Ok(false);
        }
        for name in [TAV, TAMP] {
            let filter = SliceFilter {
                parameter: Some(name.to_string()),
                ..SliceFilter::default()
            };
            if self.store.gateway.count_slices(domain, &table, &filter).await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn soil_temperature(&self, domain: &Domain, lon: f64, lat: f64) -> Result<Option<SoilTemperature>> {
        let tav = self.store.extract.static_value(domain, lon, lat, TAV).await?;
        let tamp = self.store.extract.static_value(domain, lon, lat, TAMP).await?;
        Ok(tav.zip(tamp).map(|(tav, tamp)| SoilTemperature { tav, tamp }))
    }
}

/// One fertiliser application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NitrogenApplication {
    pub days_after_planting: u32,
    pub kg_per_ha: f64,
}

/// Crop management shared by every member of a season run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Management {
    pub cultivar: String,
    #[serde(default)]
    pub nitrogen: Vec<NitrogenApplication>,
}

/// Result of simulating one ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub member: usize,
    pub yield_kg_ha: Option<f64>,
    /// `None` when the crop did not reach maturity within the window.
    pub maturity: Option<NaiveDate>,
}

/// External crop model consuming a built ensemble.
#[async_trait]
pub trait CropSimulator: Send + Sync {
    async fn simulate(
        &self,
        ensemble: &SeasonEnsemble,
        management: &Management,
    ) -> Result<Vec<SimulationOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonReport {
    pub ensemble: SeasonEnsemble,
    pub outcomes: Vec<SimulationOutcome>,
}

impl SeasonReport {
    /// Share of outcomes without maturity; 0 when there are none.
    pub fn immature_fraction(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let immature = self.outcomes.iter().filter(|o| o.maturity.is_none()).count();
        immature as f64 / self.outcomes.len() as f64
    }
}

/// Build the ensemble for `request` and hand it to the simulator.
#[instrument(skip_all, fields(domain = %domain, admin1 = %request.admin1))]
pub async fn run_season<R: Rng + Send>(
    builder: &EnsembleBuilder,
    simulator: &dyn CropSimulator,
    domain: &Domain,
    request: &EnsembleRequest,
    management: &Management,
    rng: &mut R,
) -> Result<SeasonReport> {
    let ensemble = builder.build(domain, request, rng).await?;
    let outcomes = simulator.simulate(&ensemble, management).await?;
    let report = SeasonReport { ensemble, outcomes };

    let immature = report.immature_fraction();
    if immature > IMMATURE_WARN_FRACTION {
        warn!(
            immature_fraction = immature,
            cultivar = %management.cultivar,
            "Most simulations did not reach maturity; the cultivar may not suit the region"
        );
    }
    Ok(report)
}
