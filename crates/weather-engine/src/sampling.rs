//! Soil point selection and (soil, weather) sample pairing.

use rand::seq::index;
use rand::Rng;
use raster_store::{Domain, RasterStore, SoilMask, SoilPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Masks tried in order when selecting soils; `None` is unfiltered.
const MASK_CASCADE: [Option<SoilMask>; 3] = [Some(SoilMask::Primary), Some(SoilMask::Secondary), None];

/// Soil points of a sub-region and the mask they passed.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilSelection {
    pub mask: Option<SoilMask>,
    pub soils: Vec<SoilPoint>,
}

/// Soils of `admin1` under the strictest mask that still yields at least
/// `min_samples` points. Fails only when even the unfiltered set is short.
pub async fn select_soils(
    store: &RasterStore,
    domain: &Domain,
    admin1: &str,
    min_samples: usize,
) -> Result<SoilSelection> {
    let mut found = 0;
    for mask in MASK_CASCADE {
        let soils = store.gateway.soils(domain, admin1, mask).await?;
        if soils.len() >= min_samples {
            debug!(admin1 = %admin1, mask = ?mask, count = soils.len(), "Selected soils");
            return Ok(SoilSelection { mask, soils });
        }
        info!(
            admin1 = %admin1,
            mask = ?mask,
            count = soils.len(),
            min_samples,
            "Too few soils under mask, relaxing"
        );
        found = soils.len();
    }
    Err(EngineError::InsufficientSamples {
        admin1: admin1.to_string(),
        needed: min_samples,
        found,
    })
}

/// How soil and weather locations are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pairing {
    /// Soil and weather locations drawn independently.
    #[default]
    AllRandom,
    /// Weather taken at the soil point's own location.
    CoLocated,
}

/// One simulation sample: an index into the soil list and a weather location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    pub soil: usize,
    pub weather: (f64, f64),
}

/// Draw `size` pairs.
///
/// All-random pairing takes the full soil x pixel product when the smaller
/// of the two sets has fewer than `sqrt(size)` entries; otherwise both sides
/// are sampled independently, with replacement if that set is smaller than
/// `size`. Co-located pairing samples soils, with replacement when there are
/// fewer than `size`.
pub fn pair_samples<R: Rng + ?Sized>(
    soils: &[SoilPoint],
    pixels: &[(f64, f64)],
    size: usize,
    pairing: Pairing,
    rng: &mut R,
) -> Vec<SamplePair> {
    match pairing {
        Pairing::AllRandom => {
            let n_pixels = soils.len().min(pixels.len());
            if (n_pixels as f64) < (size as f64).sqrt() {
                return (0..soils.len())
                    .flat_map(|soil| pixels.iter().map(move |weather| SamplePair { soil, weather: *weather }))
                    .collect();
            }
            let replace = n_pixels < size;
            let soil_idx = draw(rng, soils.len(), size, replace);
            let pixel_idx = draw(rng, pixels.len(), size, replace);
            soil_idx
                .into_iter()
                .zip(pixel_idx)
                .map(|(soil, p)| SamplePair {
                    soil,
                    weather: pixels[p],
                })
                .collect()
        }
        Pairing::CoLocated => draw(rng, soils.len(), size, soils.len() < size)
            .into_iter()
            .map(|soil| SamplePair {
                soil,
                weather: (soils[soil].lon, soils[soil].lat),
            })
            .collect(),
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, len: usize, amount: usize, replace: bool) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if replace {
        (0..amount).map(|_| rng.gen_range(0..len)).collect()
    } else {
        index::sample(rng, len, amount.min(len)).into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn soil(i: usize) -> SoilPoint {
        SoilPoint {
            lon: i as f64,
            lat: -(i as f64),
            mask1: true,
            mask2: true,
            profile: format!("*P{}", i),
        }
    }

    fn soils(n: usize) -> Vec<SoilPoint> {
        (0..n).map(soil).collect()
    }

    fn pixels(n: usize) -> Vec<(f64, f64)> {
        (0..n).map(|i| (100.0 + i as f64, 0.0)).collect()
    }

    #[test]
    fn test_small_regions_use_full_product() {
        let mut rng = StdRng::seed_from_u64(1);
        // min(3, 10) = 3 < sqrt(50)
        let pairs = pair_samples(&soils(3), &pixels(10), 50, Pairing::AllRandom, &mut rng);
        assert_eq!(pairs.len(), 30);
        let distinct: HashSet<(usize, u64)> = pairs.iter().map(|p| (p.soil, p.weather.0.to_bits())).collect();
        assert_eq!(distinct.len(), 30);
    }

    #[test]
    fn test_all_random_without_replacement() {
        let mut rng = StdRng::seed_from_u64(2);
        let pairs = pair_samples(&soils(60), &pixels(80), 50, Pairing::AllRandom, &mut rng);
        assert_eq!(pairs.len(), 50);
        let soil_set: HashSet<usize> = pairs.iter().map(|p| p.soil).collect();
        let pixel_set: HashSet<u64> = pairs.iter().map(|p| p.weather.0.to_bits()).collect();
        assert_eq!(soil_set.len(), 50);
        assert_eq!(pixel_set.len(), 50);
    }

    #[test]
    fn test_all_random_with_replacement() {
        let mut rng = StdRng::seed_from_u64(3);
        let pairs = pair_samples(&soils(10), &pixels(40), 50, Pairing::AllRandom, &mut rng);
        assert_eq!(pairs.len(), 50);
        assert!(pairs.iter().all(|p| p.soil < 10 && p.weather.0 >= 100.0));
    }

    #[test]
    fn test_co_located_pairs_share_location() {
        let mut rng = StdRng::seed_from_u64(4);
        let all = soils(5);
        let pairs = pair_samples(&all, &[], 12, Pairing::CoLocated, &mut rng);
        assert_eq!(pairs.len(), 12);
        for p in &pairs {
            assert_eq!(p.weather, (all[p.soil].lon, all[p.soil].lat));
        }
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let a = pair_samples(&soils(20), &pixels(20), 8, Pairing::AllRandom, &mut StdRng::seed_from_u64(9));
        let b = pair_samples(&soils(20), &pixels(20), 8, Pairing::AllRandom, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
