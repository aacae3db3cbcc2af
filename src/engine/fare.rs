//! Per-passenger pricing.

use crate::config::FareConfig;

/// Ceiling on the recommended price, as a multiple of the base rate.
const BASE_RATE_CAP: f64 = 1.5;
/// Share of the recommended price actually charged.
const DISCOUNT: f64 = 0.8;

/// Per-passenger price for `distance_km` shared by `total_passenger_count`
/// riders. Pure: identical inputs always give the identical price.
pub fn price(distance_km: f64, total_passenger_count: i32, fare: &FareConfig) -> f64 {
    let passengers = f64::from(total_passenger_count.max(1));
    let cost = distance_km.max(0.0) * (fare.cost_per_km + fare.rate_per_km);
    let recommended = (cost / passengers).min(fare.base_rate * BASE_RATE_CAP);

    let ceiling = fare.base_rate * BASE_RATE_CAP * DISCOUNT;
    round_cents(recommended * DISCOUNT).min(ceiling)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fare() -> FareConfig {
        FareConfig {
            base_rate: 5.0,
            rate_per_km: 0.05,
            cost_per_km: 0.15,
        }
    }

    #[test]
    fn test_short_trip_is_distance_proportional() {
        // 12 km * 0.20 = 2.40, / 3 = 0.80, * 0.8 = 0.64
        assert_eq!(price(12.0, 3, &fare()), 0.64);
    }

    #[test]
    fn test_long_trip_is_capped() {
        // 200 km * 0.20 / 1 = 40.0, capped at 7.5, * 0.8 = 6.0
        assert_eq!(price(200.0, 1, &fare()), 6.0);
    }

    #[test]
    fn test_rounds_to_cents() {
        // 7.3 km * 0.20 = 1.46, / 3 = 0.48666.., * 0.8 = 0.38933..
        assert_eq!(price(7.3, 3, &fare()), 0.39);
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        let fare = FareConfig {
            base_rate: 5.0037,
            rate_per_km: 1.0,
            cost_per_km: 1.0,
        };
        let ceiling = fare.base_rate * 1.5 * 0.8;
        for km in [0.0, 1.0, 3.3, 17.0, 250.0, 10_000.0] {
            for seats in 1..=4 {
                assert!(price(km, seats, &fare) <= ceiling);
            }
        }
    }

    #[test]
    fn test_repeatable() {
        let first = price(23.41, 2, &fare());
        for _ in 0..10 {
            assert_eq!(price(23.41, 2, &fare()), first);
        }
    }

    #[test]
    fn test_zero_passengers_treated_as_one() {
        assert_eq!(price(10.0, 0, &fare()), price(10.0, 1, &fare()));
    }
}
