//! One simulated coffee machine and its consumption model.

use rand::Rng;

use brewlink_app::codec::TelemetryPayload;
use brewlink_domain::brew::BrewType;
use brewlink_domain::device::{DeviceStatus, Supply};
use brewlink_domain::id::{DeviceId, FacilityId};
use brewlink_domain::time::Timestamp;

/// Brews a running machine reports, picked uniformly.
const BREWS: [BrewType; 5] = [
    BrewType::Americano,
    BrewType::Latte,
    BrewType::BlackCoffee,
    BrewType::Cappuccino,
    BrewType::Espresso,
];

const ON_PROBABILITY: f64 = 0.85;
const RESTOCK_PROBABILITY: f64 = 0.10;

/// Wire value for "nothing brewed this cycle".
pub const NO_BREW: &str = "None";

/// Restock amount for a supply: `base + [0, span)` percent.
fn restock_range(supply: Supply) -> (f64, f64) {
    match supply {
        Supply::Water | Supply::Beans => (20.0, 30.0),
        Supply::Milk => (15.0, 25.0),
        Supply::Sugar => (10.0, 20.0),
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedMachine {
    device_id: DeviceId,
    facility_id: FacilityId,
    /// Current levels, indexed like [`Supply::ALL`].
    levels: [f64; 4],
}

impl SimulatedMachine {
    /// Create a machine with every level drawn from `[60, 100)`.
    pub fn new(device_id: DeviceId, facility_id: FacilityId, rng: &mut impl Rng) -> Self {
        Self {
            device_id,
            facility_id,
            levels: std::array::from_fn(|_| rng.gen_range(60.0..100.0)),
        }
    }

    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[must_use]
    pub fn facility_id(&self) -> FacilityId {
        self.facility_id
    }

    #[must_use]
    pub fn level(&self, supply: Supply) -> f64 {
        self.levels[index(supply)]
    }

    pub fn set_level(&mut self, supply: Supply, level: f64) {
        self.levels[index(supply)] = level;
    }

    /// Draw 3–7% from every supply, refilling to 100 when one runs dry.
    pub fn consume(&mut self, rng: &mut impl Rng) {
        for level in &mut self.levels {
            let next = *level - rng.gen_range(3.0..7.0);
            *level = if next <= 0.0 { 100.0 } else { next };
        }
    }

    /// Top up a random subset of supplies, capped at 100.
    pub fn restock(&mut self, rng: &mut impl Rng) {
        for supply in Supply::ALL {
            if rng.gen_bool(0.5) {
                let (base, span) = restock_range(supply);
                let level = &mut self.levels[index(supply)];
                *level = (*level + base + rng.gen_range(0.0..span)).min(100.0);
            }
        }
    }

    /// Advance one cycle and produce the reading to publish.
    pub fn tick(&mut self, rng: &mut impl Rng, at: Timestamp) -> TelemetryPayload {
        let status = if rng.gen_bool(ON_PROBABILITY) {
            DeviceStatus::On
        } else {
            DeviceStatus::Off
        };
        let temperature = f64::from(rng.gen_range(85_u32..=115));

        let brew_type = if status == DeviceStatus::On {
            self.consume(rng);
            BREWS[rng.gen_range(0..BREWS.len())].as_str()
        } else {
            if rng.gen_bool(RESTOCK_PROBABILITY) {
                self.restock(rng);
            }
            NO_BREW
        };

        TelemetryPayload {
            machine_id: Some(self.device_id.get()),
            facility_id: Some(self.facility_id.get()),
            status: Some(status.as_str().to_string()),
            temperature: Some(temperature),
            water_level: Some(self.level(Supply::Water).trunc()),
            milk_level: Some(self.level(Supply::Milk).trunc()),
            beans_level: Some(self.level(Supply::Beans).trunc()),
            sugar_level: Some(self.level(Supply::Sugar).trunc()),
            brew_type: Some(brew_type.to_string()),
            timestamp: Some(at.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
        }
    }
}

fn index(supply: Supply) -> usize {
    match supply {
        Supply::Water => 0,
        Supply::Milk => 1,
        Supply::Beans => 2,
        Supply::Sugar => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewlink_domain::time::now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn machine(rng: &mut StdRng) -> SimulatedMachine {
        SimulatedMachine::new(DeviceId::new(1), FacilityId::new(1), rng)
    }

    #[test]
    fn should_start_with_levels_between_sixty_and_hundred() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let m = machine(&mut rng);
            for supply in Supply::ALL {
                assert!((60.0..100.0).contains(&m.level(supply)));
            }
        }
    }

    #[test]
    fn should_refill_to_full_when_consumption_empties_a_supply() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut m = machine(&mut rng);
        m.set_level(Supply::Milk, 2.5);
        m.set_level(Supply::Water, 50.0);

        m.consume(&mut rng);

        assert!((m.level(Supply::Milk) - 100.0).abs() < f64::EPSILON);
        let water = m.level(Supply::Water);
        assert!(water > 43.0 && water <= 47.0, "drew {}", 50.0 - water);
    }

    #[test]
    fn should_cap_restock_at_hundred() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut m = machine(&mut rng);
        for supply in Supply::ALL {
            m.set_level(supply, 95.0);
        }
        for _ in 0..20 {
            m.restock(&mut rng);
        }
        for supply in Supply::ALL {
            assert!(m.level(supply) <= 100.0);
        }
    }

    #[test]
    fn should_report_brew_only_while_on() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut m = machine(&mut rng);
        let (mut on, mut off) = (0, 0);

        for _ in 0..500 {
            let payload = m.tick(&mut rng, now());
            let brew = payload.brew_type.unwrap();
            match payload.status.as_deref() {
                Some("ON") => {
                    on += 1;
                    assert!(BREWS.iter().any(|b| b.as_str() == brew));
                }
                Some("OFF") => {
                    off += 1;
                    assert_eq!(brew, NO_BREW);
                }
                other => panic!("unexpected status {other:?}"),
            }
            let temperature = payload.temperature.unwrap();
            assert!((85.0..=115.0).contains(&temperature));
            for level in [
                payload.water_level,
                payload.milk_level,
                payload.beans_level,
                payload.sugar_level,
            ] {
                let level = level.unwrap();
                assert!((0.0..=100.0).contains(&level));
                assert!((level - level.trunc()).abs() < f64::EPSILON);
            }
        }

        assert!(on > 350 && off > 30, "on={on} off={off}");
    }
}
