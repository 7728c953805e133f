use anyhow::{Context, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::common::money::parse_decimal;
use crate::common::Position;

/// Application configuration loaded from environment variables.
///
/// Both binaries load the same structure; each reads the sections it needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub port: u16,
    /// Subscriber identity on the broker; also stamped into every envelope.
    pub service_id: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub allowed_origins: Vec<String>,
    pub catalog_service_url: String,
    pub order_service_url: String,
    pub http: HttpClientConfig,
    pub pricing: PricingConfig,
    pub simulation: SimulationConfig,
    pub fleet: FleetConfig,
}

/// Resilient Service Client policy.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub service_fee_rate: Decimal,
    /// Flat fee in currency units.
    pub delivery_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            service_fee_rate: Decimal::new(5, 2),
            delivery_fee: Decimal::new(15000, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub tick_interval: Duration,
    /// Degrees. 0.0003 is roughly 33 m.
    pub arrival_threshold: f64,
    /// Degrees per second.
    pub drone_speed: f64,
    /// Battery percent consumed per degree travelled.
    pub battery_drain_per_degree: f64,
    /// Battery percent restored per tick while docked.
    pub recharge_per_tick: f64,
    pub min_battery: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            arrival_threshold: 0.0003,
            drone_speed: 0.00015,
            battery_drain_per_degree: 110.0,
            recharge_per_tick: 0.5,
            min_battery: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub size: usize,
    pub home_station: Position,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            size: 8,
            home_station: Position::new(10.7769, 106.7009),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, with the order
    /// service's identity and port as defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_env_for("order-service", 8080)
    }

    /// Same as `from_env`, for a binary with its own default identity.
    /// `SERVICE_ID` and `PORT` still override.
    pub fn from_env_for(default_service_id: &str, default_port: u16) -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let http_defaults = HttpClientConfig::default();
        let pricing_defaults = PricingConfig::default();
        let sim_defaults = SimulationConfig::default();
        let fleet_defaults = FleetConfig::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            nats_url: env::var("NATS_URL").context("NATS_URL must be set")?,
            port: parse_var("PORT", default_port)?,
            service_id: env::var("SERVICE_ID").unwrap_or_else(|_| default_service_id.to_string()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "fulfillment-auth".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            catalog_service_url: env::var("CATALOG_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            order_service_url: env::var("ORDER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            http: HttpClientConfig {
                timeout: Duration::from_secs(positive_var(
                    "HTTP_TIMEOUT_SECS",
                    http_defaults.timeout.as_secs(),
                )?),
                max_retries: parse_var("HTTP_MAX_RETRIES", http_defaults.max_retries)?,
                retry_base_delay: Duration::from_millis(parse_var(
                    "HTTP_RETRY_BASE_MS",
                    http_defaults.retry_base_delay.as_millis() as u64,
                )?),
                retry_max_delay: http_defaults.retry_max_delay,
            },
            pricing: PricingConfig {
                tax_rate: decimal_var("TAX_RATE", pricing_defaults.tax_rate)?,
                service_fee_rate: decimal_var(
                    "SERVICE_FEE_RATE",
                    pricing_defaults.service_fee_rate,
                )?,
                delivery_fee: decimal_var("DELIVERY_FEE", pricing_defaults.delivery_fee)?,
            },
            simulation: SimulationConfig {
                tick_interval: Duration::from_millis(positive_var(
                    "SIM_TICK_MS",
                    sim_defaults.tick_interval.as_millis() as u64,
                )?),
                arrival_threshold: parse_var(
                    "SIM_ARRIVAL_THRESHOLD",
                    sim_defaults.arrival_threshold,
                )?,
                drone_speed: parse_var("SIM_DRONE_SPEED", sim_defaults.drone_speed)?,
                battery_drain_per_degree: parse_var(
                    "SIM_BATTERY_DRAIN_PER_DEGREE",
                    sim_defaults.battery_drain_per_degree,
                )?,
                recharge_per_tick: parse_var(
                    "SIM_RECHARGE_PER_TICK",
                    sim_defaults.recharge_per_tick,
                )?,
                min_battery: parse_var("MIN_BATTERY", sim_defaults.min_battery)?,
            },
            fleet: FleetConfig {
                size: parse_var("FLEET_SIZE", fleet_defaults.size)?,
                home_station: Position::new(
                    parse_var("HOME_STATION_LAT", fleet_defaults.home_station.lat)?,
                    parse_var("HOME_STATION_LNG", fleet_defaults.home_station.lng)?,
                ),
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}

/// Durations where zero would spin a timer or expire every request.
fn positive_var(name: &str, default: u64) -> Result<u64> {
    let value = parse_var(name, default)?;
    anyhow::ensure!(value > 0, "{} must be greater than zero", name);
    Ok(value)
}

fn decimal_var(name: &str, default: Decimal) -> Result<Decimal> {
    match env::var(name) {
        Ok(raw) => parse_decimal(&raw).with_context(|| format!("{} must be a decimal", name)),
        Err(_) => Ok(default),
    }
}
