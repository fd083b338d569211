use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

use crate::allocator::{AllocationConfig, AllocationStrategy};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub allocator: AllocatorConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            allocator: AllocatorConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "TRUCK_DISPATCH_API_HOST";
    const PORT_VAR: &'static str = "TRUCK_DISPATCH_API_PORT";

    fn from_env() -> Self {
        let (bind_ip, display_host) = parse_host(env_string(Self::HOST_VAR));
        let port = parse_port(env_string(Self::PORT_VAR));

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        let (bind_ip, display_host) = parse_host(None);
        Self {
            bind_ip,
            display_host,
            port: Self::DEFAULT_PORT,
        }
    }
}

fn parse_host(raw: Option<String>) -> (IpAddr, String) {
    let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let Some(host_value) = raw else {
        return (default_ip, ApiConfig::DEFAULT_HOST.to_string());
    };
    match host_value.parse::<IpAddr>() {
        Ok(ip) => (ip, host_value),
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                ApiConfig::HOST_VAR,
                host_value,
                err,
                ApiConfig::DEFAULT_HOST
            );
            (default_ip, ApiConfig::DEFAULT_HOST.to_string())
        }
    }
}

fn parse_port(raw: Option<String>) -> u16 {
    match raw {
        Some(raw) => match raw.parse::<u16>() {
            Ok(value) if value != 0 => value,
            Ok(_) => {
                warn!(
                    "⚠️ {} must not be 0. Using {}.",
                    ApiConfig::PORT_VAR,
                    ApiConfig::DEFAULT_PORT
                );
                ApiConfig::DEFAULT_PORT
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    ApiConfig::PORT_VAR,
                    raw,
                    err,
                    ApiConfig::DEFAULT_PORT
                );
                ApiConfig::DEFAULT_PORT
            }
        },
        None => ApiConfig::DEFAULT_PORT,
    }
}

/// Configuration for the allocation engine.
#[derive(Clone, Debug, Default)]
pub struct AllocatorConfig {
    allocation: AllocationConfig,
}

impl AllocatorConfig {
    const THRESHOLD_VAR: &'static str = "TRUCK_DISPATCH_LOAD_THRESHOLD";
    const BIN_PACKING_VAR: &'static str = "TRUCK_DISPATCH_USE_BIN_PACKING";

    fn from_env() -> Self {
        let threshold = parse_decimal_with_warning(
            Self::THRESHOLD_VAR,
            env_string(Self::THRESHOLD_VAR),
            AllocationConfig::DEFAULT_THRESHOLD,
            |value| AllocationConfig::validate_threshold(value).is_ok(),
            "must be greater than 0 and at most 1",
            "Warning: Adjusted load threshold changes which trucks are dispatched",
        );

        let use_bin_packing = env_string(Self::BIN_PACKING_VAR)
            .and_then(|raw| parse_bool(&raw, Self::BIN_PACKING_VAR))
            .unwrap_or(AllocationConfig::DEFAULT_STRATEGY == AllocationStrategy::BinPacking);

        let strategy = AllocationStrategy::from_bin_packing_flag(use_bin_packing);
        let allocation = AllocationConfig::builder()
            .threshold(threshold)
            .default_strategy(strategy)
            .build()
            .unwrap_or_else(|err| {
                warn!("⚠️ {}. Using default allocation settings.", err);
                AllocationConfig::builder()
                    .default_strategy(strategy)
                    .build()
                    .unwrap_or_default()
            });

        Self { allocation }
    }

    /// Returns the configured AllocationConfig.
    pub fn allocation_config(&self) -> AllocationConfig {
        self.allocation
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_decimal_with_warning(
    var_name: &str,
    raw: Option<String>,
    default: Decimal,
    validator: impl Fn(Decimal) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> Decimal {
    match raw {
        Some(raw) => match Decimal::from_str(&raw) {
            Ok(value) => {
                if !validator(value) {
                    warn!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    if value != default {
                        warn!("⚠️ {} ({} = {}).", warning, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}
